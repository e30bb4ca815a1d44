// 💰 Amount Parser - free-form money text → f64
//
// Handles: "R$ 1.200,50", "1200.50", "1,200.50", "-", "", "None".
// Never fails: unreadable input becomes 0.0, but the outcome says why so
// callers can count what was lost.

use crate::error::SkipReason;
use serde::{Deserialize, Serialize};

/// Which character is the decimal separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecimalStyle {
    /// Comma is decimal, dot is thousands ("1.234,56")
    Br,
    /// Dot is decimal, comma is thousands ("1,234.56")
    Us,
    /// Right-most of ',' / '.' is the decimal separator when both appear;
    /// a lone ',' is decimal, a lone '.' is decimal
    #[default]
    Auto,
}

/// Result of reading one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountOutcome {
    Parsed(f64),
    /// Empty cell or a placeholder such as "-"
    Blank,
    Skipped(SkipReason),
}

impl AmountOutcome {
    /// Collapse to a number; blanks and failures are 0.0.
    pub fn value(&self) -> f64 {
        match self {
            AmountOutcome::Parsed(v) => *v,
            AmountOutcome::Blank | AmountOutcome::Skipped(_) => 0.0,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            AmountOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

const PLACEHOLDERS: &[&str] = &["-", "", "nan", "none", "null"];
const CURRENCY_MARKERS: &[&str] = &["R$", "US$", "$", "€"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AmountParser {
    pub style: DecimalStyle,
}

impl AmountParser {
    pub fn new(style: DecimalStyle) -> Self {
        AmountParser { style }
    }

    /// Parse and tag the outcome.
    ///
    /// Note: "1.000" under Br/Auto is read as 1.0, not one thousand. A lone
    /// dot group is indistinguishable from a decimal without an explicit
    /// locale; choose DecimalStyle::Us or fix the source when that matters.
    pub fn parse(&self, raw: &str) -> AmountOutcome {
        let trimmed = raw.trim();
        if PLACEHOLDERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
            return AmountOutcome::Blank;
        }

        let mut text = trimmed.to_string();
        for marker in CURRENCY_MARKERS {
            text = text.replace(marker, "");
        }
        let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() || text == "-" {
            return AmountOutcome::Blank;
        }

        let normalized = self.normalize_separators(&text);

        match normalized.parse::<f64>() {
            Ok(v) if v.is_finite() => AmountOutcome::Parsed(v),
            _ => AmountOutcome::Skipped(SkipReason::UnparseableAmount),
        }
    }

    /// Parse straight to a number (0.0 on anything unreadable).
    pub fn parse_or_zero(&self, raw: &str) -> f64 {
        self.parse(raw).value()
    }

    fn normalize_separators(&self, text: &str) -> String {
        let has_comma = text.contains(',');
        let has_dot = text.contains('.');

        match self.style {
            DecimalStyle::Br => {
                if has_comma && has_dot {
                    text.replace('.', "").replace(',', ".")
                } else if has_comma {
                    text.replace(',', ".")
                } else {
                    text.to_string()
                }
            }
            DecimalStyle::Us => text.replace(',', ""),
            DecimalStyle::Auto => {
                if has_comma && has_dot {
                    let last_comma = text.rfind(',').unwrap_or(0);
                    let last_dot = text.rfind('.').unwrap_or(0);
                    if last_comma > last_dot {
                        text.replace('.', "").replace(',', ".")
                    } else {
                        text.replace(',', "")
                    }
                } else if has_comma {
                    text.replace(',', ".")
                } else {
                    text.to_string()
                }
            }
        }
    }
}

/// Parse with the default (Auto) style, 0.0 on failure.
pub fn parse_amount(raw: &str) -> f64 {
    AmountParser::default().parse_or_zero(raw)
}

/// Format as Brazilian currency: 1234.5 → "R$ 1.234,50"
pub fn format_brl(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{}R$ {},{:02}", if negative { "-" } else { "" }, grouped, frac)
}

// ============================================================================
// TESTS
// ============================================================================
