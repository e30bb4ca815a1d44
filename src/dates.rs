// 📅 Date extraction - pull DD/MM/YYYY out of noisy cells
//
// Processor exports write "22/01/2026 14:35:10", "22/01/2026 -", or stray
// text around the date. Only the first strict dd/dd/dddd token counts.

use crate::error::SkipReason;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

fn date_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2}/\d{2}/\d{4}").expect("static date regex"))
}

/// First DD/MM/YYYY-shaped substring, if any.
pub fn extract_date_token(text: &str) -> Option<&str> {
    date_token_regex().find(text).map(|m| m.as_str())
}

/// Day-first parse of an extracted token.
pub fn parse_day_first(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token, "%d/%m/%Y").ok()
}

/// Lenient path: extract then parse. Tagged so callers can count drops.
pub fn extract_date(text: &str) -> Result<NaiveDate, SkipReason> {
    extract_date_token(text)
        .and_then(parse_day_first)
        .ok_or(SkipReason::UnparseableDate)
}

/// Strict path used by ingestion: the whole cell must match `format`.
///
/// A date-only format ("%d/%m/%Y") is accepted and yields midnight.
pub fn parse_timestamp(text: &str, format: &str) -> Result<NaiveDateTime, SkipReason> {
    let text = text.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(SkipReason::UnparseableTimestamp)
}

/// Display form used in reports: 2024-01-31 → "31/01/2024"
pub fn format_day_first(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_from_noise() {
        assert_eq!(extract_date_token("22/01/2026 14:35:10"), Some("22/01/2026"));
        assert_eq!(extract_date_token("Venda em 05/03/2024 -"), Some("05/03/2024"));
        assert_eq!(extract_date_token("  31/12/2023"), Some("31/12/2023"));
    }

    #[test]
    fn test_no_token() {
        assert_eq!(extract_date_token("Total"), None);
        assert_eq!(extract_date_token("2024-01-05"), None);
        assert_eq!(extract_date_token("1/1/2024"), None);
        assert_eq!(extract_date_token(""), None);
    }

    #[test]
    fn test_first_token_wins() {
        assert_eq!(
            extract_date_token("01/02/2024 a 28/02/2024"),
            Some("01/02/2024")
        );
    }

    #[test]
    fn test_day_first_parse() {
        let date = extract_date("03/04/2024 10:00").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
    }

    #[test]
    fn test_invalid_calendar_date_is_skipped() {
        // Matches the shape, but there is no month 13
        assert_eq!(extract_date("01/13/2024"), Err(SkipReason::UnparseableDate));
        assert_eq!(extract_date("sem data"), Err(SkipReason::UnparseableDate));
    }

    #[test]
    fn test_strict_timestamp() {
        let ts = parse_timestamp("22/01/2026 14:35", "%d/%m/%Y %H:%M").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M").to_string(), "2026-01-22 14:35");

        // Extra noise is not tolerated on the strict path
        assert_eq!(
            parse_timestamp("22/01/2026 14:35 BRT", "%d/%m/%Y %H:%M"),
            Err(SkipReason::UnparseableTimestamp)
        );
    }

    #[test]
    fn test_strict_date_only_format() {
        let ts = parse_timestamp("22/01/2026", "%d/%m/%Y").unwrap();
        assert_eq!(ts.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn test_format_day_first() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(format_day_first(date), "31/01/2024");
    }
}
