// ⚖️ Reconciliation Engine - system ledger vs external (processor) ledger
//
// Both ledgers are reduced to one total per day, then outer-joined on date:
//   difference = external_amount - system_amount
// A day missing on one side counts as 0 on that side, so every date seen in
// either ledger appears exactly once.

use crate::amount::{format_brl, AmountParser};
use crate::columns::{normalize_label, normalize_labels, suggest_column};
use crate::config::Settings;
use crate::dates::format_day_first;
use crate::error::{LedgerError, Result, SkipCounts};
use crate::grid::RawGrid;
use crate::header::{HeaderLocator, HeaderStrategy, LocatedTable};
use crate::ledger::{daily_totals, extract_entries, DailyTotal};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column keys used when the caller does not pick columns
pub const EXTERNAL_DATE_KEYS: &[&str] = &["DATA", "VENDA"];
pub const SYSTEM_DATE_KEYS: &[&str] = &["DATA", "HORA"];
pub const AMOUNT_KEYS: &[&str] = &["LIQUIDO", "VALOR LIQUIDO"];

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    /// |difference| within tolerance
    Matched,
    Mismatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub date: NaiveDate,
    pub system_amount: f64,
    pub external_amount: f64,
    pub difference: f64,
    pub status: RowStatus,
}

impl ReconciliationRow {
    pub fn is_matched(&self) -> bool {
        self.status == RowStatus::Matched
    }

    /// "31/01/2024"
    pub fn display_date(&self) -> String {
        format_day_first(self.date)
    }
}

/// Ledger-wide sums, independent of per-day tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossTotals {
    pub system_total: f64,
    pub external_total: f64,
    pub total_difference: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub rows: Vec<ReconciliationRow>,
    pub totals: CrossTotals,
    pub tolerance: f64,
    /// Header row used per side; None means row 0 was taken as a fallback
    pub system_header_row: Option<usize>,
    pub external_header_row: Option<usize>,
    pub system_skipped: SkipCounts,
    pub external_skipped: SkipCounts,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_matched()).count()
    }

    pub fn mismatched(&self) -> Vec<&ReconciliationRow> {
        self.rows.iter().filter(|r| !r.is_matched()).collect()
    }

    /// Skips from both ledgers combined
    pub fn skipped_total(&self) -> SkipCounts {
        let mut total = self.system_skipped.clone();
        total.merge(&self.external_skipped);
        total
    }

    pub fn is_balanced(&self) -> bool {
        self.rows.iter().all(|r| r.is_matched())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} days ({} matched, {} mismatched): system {}, external {}, difference {}",
            self.rows.len(),
            self.matched_count(),
            self.rows.len() - self.matched_count(),
            format_brl(self.totals.system_total),
            format_brl(self.totals.external_total),
            format_brl(self.totals.total_difference)
        )
    }
}

/// Which columns hold the date and amount on each side.
///
/// Labels are compared after normalization; None means "suggest one".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSelection {
    pub system_date: Option<String>,
    pub system_amount: Option<String>,
    pub external_date: Option<String>,
    pub external_amount: Option<String>,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Per-day tolerance (default: 1.00, one currency unit)
    pub tolerance: f64,

    /// Header scan over both ledgers (default: keyword strategy, 20 rows)
    pub locator: HeaderLocator,

    pub parser: AmountParser,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            tolerance: 1.0,
            locator: HeaderLocator::new(20),
            parser: AmountParser::default(),
        }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine {
            tolerance,
            ..Self::new()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        ReconciliationEngine {
            tolerance: settings.reconciliation.tolerance,
            locator: HeaderLocator::new(settings.parsing.reconciliation_scan_rows),
            parser: AmountParser::new(settings.parsing.decimal_style),
        }
    }

    /// Replace the header locator (e.g. one with only custom strategies)
    pub fn with_header_locator(mut self, locator: HeaderLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Register an extra header strategy after the existing ones
    pub fn with_header_strategy(mut self, strategy: Box<dyn HeaderStrategy>) -> Self {
        self.locator = self.locator.with_strategy(strategy);
        self
    }

    pub fn classify(&self, difference: f64) -> RowStatus {
        if difference.abs() <= self.tolerance {
            RowStatus::Matched
        } else {
            RowStatus::Mismatched
        }
    }

    /// Outer join of two day-aggregated ledgers.
    pub fn reconcile_totals(
        &self,
        system: &[DailyTotal],
        external: &[DailyTotal],
    ) -> (Vec<ReconciliationRow>, CrossTotals) {
        let mut joined: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();

        for total in system {
            joined.entry(total.date).or_insert((0.0, 0.0)).0 += total.total_amount;
        }
        for total in external {
            joined.entry(total.date).or_insert((0.0, 0.0)).1 += total.total_amount;
        }

        let rows: Vec<ReconciliationRow> = joined
            .into_iter()
            .map(|(date, (system_amount, external_amount))| {
                let difference = external_amount - system_amount;
                ReconciliationRow {
                    date,
                    system_amount,
                    external_amount,
                    difference,
                    status: self.classify(difference),
                }
            })
            .collect();

        let system_total: f64 = rows.iter().map(|r| r.system_amount).sum();
        let external_total: f64 = rows.iter().map(|r| r.external_amount).sum();

        let totals = CrossTotals {
            system_total,
            external_total,
            total_difference: external_total - system_total,
        };

        (rows, totals)
    }

    /// Reconcile two raw imports end to end.
    ///
    /// Header discovery is best-effort here: a file without a recognizable
    /// header is read with its first row as labels.
    pub fn reconcile(
        &self,
        system_raw: &RawGrid,
        external_raw: &RawGrid,
        selection: &ColumnSelection,
    ) -> Result<ReconciliationReport> {
        let (system, system_header_row, system_skipped) = self.side_totals(
            system_raw,
            selection.system_date.as_deref(),
            selection.system_amount.as_deref(),
            SYSTEM_DATE_KEYS,
        )?;
        let (external, external_header_row, external_skipped) = self.side_totals(
            external_raw,
            selection.external_date.as_deref(),
            selection.external_amount.as_deref(),
            EXTERNAL_DATE_KEYS,
        )?;

        let (rows, totals) = self.reconcile_totals(&system, &external);

        let report = ReconciliationReport {
            rows,
            totals,
            tolerance: self.tolerance,
            system_header_row,
            external_header_row,
            system_skipped,
            external_skipped,
            reconciled_at: chrono::Utc::now(),
        };

        log::info!("Reconciliation: {}", report.summary());
        Ok(report)
    }

    fn side_totals(
        &self,
        raw: &RawGrid,
        date_label: Option<&str>,
        amount_label: Option<&str>,
        date_keys: &[&str],
    ) -> Result<(Vec<DailyTotal>, Option<usize>, SkipCounts)> {
        let mut table = LocatedTable::locate_or_first_row(raw, &self.locator);
        table.headers = normalize_labels(&table.headers);

        let date_col = resolve_column(&table, date_label, date_keys)?;
        let amount_col = resolve_column(&table, amount_label, AMOUNT_KEYS)?;

        let extraction = extract_entries(&table, date_col, amount_col, &self.parser);
        Ok((
            daily_totals(&extraction.entries),
            table.header_row,
            extraction.skipped,
        ))
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconcile with the default engine (tolerance 1.00, 20-row header scan).
pub fn reconcile(
    system_raw: &RawGrid,
    external_raw: &RawGrid,
    selection: &ColumnSelection,
) -> Result<ReconciliationReport> {
    ReconciliationEngine::new().reconcile(system_raw, external_raw, selection)
}

fn resolve_column(table: &LocatedTable, label: Option<&str>, keys: &[&str]) -> Result<usize> {
    match label {
        Some(label) => table
            .column_index(&normalize_label(label))
            .ok_or_else(|| LedgerError::UnknownColumn(label.to_string())),
        None => Ok(suggest_column(&table.headers, keys)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkipReason;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn total(date: NaiveDate, amount: f64) -> DailyTotal {
        DailyTotal {
            date,
            total_amount: amount,
        }
    }

    fn grid(rows: &[&[&str]]) -> RawGrid {
        RawGrid::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_outer_join_zero_fills() {
        let engine = ReconciliationEngine::new();

        let system = vec![total(d(2024, 1, 1), 100.0)];
        let external = vec![total(d(2024, 1, 1), 100.0), total(d(2024, 1, 2), 50.0)];

        let (rows, totals) = engine.reconcile_totals(&system, &external);

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            ReconciliationRow {
                date: d(2024, 1, 1),
                system_amount: 100.0,
                external_amount: 100.0,
                difference: 0.0,
                status: RowStatus::Matched,
            }
        );
        assert_eq!(
            rows[1],
            ReconciliationRow {
                date: d(2024, 1, 2),
                system_amount: 0.0,
                external_amount: 50.0,
                difference: 50.0,
                status: RowStatus::Mismatched,
            }
        );
        assert_eq!(totals.total_difference, 50.0);
    }

    #[test]
    fn test_system_only_day_is_negative() {
        let engine = ReconciliationEngine::new();
        let (rows, _) = engine.reconcile_totals(&[total(d(2024, 3, 1), 80.0)], &[]);

        assert_eq!(rows[0].external_amount, 0.0);
        assert_eq!(rows[0].difference, -80.0);
        assert_eq!(rows[0].status, RowStatus::Mismatched);
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let engine = ReconciliationEngine::new();

        assert_eq!(engine.classify(1.0), RowStatus::Matched);
        assert_eq!(engine.classify(-1.0), RowStatus::Matched);
        assert_eq!(engine.classify(1.01), RowStatus::Mismatched);
    }

    #[test]
    fn test_totals_drift_while_every_day_matches() {
        let engine = ReconciliationEngine::new();

        let system: Vec<DailyTotal> = (1..=5).map(|day| total(d(2024, 1, day), 100.0)).collect();
        let external: Vec<DailyTotal> = (1..=5).map(|day| total(d(2024, 1, day), 100.8)).collect();

        let (rows, totals) = engine.reconcile_totals(&system, &external);

        assert!(rows.iter().all(|r| r.is_matched()));
        assert!((totals.total_difference - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_sorted_ascending() {
        let engine = ReconciliationEngine::new();
        let system = vec![total(d(2024, 2, 10), 1.0), total(d(2024, 1, 5), 1.0)];
        let external = vec![total(d(2024, 1, 20), 1.0)];

        let (rows, _) = engine.reconcile_totals(&system, &external);
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();

        assert_eq!(dates, vec![d(2024, 1, 5), d(2024, 1, 20), d(2024, 2, 10)]);
    }

    #[test]
    fn test_reconcile_raw_grids_with_suggested_columns() {
        let engine = ReconciliationEngine::new();

        let system = grid(&[
            &["Pedido", "Data - Hora", "Valor Líquido"],
            &["1", "01/01/2024 10:00", "60,00"],
            &["2", "01/01/2024 12:00", "40,00"],
        ]);
        let external = grid(&[
            &["Extrato Stone", "", ""],
            &["", "", ""],
            &["Data da Venda", "Bandeira", "Valor Liquido"],
            &["01/01/2024 10:01:33", "Visa", "R$ 100,00"],
            &["02/01/2024 09:00:00", "Master", "R$ 50,00"],
            &["Total", "", "R$ 150,00"],
        ]);

        let report = engine
            .reconcile(&system, &external, &ColumnSelection::default())
            .unwrap();

        assert_eq!(report.system_header_row, Some(0));
        assert_eq!(report.external_header_row, Some(2));
        assert_eq!(report.rows.len(), 2);
        assert!(report.rows[0].is_matched());
        assert_eq!(report.rows[1].difference, 50.0);
        assert_eq!(report.totals.system_total, 100.0);
        assert_eq!(report.totals.external_total, 150.0);
        // The "Total" footer has no date and is counted, not summed
        assert_eq!(report.external_skipped.rows_dropped(), 1);
        assert!(!report.is_balanced());
        assert_eq!(report.mismatched().len(), 1);
    }

    #[test]
    fn test_explicit_selection_and_unknown_column() {
        let engine = ReconciliationEngine::new();
        let g = grid(&[
            &["Data", "Valor Bruto", "Valor Liquido"],
            &["01/01/2024", "110,00", "100,00"],
        ]);

        let selection = ColumnSelection {
            system_date: Some("data".to_string()),
            system_amount: Some("Valor Bruto".to_string()),
            ..ColumnSelection::default()
        };
        let report = engine.reconcile(&g, &g, &selection).unwrap();
        assert_eq!(report.rows[0].system_amount, 110.0);
        assert_eq!(report.rows[0].external_amount, 100.0);

        let bad = ColumnSelection {
            external_amount: Some("Taxa".to_string()),
            ..ColumnSelection::default()
        };
        assert!(matches!(
            engine.reconcile(&g, &g, &bad),
            Err(LedgerError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_summary_and_display_date() {
        let engine = ReconciliationEngine::with_tolerance(0.01);
        let (rows, _) = engine.reconcile_totals(&[total(d(2024, 1, 31), 10.0)], &[]);
        assert_eq!(rows[0].display_date(), "31/01/2024");

        let g = grid(&[&["Data", "Valor Liquido"], &["31/01/2024", "1.234,56"]]);
        let report = engine.reconcile(&g, &g, &ColumnSelection::default()).unwrap();
        assert_eq!(
            report.summary(),
            "1 days (1 matched, 0 mismatched): system R$ 1.234,56, external R$ 1.234,56, difference R$ 0,00"
        );
    }

    #[test]
    fn test_registered_header_strategy_is_used() {
        use crate::header::RequiredColumnsStrategy;

        // "Valores em R$" trips the keyword scan before the real header
        let g = grid(&[
            &["Valores em R$", ""],
            &["Dia", "Liquido"],
            &["02/01/2024", "30,00"],
        ]);

        let keyword = ReconciliationEngine::new()
            .reconcile(&g, &g, &ColumnSelection::default())
            .unwrap();
        assert_eq!(keyword.system_header_row, Some(0));

        let engine = ReconciliationEngine::new().with_header_locator(
            HeaderLocator::empty(20)
                .with_strategy(Box::new(RequiredColumnsStrategy::new(&["Dia", "Liquido"]))),
        );
        let report = engine.reconcile(&g, &g, &ColumnSelection::default()).unwrap();

        assert_eq!(report.system_header_row, Some(1));
        assert_eq!(report.external_header_row, Some(1));
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.totals.system_total, 30.0);
    }

    #[test]
    fn test_skipped_total_combines_both_sides() {
        let system = grid(&[&["Data", "Valor Liquido"], &["01/01/2024", "5"], &["Total", "5"]]);
        let external = grid(&[
            &["Data", "Valor Liquido"],
            &["01/01/2024", "xyz"],
            &["sem data", "1"],
        ]);

        let report = ReconciliationEngine::new()
            .reconcile(&system, &external, &ColumnSelection::default())
            .unwrap();
        let total = report.skipped_total();

        assert_eq!(total.get(SkipReason::UnparseableDate), 2);
        assert_eq!(total.get(SkipReason::UnparseableAmount), 1);
        assert_eq!(total.rows_dropped(), 2);
    }
}
