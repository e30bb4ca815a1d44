// 📒 Ledger Aggregator - normalized rows → one total per calendar day

use crate::amount::AmountParser;
use crate::dates::extract_date;
use crate::error::SkipCounts;
use crate::header::LocatedTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub amount: f64,
}

impl LedgerEntry {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        LedgerEntry { date, amount }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_amount: f64,
}

/// Entries pulled out of one table, plus what had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct LedgerExtraction {
    pub entries: Vec<LedgerEntry>,
    pub skipped: SkipCounts,
}

/// Read (date, amount) pairs from two columns of a located table.
///
/// Rows without a usable date are dropped and counted. Unreadable amounts
/// count too, but the row stays with 0.0.
pub fn extract_entries(
    table: &LocatedTable,
    date_col: usize,
    amount_col: usize,
    parser: &AmountParser,
) -> LedgerExtraction {
    let mut extraction = LedgerExtraction::default();

    for row in &table.rows {
        let date_cell = row.get(date_col).map(|s| s.as_str()).unwrap_or("");
        let date = match extract_date(date_cell) {
            Ok(d) => d,
            Err(reason) => {
                extraction.skipped.record(reason);
                continue;
            }
        };

        let amount_cell = row.get(amount_col).map(|s| s.as_str()).unwrap_or("");
        let outcome = parser.parse(amount_cell);
        if let Some(reason) = outcome.skip_reason() {
            extraction.skipped.record(reason);
        }

        extraction.entries.push(LedgerEntry::new(date, outcome.value()));
    }

    if !extraction.skipped.is_empty() {
        log::info!(
            "Extracted {} entries, skipped: {} rows dropped, {} cells defaulted",
            extraction.entries.len(),
            extraction.skipped.rows_dropped(),
            extraction.skipped.total() - extraction.skipped.rows_dropped()
        );
    }

    extraction
}

/// Sum amounts per calendar day.
pub fn aggregate_by_day(entries: &[LedgerEntry]) -> BTreeMap<NaiveDate, f64> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for entry in entries {
        *totals.entry(entry.date).or_insert(0.0) += entry.amount;
    }
    totals
}

/// Same as `aggregate_by_day`, as a date-ordered list.
pub fn daily_totals(entries: &[LedgerEntry]) -> Vec<DailyTotal> {
    aggregate_by_day(entries)
        .into_iter()
        .map(|(date, total_amount)| DailyTotal { date, total_amount })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RawGrid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_aggregate_by_day() {
        let entries = vec![
            LedgerEntry::new(d(2024, 1, 1), 10.0),
            LedgerEntry::new(d(2024, 1, 1), 5.0),
            LedgerEntry::new(d(2024, 1, 2), 3.0),
        ];

        let totals = aggregate_by_day(&entries);

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&d(2024, 1, 1)], 15.0);
        assert_eq!(totals[&d(2024, 1, 2)], 3.0);
    }

    #[test]
    fn test_daily_totals_sorted() {
        let entries = vec![
            LedgerEntry::new(d(2024, 1, 3), 1.0),
            LedgerEntry::new(d(2024, 1, 1), 2.0),
        ];

        let totals = daily_totals(&entries);

        assert_eq!(totals[0].date, d(2024, 1, 1));
        assert_eq!(totals[1].date, d(2024, 1, 3));
    }

    #[test]
    fn test_extract_entries_counts_skips() {
        let grid = RawGrid::new(vec![
            vec!["Data".into(), "Valor".into()],
            vec!["01/01/2024 10:00".into(), "R$ 10,00".into()],
            vec!["01/01/2024 11:00".into(), "xyz".into()],
            vec!["Total".into(), "20,00".into()],
            vec!["02/01/2024".into(), "5".into()],
        ]);
        let table = LocatedTable::split(&grid, 0);

        let extraction = extract_entries(&table, 0, 1, &AmountParser::default());

        assert_eq!(extraction.entries.len(), 3);
        assert_eq!(extraction.skipped.rows_dropped(), 1);
        assert_eq!(extraction.skipped.total(), 2);

        let totals = aggregate_by_day(&extraction.entries);
        assert_eq!(totals[&d(2024, 1, 1)], 10.0);
        assert_eq!(totals[&d(2024, 1, 2)], 5.0);
    }
}
