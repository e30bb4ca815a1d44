// ⚠️ Error taxonomy
// Fatal errors abort a run; per-cell parse failures are counted, never raised.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Header row not found in the first {scanned} rows")]
    HeaderNotFound { scanned: usize },

    #[error("No column resolves to the order identifier (id_pedido)")]
    NoIdentifierColumn,

    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failures are surfaced verbatim; nothing retries them.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

// ============================================================================
// RECOVERABLE PARSE FAILURES
// ============================================================================

/// Why a cell (or the row it belongs to) was not used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Amount text could not be read; the amount defaulted to 0.0.
    UnparseableAmount,
    /// No DD/MM/YYYY token, or an invalid calendar date; the row was dropped.
    UnparseableDate,
    /// Order id is not numeric; the row was dropped.
    UnparseableIdentifier,
    /// Timestamp does not match the configured format; the row was dropped.
    UnparseableTimestamp,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::UnparseableAmount => "unparseable_amount",
            SkipReason::UnparseableDate => "unparseable_date",
            SkipReason::UnparseableIdentifier => "unparseable_identifier",
            SkipReason::UnparseableTimestamp => "unparseable_timestamp",
        }
    }

    /// Whether the whole row is lost (as opposed to a defaulted cell).
    pub fn drops_row(&self) -> bool {
        !matches!(self, SkipReason::UnparseableAmount)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Tally of recovered parse failures for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    counts: BTreeMap<SkipReason, usize>,
}

impl SkipCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: SkipReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: SkipReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    /// Rows that never reached the output.
    pub fn rows_dropped(&self) -> usize {
        self.counts
            .iter()
            .filter(|(reason, _)| reason.drops_row())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn merge(&mut self, other: &SkipCounts) {
        for (reason, n) in &other.counts {
            *self.counts.entry(*reason).or_insert(0) += n;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, usize)> + '_ {
        self.counts.iter().map(|(r, n)| (*r, *n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counts_tally() {
        let mut counts = SkipCounts::new();
        counts.record(SkipReason::UnparseableDate);
        counts.record(SkipReason::UnparseableDate);
        counts.record(SkipReason::UnparseableAmount);

        assert_eq!(counts.get(SkipReason::UnparseableDate), 2);
        assert_eq!(counts.total(), 3);
        // Amount failures default to zero, the row survives
        assert_eq!(counts.rows_dropped(), 2);
    }

    #[test]
    fn test_skip_counts_merge() {
        let mut a = SkipCounts::new();
        a.record(SkipReason::UnparseableIdentifier);
        let mut b = SkipCounts::new();
        b.record(SkipReason::UnparseableIdentifier);
        b.record(SkipReason::UnparseableTimestamp);

        a.merge(&b);

        assert_eq!(a.get(SkipReason::UnparseableIdentifier), 2);
        assert_eq!(a.get(SkipReason::UnparseableTimestamp), 1);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_skip_counts_iter_in_reason_order() {
        let mut counts = SkipCounts::new();
        counts.record(SkipReason::UnparseableTimestamp);
        counts.record(SkipReason::UnparseableAmount);
        counts.record(SkipReason::UnparseableTimestamp);

        let listed: Vec<(SkipReason, usize)> = counts.iter().collect();
        assert_eq!(
            listed,
            vec![
                (SkipReason::UnparseableAmount, 1),
                (SkipReason::UnparseableTimestamp, 2)
            ]
        );
    }

    #[test]
    fn test_error_messages() {
        let err = LedgerError::HeaderNotFound { scanned: 10 };
        assert_eq!(err.to_string(), "Header row not found in the first 10 rows");
        assert_eq!(SkipReason::UnparseableAmount.to_string(), "unparseable_amount");
    }
}
