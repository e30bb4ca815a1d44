// Sales Ledger - Core Library
// Normalization, reconciliation and idempotent ingestion of sales ledgers.
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod config;
pub mod amount;         // AmountParser - locale-aware money text
pub mod dates;          // DateExtractor - DD/MM/YYYY tokens, strict timestamps
pub mod grid;           // Tabular reading: CSV (sniffed) and spreadsheets
pub mod header;         // HeaderLocator + HeaderStrategy
pub mod columns;        // ColumnNormalizer + rename table
pub mod ledger;         // LedgerAggregator
pub mod reconciliation; // ReconciliationEngine
pub mod ingestion;      // DedupIngestor
pub mod store;          // Persistence traits
pub mod db;             // SQLite store + audit trail
pub mod sales;          // Dashboard summaries

// Re-export commonly used types
pub use error::{LedgerError, Result, SkipCounts, SkipReason};
pub use config::{load_settings, load_settings_with_fallback, DatabaseConfig, Settings};
pub use amount::{format_brl, parse_amount, AmountOutcome, AmountParser, DecimalStyle};
pub use dates::{extract_date, extract_date_token, parse_timestamp};
pub use grid::{read_grid, read_grid_from_path, FileKind, RawGrid};
pub use header::{HeaderLocator, HeaderStrategy, KeywordStrategy, LocatedTable, RequiredColumnsStrategy};
pub use columns::{normalize_label, suggest_column, CanonicalColumn, ColumnMap, RenameTable};
pub use ledger::{aggregate_by_day, daily_totals, DailyTotal, LedgerEntry};
pub use reconciliation::{
    reconcile, ColumnSelection, CrossTotals, ReconciliationEngine, ReconciliationReport,
    ReconciliationRow, RowStatus,
};
pub use ingestion::{
    consolidate, plan, DedupIngestor, IngestMode, IngestReport, IngestionPlan, RunInfo,
    SalesOrder,
};
pub use store::{CommitOutcome, OrderStore, SalesQueries};
pub use db::{get_events_for_entity, insert_event, setup_database, Event, SqliteStore};
pub use sales::{summarize_months, summarize_range, ChannelShare, SalesSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
