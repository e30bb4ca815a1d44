// ⚙️ Settings - explicit configuration injected at startup
//
// Loaded from a JSON file (default: settings.json). Nothing in the crate reads
// globals; the CLI and the server build a Settings and hand pieces of it to
// SqliteStore, the reconciliation engine and the ingestor.

use crate::amount::DecimalStyle;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub parsing: ParsingConfig,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding the sales ledger
    pub path: PathBuf,
    /// Target table for orders
    pub table: String,
    /// Rows per INSERT statement
    pub insert_chunk_size: usize,
    /// Ids per DELETE statement (SQLite caps bound parameters per statement)
    pub delete_batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("sales.db"),
            table: "vendas".to_string(),
            insert_chunk_size: 100,
            delete_batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub decimal_style: DecimalStyle,
    /// Forces the CSV delimiter; sniffed from the content when absent
    pub csv_delimiter: Option<char>,
    pub reconciliation_scan_rows: usize,
    pub ingestion_scan_rows: usize,
    /// chrono format for the ingestion timestamp column
    pub timestamp_format: String,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        ParsingConfig {
            decimal_style: DecimalStyle::Auto,
            csv_delimiter: None,
            reconciliation_scan_rows: 20,
            ingestion_scan_rows: 10,
            timestamp_format: "%d/%m/%Y %H:%M".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Per-day |difference| at or under this is "matched"
    pub tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        ReconciliationConfig { tolerance: 1.0 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !is_plain_identifier(&self.database.table) {
            return Err(LedgerError::Config(format!(
                "table name must be a plain identifier, got {:?}",
                self.database.table
            )));
        }
        if self.database.insert_chunk_size == 0 || self.database.delete_batch_size == 0 {
            return Err(LedgerError::Config(
                "insert_chunk_size and delete_batch_size must be positive".to_string(),
            ));
        }
        if self.parsing.reconciliation_scan_rows == 0 || self.parsing.ingestion_scan_rows == 0 {
            return Err(LedgerError::Config(
                "header scan windows must be positive".to_string(),
            ));
        }
        if let Some(c) = self.parsing.csv_delimiter {
            if !c.is_ascii() {
                return Err(LedgerError::Config(format!(
                    "csv_delimiter must be a single ASCII character, got {:?}",
                    c
                )));
            }
        }
        if self.parsing.timestamp_format.trim().is_empty() {
            return Err(LedgerError::Config("timestamp_format is empty".to_string()));
        }
        if !(self.reconciliation.tolerance >= 0.0) {
            return Err(LedgerError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.reconciliation.tolerance
            )));
        }
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]+` is allowed.
pub fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Loads and validates settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&raw)?;
    settings.validate()?;
    Ok(settings)
}

/// Explicit path if given, else settings.json if present, else built-in defaults.
///
/// An explicit path that fails to load is an error; only the implicit default
/// location is allowed to be missing.
pub fn load_settings_with_fallback(path: Option<&Path>) -> Result<Settings> {
    if let Some(p) = path {
        return load_settings(p);
    }

    let default_path = Path::new(DEFAULT_SETTINGS_FILE);
    if default_path.is_file() {
        log::info!("Loading settings from {}", default_path.display());
        return load_settings(default_path);
    }

    log::debug!("No {} found, using built-in defaults", DEFAULT_SETTINGS_FILE);
    Ok(Settings::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.database.table, "vendas");
        assert_eq!(settings.parsing.reconciliation_scan_rows, 20);
        assert_eq!(settings.parsing.ingestion_scan_rows, 10);
        assert_eq!(settings.reconciliation.tolerance, 1.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "database": { "path": "/tmp/x.db" },
            "parsing": { "decimal_style": "BR", "csv_delimiter": ";" }
        }"#;

        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(settings.database.table, "vendas");
        assert_eq!(settings.parsing.decimal_style, DecimalStyle::Br);
        assert_eq!(settings.parsing.csv_delimiter, Some(';'));
        assert_eq!(settings.parsing.timestamp_format, "%d/%m/%Y %H:%M");
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let mut settings = Settings::default();
        settings.database.table = "vendas; DROP TABLE x".to_string();
        assert!(matches!(settings.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let mut settings = Settings::default();
        settings.reconciliation.tolerance = -1.0;
        assert!(settings.validate().is_err());

        settings.reconciliation.tolerance = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_non_ascii_delimiter() {
        let raw = r#"{ "parsing": { "csv_delimiter": "§" } }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert!(matches!(settings.validate(), Err(LedgerError::Config(_))));

        let mut settings = Settings::default();
        settings.parsing.csv_delimiter = Some('\t');
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = load_settings_with_fallback(Some(Path::new("/nonexistent/settings.json")));
        assert!(matches!(result, Err(LedgerError::Io(_))));
    }
}
