// 📥 Dedup Ingestor - idempotent incremental load of the sales ledger
//
// One run:
//   1. parse     raw grid → header → canonical columns
//   2. coerce    numeric id, strict timestamp, defaults for channel/amounts
//   3. consolidate  one row per id (split payments summed, first date/channel kept)
//   4. diff      append: drop ids already persisted
//                replace: delete every batch id, insert the whole batch
//   5. commit    one transaction per run (delete + insert are atomic)
//
// The persisted ledger is only touched through OrderStore.

use crate::amount::AmountParser;
use crate::columns::{CanonicalColumn, ColumnMap, RenameTable};
use crate::config::Settings;
use crate::dates::parse_timestamp;
use crate::error::{LedgerError, Result, SkipCounts, SkipReason};
use crate::grid::{read_grid_with_date_format, FileKind, RawGrid};
use crate::header::{HeaderLocator, HeaderStrategy, LocatedTable};
use crate::store::{CommitOutcome, OrderStore};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Channel stored when the export leaves it blank
pub const UNDEFINED_CHANNEL: &str = "Undefined";

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Insert only ids not yet persisted
    #[default]
    Append,
    /// Overwrite every id present in the file
    Replace,
}

impl IngestMode {
    pub fn code(&self) -> &'static str {
        match self {
            IngestMode::Append => "append",
            IngestMode::Replace => "replace",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for IngestMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(IngestMode::Append),
            "replace" => Ok(IngestMode::Replace),
            other => Err(LedgerError::Config(format!(
                "unknown ingest mode '{}' (expected append or replace)",
                other
            ))),
        }
    }
}

/// One order as persisted (canonical columns only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id_pedido: i64,
    pub data_hora: NaiveDateTime,
    pub canal_venda: String,
    pub valor_bruto: f64,
    pub valor_liquido: f64,
}

/// Coerced rows of one file, before consolidation.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub orders: Vec<SalesOrder>,
    pub header_row: usize,
    pub mapped_columns: Vec<CanonicalColumn>,
    /// Non-blank data rows seen below the header
    pub source_rows: usize,
    pub skipped: SkipCounts,
}

/// What a run will write.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionPlan {
    pub mode: IngestMode,
    /// Ids removed before inserting (replace mode only)
    pub deletes: Vec<i64>,
    pub inserts: Vec<SalesOrder>,
    /// Append mode: candidates dropped because the id already exists
    pub already_persisted: usize,
    /// Replace mode: batch ids that existed and get overwritten
    pub replaced: usize,
}

/// Identity of one ingestion run, recorded with the commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub mode: IngestMode,
    /// SHA-256 of the uploaded bytes (empty when ingesting a prepared grid)
    pub file_sha256: String,
    pub started_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new(mode: IngestMode, file_sha256: String) -> Self {
        RunInfo {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            file_sha256,
            started_at: Utc::now(),
        }
    }
}

/// Outcome reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: String,
    pub mode: IngestMode,
    /// Rows written (new in append mode, new + replaced in replace mode)
    pub inserted_count: usize,
    pub replaced_count: usize,
    pub deleted_count: usize,
    pub already_persisted: usize,
    pub consolidated_count: usize,
    pub source_rows: usize,
    pub skipped: SkipCounts,
    pub warnings: Vec<String>,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        format!(
            "{} run: {} rows read, {} orders after consolidation, {} written ({} replaced), {} already persisted, {} rows skipped",
            self.mode,
            self.source_rows,
            self.consolidated_count,
            self.inserted_count,
            self.replaced_count,
            self.already_persisted,
            self.skipped.rows_dropped()
        )
    }
}

// ============================================================================
// PURE STEPS
// ============================================================================

/// Numeric coercion of an order id: "123", " 123 ", "123.0" (spreadsheet floats).
pub fn parse_order_id(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(id) = s.parse::<i64>() {
        return Some(id);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => Some(f as i64),
        _ => None,
    }
}

/// One row per id, in first-encounter order. Amounts are summed; the first
/// row's timestamp and channel are kept.
pub fn consolidate(orders: Vec<SalesOrder>) -> Vec<SalesOrder> {
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut out: Vec<SalesOrder> = Vec::with_capacity(orders.len());

    for order in orders {
        match positions.get(&order.id_pedido) {
            Some(&pos) => {
                let kept = &mut out[pos];
                kept.valor_bruto += order.valor_bruto;
                kept.valor_liquido += order.valor_liquido;
            }
            None => {
                positions.insert(order.id_pedido, out.len());
                out.push(order);
            }
        }
    }

    out
}

/// Diff a consolidated batch against the persisted id set.
pub fn plan(consolidated: Vec<SalesOrder>, existing: &HashSet<i64>, mode: IngestMode) -> IngestionPlan {
    match mode {
        IngestMode::Append => {
            let before = consolidated.len();
            let inserts: Vec<SalesOrder> = consolidated
                .into_iter()
                .filter(|o| !existing.contains(&o.id_pedido))
                .collect();
            IngestionPlan {
                mode,
                deletes: Vec::new(),
                already_persisted: before - inserts.len(),
                replaced: 0,
                inserts,
            }
        }
        IngestMode::Replace => {
            let deletes: Vec<i64> = consolidated.iter().map(|o| o.id_pedido).collect();
            let replaced = deletes.iter().filter(|id| existing.contains(id)).count();
            IngestionPlan {
                mode,
                deletes,
                inserts: consolidated,
                already_persisted: 0,
                replaced,
            }
        }
    }
}

/// Hex SHA-256 of an upload, used to identify the file in the audit log.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// DEDUP INGESTOR
// ============================================================================

pub struct DedupIngestor {
    /// Header scan (default: keyword strategy, 10 rows)
    pub locator: HeaderLocator,

    /// chrono format the timestamp column must match exactly
    pub timestamp_format: String,

    pub parser: AmountParser,

    pub rename: RenameTable,
}

impl DedupIngestor {
    pub fn new() -> Self {
        DedupIngestor {
            locator: HeaderLocator::new(10),
            timestamp_format: "%d/%m/%Y %H:%M".to_string(),
            parser: AmountParser::default(),
            rename: RenameTable::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        DedupIngestor {
            locator: HeaderLocator::new(settings.parsing.ingestion_scan_rows),
            timestamp_format: settings.parsing.timestamp_format.clone(),
            parser: AmountParser::new(settings.parsing.decimal_style),
            rename: RenameTable::default(),
        }
    }

    pub fn with_header_locator(mut self, locator: HeaderLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Register an extra header strategy after the existing ones
    pub fn with_header_strategy(mut self, strategy: Box<dyn HeaderStrategy>) -> Self {
        self.locator = self.locator.with_strategy(strategy);
        self
    }

    /// Steps 1-2: locate the header, map canonical columns, coerce every row.
    pub fn parse_orders(&self, grid: &RawGrid) -> Result<ParsedBatch> {
        let header_row = self.locator.locate(grid).ok_or(LedgerError::HeaderNotFound {
            scanned: self.locator.scan_rows().min(grid.len()),
        })?;

        let table = LocatedTable::split(grid, header_row);
        let columns = self.rename.map_headers(&table.headers);
        if columns.get(CanonicalColumn::IdPedido).is_none() {
            return Err(LedgerError::NoIdentifierColumn);
        }

        let mut batch = ParsedBatch {
            orders: Vec::new(),
            header_row,
            mapped_columns: columns.mapped(),
            source_rows: 0,
            skipped: SkipCounts::new(),
        };

        for row in &table.rows {
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            batch.source_rows += 1;

            match self.coerce_row(row, &columns, &mut batch.skipped) {
                Ok(order) => batch.orders.push(order),
                Err(reason) => batch.skipped.record(reason),
            }
        }

        log::debug!(
            "Parsed {} orders from {} rows (header at row {})",
            batch.orders.len(),
            batch.source_rows,
            header_row
        );
        Ok(batch)
    }

    fn coerce_row(
        &self,
        row: &[String],
        columns: &ColumnMap,
        skipped: &mut SkipCounts,
    ) -> std::result::Result<SalesOrder, SkipReason> {
        let id_pedido = columns
            .cell(row, CanonicalColumn::IdPedido)
            .and_then(parse_order_id)
            .ok_or(SkipReason::UnparseableIdentifier)?;

        let data_hora = parse_timestamp(
            columns.cell(row, CanonicalColumn::DataHora).unwrap_or(""),
            &self.timestamp_format,
        )?;

        let canal_venda = columns
            .cell(row, CanonicalColumn::CanalVenda)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .unwrap_or(UNDEFINED_CHANNEL)
            .to_string();

        let mut amount = |column: CanonicalColumn| -> f64 {
            let outcome = self.parser.parse(columns.cell(row, column).unwrap_or(""));
            if let Some(reason) = outcome.skip_reason() {
                skipped.record(reason);
            }
            outcome.value()
        };
        let valor_bruto = amount(CanonicalColumn::ValorBruto);
        let valor_liquido = amount(CanonicalColumn::ValorLiquido);

        Ok(SalesOrder {
            id_pedido,
            data_hora,
            canal_venda,
            valor_bruto,
            valor_liquido,
        })
    }

    /// Full run over an already-read grid.
    pub fn ingest<S: OrderStore>(
        &self,
        store: &mut S,
        grid: &RawGrid,
        mode: IngestMode,
    ) -> Result<IngestReport> {
        self.run(store, grid, RunInfo::new(mode, String::new()))
    }

    /// Full run over uploaded bytes. Spreadsheet date cells are rendered with
    /// the ingestor's timestamp format so the strict parse accepts them.
    pub fn ingest_bytes<S: OrderStore>(
        &self,
        store: &mut S,
        bytes: &[u8],
        kind: FileKind,
        mode: IngestMode,
    ) -> Result<IngestReport> {
        let grid = read_grid_with_date_format(bytes, kind, &self.timestamp_format)?;
        self.run(store, &grid, RunInfo::new(mode, fingerprint(bytes)))
    }

    fn run<S: OrderStore>(&self, store: &mut S, grid: &RawGrid, run: RunInfo) -> Result<IngestReport> {
        let batch = self.parse_orders(grid)?;
        let source_rows = batch.source_rows;
        let skipped = batch.skipped.clone();

        let mut warnings = Vec::new();
        for column in [CanonicalColumn::DataHora, CanonicalColumn::ValorLiquido] {
            if !batch.mapped_columns.contains(&column) {
                warnings.push(format!("Column {} not found in file", column));
            }
        }

        let consolidated = consolidate(batch.orders);
        let consolidated_count = consolidated.len();

        let existing = store.existing_ids()?;
        let plan = plan(consolidated, &existing, run.mode);

        let CommitOutcome { deleted, inserted } = store.commit(&plan, &run)?;

        if inserted == 0 {
            warnings.push("No new orders found in file".to_string());
        }
        if skipped.rows_dropped() > 0 {
            warnings.push(format!(
                "{} rows skipped (unreadable id or timestamp)",
                skipped.rows_dropped()
            ));
        }

        let report = IngestReport {
            run_id: run.run_id,
            mode: run.mode,
            inserted_count: inserted,
            replaced_count: plan.replaced,
            deleted_count: deleted,
            already_persisted: plan.already_persisted,
            consolidated_count,
            source_rows,
            skipped,
            warnings,
        };

        log::info!("Ingestion {}: {}", report.run_id, report.summary());
        for warning in &report.warnings {
            log::warn!("{}", warning);
        }
        Ok(report)
    }
}

impl Default for DedupIngestor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
