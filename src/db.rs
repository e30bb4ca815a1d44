// 🗃️ SQLite store - persisted sales ledger + audit trail
//
// Orders table keyed by id_pedido; events table records every ingestion run.
// Timestamps are stored as "YYYY-MM-DD HH:MM:SS" text so lexical order is
// chronological and substr(…, 1, 7) is the month.

use crate::config::{is_plain_identifier, DatabaseConfig};
use crate::error::{LedgerError, Result};
use crate::ingestion::{IngestionPlan, RunInfo, SalesOrder};
use crate::store::{CommitOutcome, OrderStore, SalesQueries};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite's default cap on bound parameters per statement
pub const SQLITE_MAX_PARAMS: usize = 32_766;

const ORDER_COLUMNS: &str = "id_pedido, data_hora, canal_venda, valor_bruto, valor_liquido";

/// Event for the audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection, table: &str) -> Result<()> {
    if !is_plain_identifier(table) {
        return Err(LedgerError::Config(format!(
            "table name must be a plain identifier, got {:?}",
            table
        )));
    }

    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id_pedido INTEGER PRIMARY KEY,
                data_hora TEXT NOT NULL,
                canal_venda TEXT NOT NULL,
                valor_bruto REAL NOT NULL,
                valor_liquido REAL NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            table
        ),
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_data_hora ON {}(data_hora)",
            table, table
        ),
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<SalesOrder> {
    let raw: String = row.get(1)?;
    let data_hora = NaiveDateTime::parse_from_str(&raw, STORED_TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(SalesOrder {
        id_pedido: row.get(0)?,
        data_hora,
        canal_venda: row.get(2)?,
        valor_bruto: row.get(3)?,
        valor_liquido: row.get(4)?,
    })
}

fn parse_stored(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, STORED_TIMESTAMP_FORMAT).map_err(|e| {
        LedgerError::Database(rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            Box::new(e),
        ))
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
    config: DatabaseConfig,
}

impl SqliteStore {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = Connection::open(&config.path)?;
        log::debug!("Opened database {}", config.path.display());
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory(config: &DatabaseConfig) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    pub fn from_connection(conn: Connection, config: &DatabaseConfig) -> Result<Self> {
        if config.insert_chunk_size == 0
            || config.delete_batch_size == 0
            || config.insert_chunk_size * 5 > SQLITE_MAX_PARAMS
            || config.delete_batch_size > SQLITE_MAX_PARAMS
        {
            return Err(LedgerError::Config(format!(
                "chunk sizes must be between 1 and the {} parameter limit",
                SQLITE_MAX_PARAMS
            )));
        }
        setup_database(&conn, &config.table)?;
        Ok(SqliteStore {
            conn,
            config: config.clone(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn order_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.config.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Audit events recorded for one ingestion run
    pub fn run_events(&self, run_id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, "ingestion_run", run_id)
    }

    fn select_orders(&self, where_clause: &str, values: Vec<Value>) -> Result<Vec<SalesOrder>> {
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY data_hora, id_pedido",
            ORDER_COLUMNS, self.config.table, where_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let orders = stmt
            .query_map(params_from_iter(values.iter()), order_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(orders)
    }
}

impl OrderStore for SqliteStore {
    fn existing_ids(&self) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id_pedido FROM {}", self.config.table))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn commit(&mut self, plan: &IngestionPlan, run: &RunInfo) -> Result<CommitOutcome> {
        let table = self.config.table.clone();
        let tx = self.conn.transaction()?;
        let mut outcome = CommitOutcome::default();

        for batch in plan.deletes.chunks(self.config.delete_batch_size) {
            let sql = format!(
                "DELETE FROM {} WHERE id_pedido IN ({})",
                table,
                placeholders(batch.len())
            );
            outcome.deleted += tx.execute(&sql, params_from_iter(batch.iter()))?;
        }

        for chunk in plan.inserts.chunks(self.config.insert_chunk_size) {
            let rows = vec!["(?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!("INSERT INTO {} ({}) VALUES {}", table, ORDER_COLUMNS, rows);

            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 5);
            for order in chunk {
                values.push(Value::Integer(order.id_pedido));
                values.push(Value::Text(
                    order.data_hora.format(STORED_TIMESTAMP_FORMAT).to_string(),
                ));
                values.push(Value::Text(order.canal_venda.clone()));
                values.push(Value::Real(order.valor_bruto));
                values.push(Value::Real(order.valor_liquido));
            }

            outcome.inserted += tx.execute(&sql, params_from_iter(values.iter()))?;
            log::debug!("Inserted chunk of {} orders", chunk.len());
        }

        let event = Event::new(
            "ingestion_committed",
            "ingestion_run",
            &run.run_id,
            serde_json::json!({
                "mode": run.mode,
                "file_sha256": run.file_sha256,
                "started_at": run.started_at.to_rfc3339(),
                "deleted": outcome.deleted,
                "inserted": outcome.inserted,
                "replaced": plan.replaced,
                "already_persisted": plan.already_persisted,
            }),
            "dedup_ingestor",
        );
        insert_event(&tx, &event)?;

        tx.commit()?;
        log::info!(
            "Committed run {}: {} deleted, {} inserted into {}",
            run.run_id,
            outcome.deleted,
            outcome.inserted,
            table
        );
        Ok(outcome)
    }
}

impl SalesQueries for SqliteStore {
    fn available_months(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT substr(data_hora, 1, 7) AS month FROM {} ORDER BY month DESC",
            self.config.table
        ))?;
        let months = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(months)
    }

    fn orders_in_months(&self, months: &[String]) -> Result<Vec<SalesOrder>> {
        if months.is_empty() {
            return Ok(Vec::new());
        }
        let values = months.iter().map(|m| Value::Text(m.clone())).collect();
        self.select_orders(
            &format!("WHERE substr(data_hora, 1, 7) IN ({})", placeholders(months.len())),
            values,
        )
    }

    fn orders_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SalesOrder>> {
        let values = vec![
            Value::Text(format!("{} 00:00:00", start.format("%Y-%m-%d"))),
            Value::Text(format!("{} 23:59:59", end.format("%Y-%m-%d"))),
        ];
        self.select_orders("WHERE data_hora >= ? AND data_hora <= ?", values)
    }

    fn date_bounds(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let (min, max): (Option<String>, Option<String>) = self.conn.query_row(
            &format!(
                "SELECT MIN(data_hora), MAX(data_hora) FROM {}",
                self.config.table
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match (min, max) {
            (Some(lo), Some(hi)) => Ok(Some((parse_stored(&lo)?, parse_stored(&hi)?))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{plan, IngestMode};

    fn order(id: i64, ts: &str, amount: f64) -> SalesOrder {
        SalesOrder {
            id_pedido: id,
            data_hora: NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M").unwrap(),
            canal_venda: "Salão".to_string(),
            valor_bruto: amount,
            valor_liquido: amount * 0.9,
        }
    }

    fn small_chunks() -> DatabaseConfig {
        DatabaseConfig {
            insert_chunk_size: 2,
            delete_batch_size: 2,
            ..DatabaseConfig::default()
        }
    }

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory(&small_chunks()).unwrap();
        let batch = vec![
            order(1, "2024-01-05 10:00", 10.0),
            order(2, "2024-01-31 23:30", 20.0),
            order(3, "2024-02-01 08:15", 30.0),
            order(4, "2024-03-10 12:00", 40.0),
            order(5, "2024-03-11 12:00", 50.0),
        ];
        let p = plan(batch, &HashSet::new(), IngestMode::Append);
        store
            .commit(&p, &RunInfo::new(IngestMode::Append, String::new()))
            .unwrap();
        store
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn, "vendas").unwrap();
        setup_database(&conn, "vendas").unwrap();
    }

    #[test]
    fn test_rejects_unsafe_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(setup_database(&conn, "vendas--").is_err());
    }

    #[test]
    fn test_commit_inserts_in_chunks() {
        let store = seeded_store();

        assert_eq!(store.order_count().unwrap(), 5);
        let ids = store.existing_ids().unwrap();
        assert_eq!(ids, (1..=5).collect::<HashSet<i64>>());
    }

    #[test]
    fn test_replace_deletes_then_inserts() {
        let mut store = seeded_store();
        let existing = store.existing_ids().unwrap();
        let batch = vec![
            order(1, "2024-01-05 10:00", 99.0),
            order(2, "2024-01-31 23:30", 1.0),
            order(3, "2024-02-01 08:15", 2.0),
            order(6, "2024-02-02 08:15", 3.0),
        ];
        let p = plan(batch, &existing, IngestMode::Replace);

        let outcome = store
            .commit(&p, &RunInfo::new(IngestMode::Replace, String::new()))
            .unwrap();

        assert_eq!(outcome.deleted, 3);
        assert_eq!(outcome.inserted, 4);
        assert_eq!(store.order_count().unwrap(), 6);

        let jan = store.orders_in_months(&["2024-01".to_string()]).unwrap();
        assert_eq!(jan[0].valor_bruto, 99.0);
    }

    #[test]
    fn test_available_months_newest_first() {
        let store = seeded_store();
        assert_eq!(
            store.available_months().unwrap(),
            vec!["2024-03", "2024-02", "2024-01"]
        );
    }

    #[test]
    fn test_orders_in_months() {
        let store = seeded_store();

        let orders = store
            .orders_in_months(&["2024-01".to_string(), "2024-03".to_string()])
            .unwrap();
        let ids: Vec<i64> = orders.iter().map(|o| o.id_pedido).collect();

        assert_eq!(ids, vec![1, 2, 4, 5]);
        assert_eq!(orders[0].canal_venda, "Salão");
        assert!(store.orders_in_months(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_orders_between_includes_whole_end_day() {
        let store = seeded_store();
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let ids: Vec<i64> = store
            .orders_between(start, end)
            .unwrap()
            .iter()
            .map(|o| o.id_pedido)
            .collect();

        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_date_bounds() {
        let store = seeded_store();
        let (lo, hi) = store.date_bounds().unwrap().unwrap();

        assert_eq!(lo, order(1, "2024-01-05 10:00", 0.0).data_hora);
        assert_eq!(hi, order(5, "2024-03-11 12:00", 0.0).data_hora);

        let empty = SqliteStore::open_in_memory(&DatabaseConfig::default()).unwrap();
        assert!(empty.date_bounds().unwrap().is_none());
    }

    #[test]
    fn test_commit_records_run_event() {
        let mut store = SqliteStore::open_in_memory(&DatabaseConfig::default()).unwrap();
        let run = RunInfo::new(IngestMode::Append, "abc123".to_string());
        let p = plan(
            vec![order(1, "2024-01-05 10:00", 10.0)],
            &HashSet::new(),
            IngestMode::Append,
        );

        store.commit(&p, &run).unwrap();

        let events = store.run_events(&run.run_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "ingestion_committed");
        assert_eq!(events[0].data["inserted"], 1);
        assert_eq!(events[0].data["file_sha256"], "abc123");
        assert_eq!(events[0].data["mode"], "append");
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn, "vendas").unwrap();

        let event = Event::new(
            "test_event",
            "ingestion_run",
            "run-1",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "ingestion_run", "run-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "test_actor");
    }
}
