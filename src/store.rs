// 🗄️ Persistence seams
//
// The core never talks SQL. Ingestion reads the persisted id set and hands a
// finished plan to `commit`; dashboards read through `SalesQueries`.
// SqliteStore (db.rs) implements both.

use crate::error::Result;
use crate::ingestion::{IngestionPlan, RunInfo, SalesOrder};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;

/// Rows touched by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

pub trait OrderStore {
    /// Every id currently persisted
    fn existing_ids(&self) -> Result<HashSet<i64>>;

    /// Apply a plan atomically: deletes, inserts and the run's audit record
    /// land together or not at all.
    fn commit(&mut self, plan: &IngestionPlan, run: &RunInfo) -> Result<CommitOutcome>;
}

pub trait SalesQueries {
    /// Distinct `YYYY-MM` months with orders, newest first
    fn available_months(&self) -> Result<Vec<String>>;

    fn orders_in_months(&self, months: &[String]) -> Result<Vec<SalesOrder>>;

    /// Orders whose timestamp falls on `start..=end` (calendar days)
    fn orders_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SalesOrder>>;

    /// Oldest and newest order timestamps, None when empty
    fn date_bounds(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>>;
}
