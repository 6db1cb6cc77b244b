//! Session collaborator: one connection-scoped unit of work against a store.

use crate::error::AppError;
use crate::sql::QueryPlan;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row keyed by real column name.
pub type Row = Map<String, Value>;

/// Rows returned by one statement. Every plan returns the affected rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl RawResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        RawResult { rows, rows_affected }
    }
}

/// A live session. Dropping a session with an open transaction rolls it back.
#[async_trait]
pub trait Session: Send {
    async fn begin(&mut self) -> Result<(), AppError>;

    /// Execute one statement. Without `begin`, the statement commits by itself.
    async fn execute(&mut self, plan: &QueryPlan) -> Result<RawResult, AppError>;

    async fn commit(&mut self) -> Result<(), AppError>;

    async fn rollback(&mut self) -> Result<(), AppError>;
}

/// Hands out sessions; the only resource shared between requests.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Session>, AppError>;
}
