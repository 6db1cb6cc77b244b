//! PostgreSQL sessions over a sqlx pool.

use crate::config::{ColumnDescriptor, SemanticType, TableDescriptor};
use crate::error::AppError;
use crate::service::{RawResult, Row, Session, SessionSource};
use crate::sql::{render, QueryPlan};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Transaction};

pub struct PgSessionSource {
    pool: PgPool,
}

impl PgSessionSource {
    pub fn new(pool: PgPool) -> Self {
        PgSessionSource { pool }
    }
}

#[async_trait]
impl SessionSource for PgSessionSource {
    async fn open(&self) -> Result<Box<dyn Session>, AppError> {
        Ok(Box::new(PgSession { pool: self.pool.clone(), tx: None }))
    }
}

/// Pool handle plus the open transaction, if any. Dropping the transaction
/// rolls it back.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

#[async_trait]
impl Session for PgSession {
    async fn begin(&mut self) -> Result<(), AppError> {
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn execute(&mut self, plan: &QueryPlan) -> Result<RawResult, AppError> {
        let q = render(plan)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        let rows = rows
            .iter()
            .map(|r| row_to_json(r, &plan.table))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RawResult::from_rows(rows))
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

fn row_to_json(row: &PgRow, table: &TableDescriptor) -> Result<Row, sqlx::Error> {
    let mut map = Row::new();
    for c in &table.columns {
        map.insert(c.name.clone(), cell_to_value(row, c)?);
    }
    Ok(map)
}

/// Decode one cell by its declared type. The select list renders text-like
/// types as text and arrays as json.
fn cell_to_value(row: &PgRow, c: &ColumnDescriptor) -> Result<Value, sqlx::Error> {
    use sqlx::Row;
    let name = c.name.as_str();
    Ok(match &c.ty {
        SemanticType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool).unwrap_or(Value::Null),
        SemanticType::SmallInt => row.try_get::<Option<i16>, _>(name)?.map(Value::from).unwrap_or(Value::Null),
        SemanticType::Integer => row.try_get::<Option<i32>, _>(name)?.map(Value::from).unwrap_or(Value::Null),
        SemanticType::BigInt => row.try_get::<Option<i64>, _>(name)?.map(Value::from).unwrap_or(Value::Null),
        SemanticType::Real => float(row.try_get::<Option<f32>, _>(name)?.map(f64::from)),
        SemanticType::Double => float(row.try_get::<Option<f64>, _>(name)?),
        SemanticType::Binary => row
            .try_get::<Option<Vec<u8>>, _>(name)?
            .map(|b| Value::String(base64::engine::general_purpose::STANDARD.encode(b)))
            .unwrap_or(Value::Null),
        SemanticType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)?
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        SemanticType::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)?
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        SemanticType::TimestampTz => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
            .map(|d| Value::String(d.to_rfc3339()))
            .unwrap_or(Value::Null),
        SemanticType::Json | SemanticType::Jsonb | SemanticType::Array(_) => {
            row.try_get::<Option<Value>, _>(name)?.unwrap_or(Value::Null)
        }
        SemanticType::Decimal
        | SemanticType::Text
        | SemanticType::Date
        | SemanticType::Time
        | SemanticType::TimeTz
        | SemanticType::Interval => row.try_get::<Option<String>, _>(name)?.map(Value::String).unwrap_or(Value::Null),
    })
}

fn float(v: Option<f64>) -> Value {
    v.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
}
