//! In-memory session source for tests and local runs. Mirrors the PostgreSQL
//! behaviour the dispatcher depends on: server defaults, not-null and unique
//! enforcement with the same messages, upsert, ordering and pagination.
//! Transactions are serializable: a session holds the store lock from begin
//! until commit or rollback.

use crate::config::{ColumnDescriptor, DefaultValue, SemanticType, TableDescriptor};
use crate::error::AppError;
use crate::service::{RawResult, Row, Session, SessionSource};
use crate::sql::{AssignValue, Assignment, Direction, FilterOp, OrderBy, PlanOp, Predicate, QueryPlan};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
    /// (qualified table, column, value) combinations rejected as foreign-key violations.
    forbidden: Vec<(String, String, Value)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    opened: Arc<AtomicU64>,
    executed: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows keyed by real column name, applying defaults and constraints.
    pub async fn seed(&self, table: &Arc<TableDescriptor>, rows: Vec<Value>) -> Result<Vec<Row>, AppError> {
        let mut plan = QueryPlan::new(PlanOp::Insert, table.clone());
        for row in rows {
            let Value::Object(obj) = row else {
                return Err(AppError::BadRequest("seed rows must be JSON objects".into()));
            };
            plan.rows.push(
                obj.into_iter()
                    .map(|(column, v)| Assignment { column, value: AssignValue::Value(v) })
                    .collect(),
            );
        }
        let mut tables = self.tables.lock().await;
        Ok(apply(&mut tables, &plan)?.rows)
    }

    /// Current rows of a table in storage order.
    pub async fn rows(&self, table: &TableDescriptor) -> Vec<Row> {
        let tables = self.tables.lock().await;
        tables.rows.get(&table.qualified_name()).cloned().unwrap_or_default()
    }

    /// Make writes of `value` into `column` fail like a foreign-key violation.
    pub async fn forbid(&self, table: &TableDescriptor, column: &str, value: Value) {
        let mut tables = self.tables.lock().await;
        tables.forbidden.push((table.qualified_name(), column.to_string(), value));
    }

    /// Sessions opened so far.
    pub fn sessions_opened(&self) -> u64 {
        self.opened.load(AtomicOrdering::SeqCst)
    }

    /// Statements executed so far, including failed ones.
    pub fn statements_executed(&self) -> u64 {
        self.executed.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for MemoryStore {
    async fn open(&self) -> Result<Box<dyn Session>, AppError> {
        self.opened.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(MemorySession {
            tables: self.tables.clone(),
            executed: self.executed.clone(),
            tx: None,
        }))
    }
}

struct OpenTx {
    guard: OwnedMutexGuard<Tables>,
    snapshot: Tables,
}

pub struct MemorySession {
    tables: Arc<Mutex<Tables>>,
    executed: Arc<AtomicU64>,
    tx: Option<OpenTx>,
}

#[async_trait]
impl Session for MemorySession {
    async fn begin(&mut self) -> Result<(), AppError> {
        let guard = self.tables.clone().lock_owned().await;
        let snapshot = guard.clone();
        self.tx = Some(OpenTx { guard, snapshot });
        Ok(())
    }

    async fn execute(&mut self, plan: &QueryPlan) -> Result<RawResult, AppError> {
        self.executed.fetch_add(1, AtomicOrdering::SeqCst);
        match self.tx.as_mut() {
            Some(tx) => apply(&mut tx.guard, plan),
            None => {
                let mut tables = self.tables.lock().await;
                apply(&mut tables, plan)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        self.tx = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(mut tx) = self.tx.take() {
            *tx.guard = tx.snapshot;
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some(mut tx) = self.tx.take() {
            tracing::debug!("session dropped inside a transaction; rolling back");
            *tx.guard = tx.snapshot;
        }
    }
}

/// Run one statement atomically: on error the tables are left untouched.
fn apply(tables: &mut Tables, plan: &QueryPlan) -> Result<RawResult, AppError> {
    let mut work = tables.clone();
    let rows = run(&mut work, plan)?;
    *tables = work;
    Ok(RawResult::from_rows(rows))
}

fn run(tables: &mut Tables, plan: &QueryPlan) -> Result<Vec<Row>, AppError> {
    let table = plan.table.as_ref();
    let key = table.qualified_name();
    let mut rows = tables.rows.remove(&key).unwrap_or_default();
    let out = match plan.op {
        PlanOp::Select => {
            let hits = matching(&rows, table, &plan.predicates, &plan.order_by, plan.limit, plan.offset);
            Ok(hits.into_iter().map(|i| rows[i].clone()).collect())
        }
        PlanOp::Insert | PlanOp::Upsert => insert(tables, &mut rows, plan),
        PlanOp::Update => update(tables, &mut rows, plan),
        PlanOp::Delete => {
            let mut hits = matching(&rows, table, &plan.predicates, &plan.order_by, plan.limit, plan.offset);
            let removed = hits.iter().map(|&i| rows[i].clone()).collect();
            hits.sort_unstable_by(|a, b| b.cmp(a));
            for i in hits {
                rows.remove(i);
            }
            Ok(removed)
        }
    };
    tables.rows.insert(key, rows);
    out
}

fn insert(tables: &mut Tables, rows: &mut Vec<Row>, plan: &QueryPlan) -> Result<Vec<Row>, AppError> {
    let table = plan.table.as_ref();
    let mut out = Vec::with_capacity(plan.rows.len());
    for supplied in &plan.rows {
        let mut row = Row::new();
        for c in &table.columns {
            let value = match supplied.iter().find(|a| a.column == c.name) {
                Some(a) => assign(tables, table, c, &a.value),
                None => default_for(tables, table, c),
            };
            row.insert(c.name.clone(), value);
        }
        check_row(tables, table, &row)?;

        if let Some(conflict) = &plan.conflict {
            let existing = rows.iter().position(|r| {
                conflict
                    .target
                    .iter()
                    .all(|t| table.column(t).is_some_and(|c| values_equal(cell(r, t), cell(&row, t), &c.ty)))
            });
            if let Some(i) = existing {
                let mut merged = rows[i].clone();
                for col in &conflict.update {
                    merged.insert(col.clone(), cell(&row, col).clone());
                }
                check_row(tables, table, &merged)?;
                check_unique(table, rows, &merged, Some(i))?;
                rows[i] = merged.clone();
                out.push(merged);
                continue;
            }
        }
        check_unique(table, rows, &row, None)?;
        rows.push(row.clone());
        out.push(row);
    }
    Ok(out)
}

fn update(tables: &mut Tables, rows: &mut [Row], plan: &QueryPlan) -> Result<Vec<Row>, AppError> {
    let table = plan.table.as_ref();
    let hits = matching(rows, table, &plan.predicates, &plan.order_by, plan.limit, plan.offset);
    let mut out = Vec::with_capacity(hits.len());
    for i in hits {
        let mut row = rows[i].clone();
        for a in &plan.assignments {
            let Some(c) = table.column(&a.column) else {
                return Err(AppError::Validation(format!("unknown column '{}'", a.column)));
            };
            let value = assign(tables, table, c, &a.value);
            row.insert(c.name.clone(), value);
        }
        check_row(tables, table, &row)?;
        check_unique(table, rows, &row, Some(i))?;
        rows[i] = row.clone();
        out.push(row);
    }
    Ok(out)
}

fn assign(tables: &mut Tables, table: &TableDescriptor, c: &ColumnDescriptor, v: &AssignValue) -> Value {
    match v {
        AssignValue::Default => default_for(tables, table, c),
        AssignValue::Value(v) => normalize(v, &c.ty),
    }
}

/// Decimals come back from PostgreSQL as text.
fn normalize(v: &Value, ty: &SemanticType) -> Value {
    match (ty, v) {
        (SemanticType::Decimal, Value::Number(n)) => Value::String(n.to_string()),
        _ => v.clone(),
    }
}

fn default_for(tables: &mut Tables, table: &TableDescriptor, c: &ColumnDescriptor) -> Value {
    let Some(default) = &c.default else {
        return Value::Null;
    };
    let expr = match default {
        DefaultValue::Literal(v) => return normalize(v, &c.ty),
        DefaultValue::Expression(e) => e.trim().to_lowercase(),
    };
    if expr.starts_with("nextval(") {
        let seq = tables
            .sequences
            .entry(format!("{}.{}", table.qualified_name(), c.name))
            .or_insert(0);
        *seq += 1;
        return Value::from(*seq);
    }
    match expr.as_str() {
        "now()" | "current_timestamp" | "localtimestamp" | "current_date" => {
            let now = chrono::Utc::now();
            Value::String(match c.ty {
                SemanticType::TimestampTz => now.to_rfc3339(),
                SemanticType::Date => now.format("%Y-%m-%d").to_string(),
                _ => now.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            })
        }
        "gen_random_uuid()" | "uuid_generate_v4()" => Value::String(uuid::Uuid::new_v4().to_string()),
        _ => {
            // 'literal'::type
            let head = expr.split("::").next().unwrap_or_default().trim().trim_matches('\'');
            c.ty.parse_str(head).unwrap_or(Value::Null)
        }
    }
}

fn check_row(tables: &Tables, table: &TableDescriptor, row: &Row) -> Result<(), AppError> {
    let key = table.qualified_name();
    for c in &table.columns {
        let v = cell(row, &c.name);
        if v.is_null() && !c.nullable && !c.generated {
            return Err(AppError::ConstraintViolation {
                constraint: None,
                message: format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    c.name, table.table_name
                ),
            });
        }
        for (t, col, value) in &tables.forbidden {
            if *t == key && *col == c.name && values_equal(v, value, &c.ty) {
                let constraint = format!("{}_{}_fkey", table.table_name, c.name);
                return Err(AppError::ConstraintViolation {
                    message: format!(
                        "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                        table.table_name, constraint
                    ),
                    constraint: Some(constraint),
                });
            }
        }
    }
    Ok(())
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

/// NULLs never collide, as in PostgreSQL.
fn check_unique(table: &TableDescriptor, rows: &[Row], row: &Row, skip: Option<usize>) -> Result<(), AppError> {
    for group in &table.unique_groups {
        let cols: Vec<&ColumnDescriptor> = group.columns.iter().filter_map(|c| table.column(c)).collect();
        if cols.iter().any(|c| cell(row, &c.name).is_null()) {
            continue;
        }
        let clash = rows.iter().enumerate().any(|(i, other)| {
            Some(i) != skip && cols.iter().all(|c| values_equal(cell(other, &c.name), cell(row, &c.name), &c.ty))
        });
        if clash {
            return Err(AppError::ConstraintViolation {
                message: format!("duplicate key value violates unique constraint \"{}\"", group.name),
                constraint: Some(group.name.clone()),
            });
        }
    }
    Ok(())
}

fn compare(a: &Value, b: &Value, ty: &SemanticType) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ if *ty == SemanticType::Decimal => {
            let num = |v: &Value| match v {
                Value::String(s) => s.trim().parse::<f64>().ok(),
                v => v.as_f64(),
            };
            num(a)?.partial_cmp(&num(b)?)
        }
        (Value::String(x), Value::String(y)) if *ty == SemanticType::Uuid => {
            Some(x.to_lowercase().cmp(&y.to_lowercase()))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

fn values_equal(a: &Value, b: &Value, ty: &SemanticType) -> bool {
    compare(a, b, ty) == Some(Ordering::Equal)
}

fn matches(row: &Row, table: &TableDescriptor, p: &Predicate) -> bool {
    let Some(c) = table.column(&p.column) else {
        return false;
    };
    let value = cell(row, &c.name);
    let ord = || compare(value, &p.value, &c.ty);
    match p.op {
        FilterOp::IsNull => value.is_null() == p.value.as_bool().unwrap_or(true),
        FilterOp::In => p
            .value
            .as_array()
            .is_some_and(|items| items.iter().any(|v| values_equal(value, v, &c.ty))),
        FilterOp::Eq => ord() == Some(Ordering::Equal),
        FilterOp::Ne => ord().is_some_and(|o| o != Ordering::Equal),
        FilterOp::Gt => ord() == Some(Ordering::Greater),
        FilterOp::Gte => ord().is_some_and(|o| o != Ordering::Less),
        FilterOp::Lt => ord() == Some(Ordering::Less),
        FilterOp::Lte => ord().is_some_and(|o| o != Ordering::Greater),
    }
}

/// Indices of matching rows, ordered (nulls last) and paginated.
fn matching(
    rows: &[Row],
    table: &TableDescriptor,
    predicates: &[Predicate],
    order_by: &[OrderBy],
    limit: Option<u64>,
    offset: u64,
) -> Vec<usize> {
    let mut hits: Vec<usize> = (0..rows.len())
        .filter(|&i| predicates.iter().all(|p| matches(&rows[i], table, p)))
        .collect();
    if !order_by.is_empty() {
        hits.sort_by(|&a, &b| {
            for o in order_by {
                let ty = table.column(&o.column).map(|c| c.ty.clone()).unwrap_or(SemanticType::Text);
                let (x, y) = (cell(&rows[a], &o.column), cell(&rows[b], &o.column));
                let ord = match (x.is_null(), y.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => {
                        let ord = compare(x, y, &ty).unwrap_or(Ordering::Equal);
                        match o.direction {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    }
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    let take = limit.and_then(|l| usize::try_from(l).ok()).unwrap_or(usize::MAX);
    hits.into_iter().skip(skip).take(take).collect()
}
