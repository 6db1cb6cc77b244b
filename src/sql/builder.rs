//! Builds a QueryPlan from bound request values for one operation kind.
//! Identifiers come from the table descriptor only; values stay values until
//! the session renders them as parameters.

use crate::config::{TableDescriptor, UniqueGroup};
use crate::error::{AppError, SchemaError};
use crate::model::{BodyValues, BoundField, OperationKind, OperationShapes, RequestValues};
use crate::sql::filter::parse_query;
use crate::sql::{
    AssignValue, Assignment, ConflictClause, Direction, FilterOp, OrderBy, PlanOp, Predicate, QueryPlan,
};
use serde_json::Value;
use std::sync::Arc;

/// Per-router planning options, resolved once at bind time.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanOptions {
    /// Group upserts resolve against; the primary key group unless configured.
    pub conflict_group: Option<UniqueGroup>,
    /// When false, upserts are plain inserts and duplicates surface as conflicts.
    pub resolve_conflicts: bool,
}

impl PlanOptions {
    pub fn new(
        table: &TableDescriptor,
        conflict_target: Option<&str>,
        resolve_conflicts: bool,
    ) -> Result<Self, SchemaError> {
        let conflict_group = match conflict_target {
            Some(name) => Some(table.group(name).cloned().ok_or_else(|| SchemaError::UnknownColumn {
                column: name.to_string(),
                context: format!("conflict_target of {}", table.qualified_name()),
            })?),
            None => table.primary_key_group().cloned(),
        };
        if resolve_conflicts && conflict_group.is_none() {
            return Err(SchemaError::MissingPrimaryKey(table.qualified_name()));
        }
        Ok(PlanOptions { conflict_group, resolve_conflicts })
    }
}

/// Build the plan for one request. Query-string and body problems surface as
/// `AppError::Validation` before anything touches the store.
pub fn build(
    shapes: &OperationShapes,
    values: &RequestValues,
    table: &Arc<TableDescriptor>,
    options: &PlanOptions,
) -> Result<QueryPlan, AppError> {
    let query = parse_query(shapes.request.query.as_ref(), &values.query)?;
    let mut predicates: Vec<Predicate> = values
        .path
        .iter()
        .map(|b| Predicate { column: b.column.clone(), op: FilterOp::Eq, value: b.value.clone() })
        .collect();
    predicates.extend(query.predicates);

    let kind = shapes.kind;
    let mut plan = match kind {
        OperationKind::FindOne | OperationKind::FindMany => QueryPlan::new(PlanOp::Select, table.clone()),
        OperationKind::DeleteOne | OperationKind::DeleteMany => QueryPlan::new(PlanOp::Delete, table.clone()),
        OperationKind::UpsertOne | OperationKind::UpsertMany | OperationKind::PostRedirectGet => {
            return insert_plan(kind, &values.body, table, options);
        }
        OperationKind::PatchOne | OperationKind::PatchMany => {
            let supplied = single_body(&values.body)?;
            if supplied.is_empty() {
                // Nothing to write: answer with the current state of the matched rows.
                QueryPlan::new(PlanOp::Select, table.clone())
            } else {
                let mut plan = QueryPlan::new(PlanOp::Update, table.clone());
                plan.assignments = supplied
                    .iter()
                    .map(|b| Assignment { column: b.column.clone(), value: AssignValue::Value(b.value.clone()) })
                    .collect();
                plan
            }
        }
        OperationKind::UpdateOne | OperationKind::UpdateMany => {
            let supplied = single_body(&values.body)?;
            let body = shapes
                .request
                .body
                .as_ref()
                .ok_or_else(|| AppError::BadRequest("request body required".into()))?;
            let mut plan = QueryPlan::new(PlanOp::Update, table.clone());
            plan.assignments = body
                .fields()
                .fields
                .iter()
                .map(|f| {
                    let value = match supplied.iter().find(|b| b.column == f.column) {
                        Some(b) => AssignValue::Value(b.value.clone()),
                        None if f.default.is_some() => AssignValue::Default,
                        None => AssignValue::Value(Value::Null),
                    };
                    Assignment { column: f.column.clone(), value }
                })
                .collect();
            plan
        }
    };

    plan.predicates = predicates;
    plan.limit = query.limit;
    plan.offset = query.offset;
    plan.order_by = query.order_by;
    let default_order = kind == OperationKind::FindMany || (plan.op != PlanOp::Select && plan.is_paged());
    if plan.order_by.is_empty() && default_order {
        plan.order_by = key_order(table);
    }
    Ok(plan)
}

fn key_order(table: &TableDescriptor) -> Vec<OrderBy> {
    table
        .pk_columns()
        .into_iter()
        .map(|c| OrderBy { column: c.name.clone(), direction: Direction::Asc })
        .collect()
}

fn single_body(body: &BodyValues) -> Result<&[BoundField], AppError> {
    match body {
        BodyValues::One(fields) => Ok(fields),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn insert_plan(
    kind: OperationKind,
    body: &BodyValues,
    table: &Arc<TableDescriptor>,
    options: &PlanOptions,
) -> Result<QueryPlan, AppError> {
    let rows: Vec<&Vec<BoundField>> = match body {
        BodyValues::One(fields) => vec![fields],
        BodyValues::Many(rows) => rows.iter().collect(),
        BodyValues::None => return Err(AppError::BadRequest("request body required".into())),
    };
    let upsert = kind.is_upsert() && options.resolve_conflicts;
    let mut plan = QueryPlan::new(if upsert { PlanOp::Upsert } else { PlanOp::Insert }, table.clone());
    plan.rows = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| Assignment { column: b.column.clone(), value: AssignValue::Value(b.value.clone()) })
                .collect()
        })
        .collect();

    if upsert {
        let group = options
            .conflict_group
            .as_ref()
            .ok_or_else(|| AppError::Schema(SchemaError::MissingPrimaryKey(table.qualified_name())))?;
        // One statement carries one update list, so every row must supply
        // the same columns outside the target.
        let supplied = |row: &Vec<BoundField>| -> Vec<String> {
            let mut cols: Vec<String> = row
                .iter()
                .filter(|b| !group.columns.contains(&b.column))
                .map(|b| b.column.clone())
                .collect();
            cols.sort();
            cols
        };
        if let Some((first, rest)) = rows.split_first() {
            let expected = supplied(first);
            if let Some(i) = rest.iter().position(|row| supplied(row) != expected) {
                return Err(AppError::Validation(format!(
                    "item {} supplies different fields than item 0; every item of an upsert batch must supply the same fields",
                    i + 1
                )));
            }
        }
        let update = table
            .columns
            .iter()
            .filter(|c| !group.columns.contains(&c.name))
            .filter(|c| rows.iter().any(|row| row.iter().any(|b| b.column == c.name)))
            .map(|c| c.name.clone())
            .collect();
        plan.conflict = Some(ConflictClause {
            group: group.name.clone(),
            target: group.columns.clone(),
            update,
        });
    }
    Ok(plan)
}
