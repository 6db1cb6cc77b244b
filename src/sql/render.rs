//! Lowers a QueryPlan to parameterized PostgreSQL.

use crate::config::{ColumnDescriptor, SemanticType, TableDescriptor};
use crate::error::AppError;
use crate::sql::{AssignValue, Assignment, FilterOp, OrderBy, PgBindValue, PlanOp, Predicate, QueryPlan};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub(crate) fn qualified_table(table: &TableDescriptor) -> String {
    match &table.schema_name {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(&table.table_name)),
        None => quoted(&table.table_name),
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Placeholder cast to the column type. Arrays travel as jsonb.
    fn placeholder(&mut self, v: &Value, ty: &SemanticType) -> Result<String, AppError> {
        let n = self.push_param(PgBindValue::from_typed(v, ty)?);
        Ok(match ty {
            SemanticType::Array(_) => format!(
                "CASE WHEN ${n}::jsonb IS NULL THEN NULL ELSE ARRAY(SELECT jsonb_array_elements_text(${n}::jsonb))::{} END",
                ty.pg_name()
            ),
            _ => format!("${}::{}", n, ty.pg_name()),
        })
    }
}

/// SELECT/RETURNING list. Types sqlx cannot decode into a plain value come back
/// as text, arrays as json.
pub fn select_list(table: &TableDescriptor) -> String {
    table.columns.iter().map(select_expr).collect::<Vec<_>>().join(", ")
}

fn select_expr(c: &ColumnDescriptor) -> String {
    let q = quoted(&c.name);
    match c.ty {
        SemanticType::Decimal
        | SemanticType::Interval
        | SemanticType::Time
        | SemanticType::TimeTz
        | SemanticType::Text
        | SemanticType::Date => format!("{}::text AS {}", q, q),
        SemanticType::Array(_) => format!("to_json({}) AS {}", q, q),
        _ => q,
    }
}

fn column<'a>(table: &'a TableDescriptor, name: &str) -> Result<&'a ColumnDescriptor, AppError> {
    table
        .column(name)
        .ok_or_else(|| AppError::Validation(format!("unknown column '{}'", name)))
}

fn where_clause(q: &mut QueryBuf, table: &TableDescriptor, predicates: &[Predicate]) -> Result<String, AppError> {
    if predicates.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(predicates.len());
    for p in predicates {
        let c = column(table, &p.column)?;
        let col = quoted(&c.name);
        let part = match p.op {
            FilterOp::IsNull => {
                if p.value.as_bool().unwrap_or(true) {
                    format!("{} IS NULL", col)
                } else {
                    format!("{} IS NOT NULL", col)
                }
            }
            FilterOp::In => {
                let n = q.push_param(PgBindValue::Json(p.value.clone()));
                format!(
                    "{} = ANY(ARRAY(SELECT jsonb_array_elements_text(${}::jsonb))::{}[])",
                    col,
                    n,
                    c.ty.pg_name()
                )
            }
            op => format!("{} {} {}", col, op.sql(), q.placeholder(&p.value, &c.ty)?),
        };
        parts.push(part);
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn order_clause(order_by: &[OrderBy]) -> String {
    if order_by.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order_by
        .iter()
        .map(|o| format!("{} {} NULLS LAST", quoted(&o.column), o.direction.sql()))
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

fn page_clause(plan: &QueryPlan) -> String {
    let mut s = String::new();
    if let Some(limit) = plan.limit {
        s.push_str(&format!(" LIMIT {}", limit));
    }
    if plan.offset > 0 {
        s.push_str(&format!(" OFFSET {}", plan.offset));
    }
    s
}

/// WHERE for update/delete: direct predicates, or a key sub-select when the
/// plan is restricted to one page.
fn target_clause(q: &mut QueryBuf, plan: &QueryPlan) -> Result<String, AppError> {
    let table = &plan.table;
    if !plan.is_paged() {
        return where_clause(q, table, &plan.predicates);
    }
    let keys = table
        .pk_columns()
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let inner_where = where_clause(q, table, &plan.predicates)?;
    Ok(format!(
        " WHERE ({}) IN (SELECT {} FROM {}{}{}{})",
        keys,
        keys,
        qualified_table(table),
        inner_where,
        order_clause(&plan.order_by),
        page_clause(plan)
    ))
}

fn value_expr(q: &mut QueryBuf, c: &ColumnDescriptor, v: &AssignValue) -> Result<String, AppError> {
    match v {
        AssignValue::Default => Ok("DEFAULT".into()),
        AssignValue::Value(v) => q.placeholder(v, &c.ty),
    }
}

fn set_list(q: &mut QueryBuf, table: &TableDescriptor, assignments: &[Assignment]) -> Result<String, AppError> {
    let mut parts = Vec::with_capacity(assignments.len());
    for a in assignments {
        let c = column(table, &a.column)?;
        parts.push(format!("{} = {}", quoted(&c.name), value_expr(q, c, &a.value)?));
    }
    Ok(parts.join(", "))
}

fn insert_sql(q: &mut QueryBuf, plan: &QueryPlan) -> Result<String, AppError> {
    let table = &plan.table;
    // Union of supplied columns across rows, in table order.
    let mut cols: Vec<&ColumnDescriptor> = table
        .columns
        .iter()
        .filter(|c| plan.rows.iter().any(|r| r.iter().any(|a| a.column == c.name)))
        .collect();
    if cols.is_empty() {
        cols.extend(table.columns.first());
    }
    let mut values = Vec::with_capacity(plan.rows.len());
    for row in &plan.rows {
        let mut cells = Vec::with_capacity(cols.len());
        for c in &cols {
            cells.push(match row.iter().find(|a| a.column == c.name) {
                Some(a) => value_expr(q, c, &a.value)?,
                None => "DEFAULT".into(),
            });
        }
        values.push(format!("({})", cells.join(", ")));
    }
    let col_list = cols.iter().map(|c| quoted(&c.name)).collect::<Vec<_>>().join(", ");
    let mut sql = format!("INSERT INTO {} ({}) VALUES {}", qualified_table(table), col_list, values.join(", "));
    if let Some(conflict) = &plan.conflict {
        let target = conflict.target.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", ");
        let update: Vec<String> = if conflict.update.is_empty() {
            // DO NOTHING would return no row; a no-op update still returns it.
            conflict.target.iter().take(1).map(|c| format!("{} = EXCLUDED.{}", quoted(c), quoted(c))).collect()
        } else {
            conflict.update.iter().map(|c| format!("{} = EXCLUDED.{}", quoted(c), quoted(c))).collect()
        };
        sql.push_str(&format!(" ON CONFLICT ({}) DO UPDATE SET {}", target, update.join(", ")));
    }
    Ok(sql)
}

/// Render the plan as one statement that returns the affected rows.
pub fn render(plan: &QueryPlan) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::default();
    let table = &plan.table;
    let cols = select_list(table);
    q.sql = match plan.op {
        PlanOp::Select => {
            let w = where_clause(&mut q, table, &plan.predicates)?;
            format!(
                "SELECT {} FROM {}{}{}{}",
                cols,
                qualified_table(table),
                w,
                order_clause(&plan.order_by),
                page_clause(plan)
            )
        }
        PlanOp::Insert | PlanOp::Upsert => {
            let insert = insert_sql(&mut q, plan)?;
            format!("{} RETURNING {}", insert, cols)
        }
        PlanOp::Update => {
            let set = set_list(&mut q, table, &plan.assignments)?;
            let w = target_clause(&mut q, plan)?;
            format!("UPDATE {} SET {}{} RETURNING {}", qualified_table(table), set, w, cols)
        }
        PlanOp::Delete => {
            let w = target_clause(&mut q, plan)?;
            format!("DELETE FROM {}{} RETURNING {}", qualified_table(table), w, cols)
        }
    };
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::sql::{ConflictClause, Direction};
    use serde_json::json;
    use std::sync::Arc;

    fn table() -> Arc<TableDescriptor> {
        let t: TableConfig = serde_json::from_value(json!({
            "schema": "public",
            "name": "items",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "serial"},
                {"name": "code", "type": "text", "nullable": false},
                {"name": "price", "type": "numeric(10,2)"},
                {"name": "tags", "type": "text[]"}
            ]
        }))
        .unwrap();
        Arc::new(TableDescriptor::from_config(&t).unwrap())
    }

    #[test]
    fn select_with_filters_and_page() {
        let mut plan = QueryPlan::new(PlanOp::Select, table());
        plan.predicates = vec![
            Predicate { column: "code".into(), op: FilterOp::Ne, value: json!("a") },
            Predicate { column: "id".into(), op: FilterOp::In, value: json!([1, 2]) },
            Predicate { column: "price".into(), op: FilterOp::IsNull, value: json!(false) },
        ];
        plan.order_by = vec![OrderBy { column: "id".into(), direction: Direction::Desc }];
        plan.limit = Some(10);
        plan.offset = 20;
        let q = render(&plan).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"code\"::text AS \"code\", \"price\"::text AS \"price\", to_json(\"tags\") AS \"tags\" \
             FROM \"public\".\"items\" WHERE \"code\" <> $1::text AND \
             \"id\" = ANY(ARRAY(SELECT jsonb_array_elements_text($2::jsonb))::int4[]) AND \"price\" IS NOT NULL \
             ORDER BY \"id\" DESC NULLS LAST LIMIT 10 OFFSET 20"
        );
        assert_eq!(q.params, vec![PgBindValue::String("a".into()), PgBindValue::Json(json!([1, 2]))]);
    }

    #[test]
    fn upsert_many_fills_defaults() {
        let mut plan = QueryPlan::new(PlanOp::Upsert, table());
        plan.rows = vec![
            vec![Assignment { column: "code".into(), value: AssignValue::Value(json!("a")) }],
            vec![
                Assignment { column: "id".into(), value: AssignValue::Value(json!(4)) },
                Assignment { column: "code".into(), value: AssignValue::Value(json!("b")) },
            ],
        ];
        plan.conflict = Some(ConflictClause {
            group: "items_pkey".into(),
            target: vec!["id".into()],
            update: vec!["code".into()],
        });
        let q = render(&plan).unwrap();
        assert!(q.sql.starts_with(
            "INSERT INTO \"public\".\"items\" (\"id\", \"code\") VALUES (DEFAULT, $1::text), ($2::int4, $3::text) \
             ON CONFLICT (\"id\") DO UPDATE SET \"code\" = EXCLUDED.\"code\" RETURNING "
        ));
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn empty_insert_uses_default_row() {
        let mut plan = QueryPlan::new(PlanOp::Insert, table());
        plan.rows = vec![vec![]];
        let q = render(&plan).unwrap();
        assert!(q.sql.starts_with("INSERT INTO \"public\".\"items\" (\"id\") VALUES (DEFAULT) RETURNING"));
    }

    #[test]
    fn array_assignment_goes_through_jsonb() {
        let mut plan = QueryPlan::new(PlanOp::Update, table());
        plan.assignments = vec![
            Assignment { column: "tags".into(), value: AssignValue::Value(json!(["x"])) },
            Assignment { column: "price".into(), value: AssignValue::Default },
        ];
        plan.predicates = vec![Predicate { column: "id".into(), op: FilterOp::Eq, value: json!(1) }];
        let q = render(&plan).unwrap();
        assert!(q.sql.starts_with(
            "UPDATE \"public\".\"items\" SET \"tags\" = CASE WHEN $1::jsonb IS NULL THEN NULL \
             ELSE ARRAY(SELECT jsonb_array_elements_text($1::jsonb))::text[] END, \"price\" = DEFAULT \
             WHERE \"id\" = $2::int4 RETURNING"
        ));
    }

    #[test]
    fn paged_delete_selects_keys() {
        let mut plan = QueryPlan::new(PlanOp::Delete, table());
        plan.limit = Some(1);
        plan.order_by = vec![OrderBy { column: "id".into(), direction: Direction::Asc }];
        let q = render(&plan).unwrap();
        assert!(q.sql.starts_with(
            "DELETE FROM \"public\".\"items\" WHERE (\"id\") IN (SELECT \"id\" FROM \"public\".\"items\" \
             ORDER BY \"id\" ASC NULLS LAST LIMIT 1) RETURNING"
        ));
    }
}
