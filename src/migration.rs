//! Apply a table descriptor to the database: schema, table, key and unique constraints.

use crate::config::{ColumnDescriptor, DefaultValue, SemanticType, TableDescriptor};
use crate::error::AppError;
use crate::sql::render::{qualified_table, quoted};
use sqlx::PgPool;

/// Create the schema and table if missing. Idempotent; an existing table is
/// left as is.
pub async fn ensure_table(pool: &PgPool, table: &TableDescriptor) -> Result<(), AppError> {
    for sql in table_ddl(table) {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!(table = %table.qualified_name(), "table ensured");
    Ok(())
}

/// DDL statements, in execution order.
pub fn table_ddl(table: &TableDescriptor) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(schema) = &table.schema_name {
        out.push(format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)));
    }

    let mut defs: Vec<String> = table.columns.iter().map(|c| column_def(table, c)).collect();
    let pk: Vec<String> = table.pk_columns().iter().map(|c| quoted(&c.name)).collect();
    if !pk.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    for g in table.unique_groups.iter().filter(|g| !g.primary_key) {
        let cols: Vec<String> = g.columns.iter().map(|s| quoted(s)).collect();
        defs.push(format!("CONSTRAINT {} UNIQUE ({})", quoted(&g.name), cols.join(", ")));
    }
    out.push(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(table),
        defs.join(",\n  ")
    ));
    out
}

fn column_def(table: &TableDescriptor, c: &ColumnDescriptor) -> String {
    // The implicit sequence default of a serial column is recreated by the serial type itself.
    let implicit_seq = format!("nextval('{}_{}_seq'::regclass)", table.table_name, c.name);
    if matches!(&c.default, Some(DefaultValue::Expression(e)) if *e == implicit_seq) {
        let serial = match c.ty {
            SemanticType::SmallInt => "smallserial",
            SemanticType::BigInt => "bigserial",
            _ => "serial",
        };
        return format!("{} {}", quoted(&c.name), serial);
    }
    let mut def = format!("{} {}", quoted(&c.name), c.sql_type);
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        def.push_str(&d.sql());
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use serde_json::json;

    #[test]
    fn ddl_for_example_table() {
        let t: TableConfig = serde_json::from_value(json!({
            "schema": "public",
            "name": "items",
            "primary_key": "id",
            "unique": [["code", "version"]],
            "columns": [
                {"name": "id", "type": "bigserial"},
                {"name": "code", "type": "varchar(10)", "nullable": false},
                {"name": "version", "type": "int4", "nullable": false, "default": 1},
                {"name": "created", "type": "timestamptz", "default": {"expression": "now()"}},
                {"name": "label", "type": "text", "default": "it's"}
            ]
        }))
        .unwrap();
        let t = TableDescriptor::from_config(&t).unwrap();
        let ddl = table_ddl(&t);
        assert_eq!(ddl[0], "CREATE SCHEMA IF NOT EXISTS \"public\"");
        assert_eq!(
            ddl[1],
            "CREATE TABLE IF NOT EXISTS \"public\".\"items\" (\n  \
             \"id\" bigserial,\n  \
             \"code\" varchar(10) NOT NULL,\n  \
             \"version\" int4 NOT NULL DEFAULT 1,\n  \
             \"created\" timestamptz DEFAULT now(),\n  \
             \"label\" text DEFAULT 'it''s',\n  \
             PRIMARY KEY (\"id\"),\n  \
             CONSTRAINT \"items_code_version_key\" UNIQUE (\"code\", \"version\")\n)"
        );
    }
}
