//! Describe a table config as column descriptors and bundle them into a table descriptor.

use crate::config::resolved::{unique_groups, ColumnDescriptor, DefaultValue, TableDescriptor};
use crate::config::types::*;
use crate::config::{validate, SemanticType};
use crate::error::SchemaError;
use std::collections::HashMap;

/// Normalize the table's column metadata. Pure; fails on unsupported types,
/// alias collisions and dangling key references.
pub fn describe(table: &TableConfig) -> Result<Vec<ColumnDescriptor>, SchemaError> {
    validate(table)?;

    let pk_names = table.primary_key.columns();
    let mut groups_by_column: HashMap<&str, Vec<String>> = HashMap::new();
    for pk in &pk_names {
        groups_by_column
            .entry(*pk)
            .or_default()
            .push(format!("{}_pkey", table.name));
    }
    for u in &table.unique {
        let (name, cols) = match u {
            UniqueConfig::Columns(cols) => (format!("{}_{}_key", table.name, cols.join("_")), cols),
            UniqueConfig::Named { name, columns } => (name.clone(), columns),
        };
        for c in cols {
            let entry = groups_by_column.entry(c.as_str()).or_default();
            if !entry.contains(&name) {
                entry.push(name.clone());
            }
        }
    }

    table
        .columns
        .iter()
        .map(|c| {
            let base = c.type_.base_name();
            let mapping = SemanticType::from_sql(&base).ok_or_else(|| SchemaError::UnsupportedType {
                column: c.name.clone(),
                ty: c.type_.sql(),
            })?;
            let default = match &c.default {
                Some(d) => Some(resolve_default(&c.name, &mapping.ty, d)),
                None if mapping.serial => Some(DefaultValue::Expression(format!(
                    "nextval('{}_{}_seq'::regclass)",
                    table.name, c.name
                ))),
                None => None,
            };
            let sql_type = if mapping.serial { mapping.ty.pg_name() } else { c.type_.sql() };
            Ok(ColumnDescriptor {
                name: c.name.clone(),
                ty: mapping.ty,
                sql_type,
                max_length: c.type_.max_length(),
                nullable: c.nullable && !pk_names.contains(&c.name.as_str()),
                default,
                alias: c.alias.clone().filter(|a| *a != c.name),
                primary_key: pk_names.contains(&c.name.as_str()),
                generated: c.generated,
                unique_groups: groups_by_column.remove(c.name.as_str()).unwrap_or_default(),
            })
        })
        .collect()
}

/// A literal default that parses as the column type becomes a typed literal;
/// anything else is kept as a server expression.
fn resolve_default(column: &str, ty: &SemanticType, d: &ColumnDefaultConfig) -> DefaultValue {
    match d {
        ColumnDefaultConfig::Expression { expression } => DefaultValue::Expression(expression.clone()),
        ColumnDefaultConfig::Literal(s) => match ty.parse_str(s) {
            Ok(v) => DefaultValue::Literal(v),
            Err(_) => {
                tracing::debug!(column = %column, default = %s, "default kept as expression");
                DefaultValue::Expression(s.clone())
            }
        },
    }
}

impl TableDescriptor {
    pub fn from_config(table: &TableConfig) -> Result<Self, SchemaError> {
        let columns = describe(table)?;
        let unique_groups = unique_groups(&columns);
        Ok(TableDescriptor {
            schema_name: table.schema.clone(),
            table_name: table.name.clone(),
            columns,
            unique_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn example() -> TableConfig {
        serde_json::from_value(json!({
            "name": "untitled_table_256",
            "primary_key": "id",
            "unique": [["id", "int4_value", "float4_value"]],
            "columns": [
                {"name": "id", "type": "serial", "alias": "primary_key"},
                {"name": "bool_value", "type": "bool", "nullable": false, "default": "false"},
                {"name": "float4_value", "type": "float4", "nullable": false},
                {"name": "int4_value", "type": "int4", "nullable": false, "alias": "int4_alias"},
                {"name": "int8_value", "type": "int8", "default": "99"},
                {"name": "date_value", "type": "date", "default": {"expression": "now()"}},
                {"name": "char_value", "type": {"name": "char", "params": [10]}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn describes_columns() {
        let cols = describe(&example()).unwrap();
        let id = &cols[0];
        assert!(id.primary_key);
        assert!(!id.nullable);
        assert_eq!(id.external_name(), "primary_key");
        assert!(matches!(id.default, Some(DefaultValue::Expression(ref e)) if e.starts_with("nextval")));
        assert_eq!(
            id.unique_groups,
            vec!["untitled_table_256_pkey".to_string(), "untitled_table_256_id_int4_value_float4_value_key".to_string()]
        );
        assert_eq!(cols[1].default, Some(DefaultValue::Literal(json!(false))));
        assert_eq!(cols[4].default, Some(DefaultValue::Literal(json!(99))));
        assert_eq!(cols[6].sql_type, "char(10)");
        assert_eq!(cols[6].max_length, Some(10));
        assert_eq!(cols[0].max_length, None);
        assert_eq!(cols[6].ty, SemanticType::Text);
    }

    #[test]
    fn groups_are_rebuilt_from_membership() {
        let t = TableDescriptor::from_config(&example()).unwrap();
        assert_eq!(t.unique_groups.len(), 2);
        let pk = t.primary_key_group().unwrap();
        assert_eq!(pk.columns, vec!["id".to_string()]);
        let composite = t.group("untitled_table_256_id_int4_value_float4_value_key").unwrap();
        assert_eq!(composite.columns, vec!["id", "float4_value", "int4_value"]);
        assert!(!composite.primary_key);
    }

    #[test]
    fn unsupported_type_is_a_schema_error() {
        let t: TableConfig = serde_json::from_value(json!({
            "name": "t",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "int4"},
                {"name": "doc", "type": "xml"}
            ]
        }))
        .unwrap();
        assert_eq!(
            describe(&t),
            Err(SchemaError::UnsupportedType { column: "doc".into(), ty: "xml".into() })
        );
    }
}
