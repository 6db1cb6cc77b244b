//! Table config validation: identifiers, key references and alias uniqueness.

use crate::config::TableConfig;
use crate::error::SchemaError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier regex"))
}

/// True for names usable unquoted as SQL identifiers and as route parameters.
pub fn is_identifier(s: &str) -> bool {
    identifier_re().is_match(s)
}

pub fn validate(table: &TableConfig) -> Result<(), SchemaError> {
    if !is_identifier(&table.name) {
        return Err(SchemaError::InvalidIdentifier(table.name.clone()));
    }
    if let Some(schema) = &table.schema {
        if !is_identifier(schema) {
            return Err(SchemaError::InvalidIdentifier(schema.clone()));
        }
    }

    let mut names = HashSet::new();
    for c in &table.columns {
        if !is_identifier(&c.name) {
            return Err(SchemaError::InvalidIdentifier(c.name.clone()));
        }
        if !names.insert(c.name.as_str()) {
            return Err(SchemaError::Validation(format!(
                "column '{}' declared twice in table {}",
                c.name, table.name
            )));
        }
    }

    // Aliases share the namespace of real names: no alias may equal another
    // column's name or another alias.
    let mut external = names.clone();
    for c in &table.columns {
        let Some(alias) = c.alias.as_deref() else { continue };
        if alias == c.name {
            continue;
        }
        if !is_identifier(alias) {
            return Err(SchemaError::InvalidIdentifier(alias.to_string()));
        }
        if !external.insert(alias) {
            return Err(SchemaError::AliasCollision {
                column: c.name.clone(),
                alias: alias.to_string(),
            });
        }
    }

    let pk_cols = table.primary_key.columns();
    if pk_cols.is_empty() {
        return Err(SchemaError::MissingPrimaryKey(table.name.clone()));
    }
    for pk in &pk_cols {
        if !names.contains(pk) {
            return Err(SchemaError::UnknownColumn {
                column: (*pk).to_string(),
                context: format!("primary key of {}", table.name),
            });
        }
    }

    for u in &table.unique {
        let (label, cols) = match u {
            crate::config::UniqueConfig::Columns(cols) => (None, cols),
            crate::config::UniqueConfig::Named { name, columns } => (Some(name.as_str()), columns),
        };
        if cols.is_empty() {
            return Err(SchemaError::Validation(format!(
                "unique constraint {} of {} has no columns",
                label.unwrap_or("(unnamed)"),
                table.name
            )));
        }
        for col in cols {
            if !names.contains(col.as_str()) {
                return Err(SchemaError::UnknownColumn {
                    column: col.clone(),
                    context: format!("unique constraint of {}", table.name),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(v: serde_json::Value) -> TableConfig {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn alias_may_not_shadow_another_column() {
        let t = table(json!({
            "name": "t",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "int4", "nullable": false},
                {"name": "title", "type": "text", "alias": "id"}
            ]
        }));
        assert_eq!(
            validate(&t),
            Err(SchemaError::AliasCollision { column: "title".into(), alias: "id".into() })
        );
    }

    #[test]
    fn two_aliases_may_not_collide() {
        let t = table(json!({
            "name": "t",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "int4", "nullable": false},
                {"name": "a", "type": "text", "alias": "x"},
                {"name": "b", "type": "text", "alias": "x"}
            ]
        }));
        assert!(matches!(validate(&t), Err(SchemaError::AliasCollision { .. })));
    }

    #[test]
    fn key_columns_must_exist() {
        let t = table(json!({
            "name": "t",
            "primary_key": "nope",
            "columns": [{"name": "id", "type": "int4"}]
        }));
        assert!(matches!(validate(&t), Err(SchemaError::UnknownColumn { .. })));

        let t = table(json!({
            "name": "t",
            "primary_key": "id",
            "unique": [["id", "missing"]],
            "columns": [{"name": "id", "type": "int4"}]
        }));
        assert!(matches!(validate(&t), Err(SchemaError::UnknownColumn { .. })));
    }

    #[test]
    fn rejects_bad_identifiers() {
        let t = table(json!({
            "name": "t; drop table x",
            "primary_key": "id",
            "columns": [{"name": "id", "type": "int4"}]
        }));
        assert!(matches!(validate(&t), Err(SchemaError::InvalidIdentifier(_))));
    }
}
