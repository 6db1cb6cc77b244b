//! Raw config types: table definitions and router settings as they arrive in JSON.

use crate::model::OperationKind;
use crate::service::ExecutionMode;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeyConfig {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKeyConfig::Single(s) => vec![s.as_str()],
            PrimaryKeyConfig::Composite(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// A uniqueness constraint: either a bare column list (name derived from the
/// table and columns, the way PostgreSQL names it) or an explicitly named one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniqueConfig {
    Columns(Vec<String>),
    Named { name: String, columns: Vec<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub primary_key: PrimaryKeyConfig,
    #[serde(default)]
    pub unique: Vec<UniqueConfig>,
    pub columns: Vec<ColumnConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    /// Base type name without parameters, e.g. `varchar` for `varchar(10)`.
    pub fn base_name(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => match s.find('(') {
                Some(i) => {
                    let (head, tail) = s.split_at(i);
                    // keep array markers that follow the parameter list: numeric(10,2)[]
                    let suffix = tail.rfind(')').map(|j| &tail[j + 1..]).unwrap_or("");
                    format!("{}{}", head.trim(), suffix.trim())
                }
                None => s.trim().to_string(),
            },
            ColumnTypeConfig::Parameterized { name, .. } => name.trim().to_string(),
        }
    }

    /// Declared character limit of a `varchar(n)`/`char(n)` column.
    pub fn max_length(&self) -> Option<usize> {
        let base = self.base_name().to_lowercase();
        if !matches!(base.as_str(), "varchar" | "character varying" | "char" | "character" | "bpchar") {
            return None;
        }
        match self {
            ColumnTypeConfig::Simple(s) => {
                let open = s.find('(')?;
                let close = s[open..].find(')')? + open;
                s[open + 1..close].trim().parse().ok()
            }
            ColumnTypeConfig::Parameterized { params, .. } => {
                params.as_ref().and_then(|p| p.first()).map(|n| *n as usize)
            }
        }
    }

    /// Full SQL type text for DDL, e.g. `varchar(10)`.
    pub fn sql(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => s.trim().to_string(),
            ColumnTypeConfig::Parameterized { name, params } => match params {
                Some(p) if !p.is_empty() => format!(
                    "{}({})",
                    name.trim(),
                    p.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
                ),
                _ => name.trim().to_string(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression { expression: String },
}

impl<'de> Deserialize<'de> for ColumnDefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) => Ok(ColumnDefaultConfig::Literal(s)),
            serde_json::Value::Bool(b) => Ok(ColumnDefaultConfig::Literal(b.to_string())),
            serde_json::Value::Number(n) => Ok(ColumnDefaultConfig::Literal(n.to_string())),
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::String(s)) = obj.remove("expression") {
                    return Ok(ColumnDefaultConfig::Expression { expression: s });
                }
                if let Some(serde_json::Value::String(s)) =
                    obj.remove("value").or_else(|| obj.remove("literal"))
                {
                    return Ok(ColumnDefaultConfig::Literal(s));
                }
                Err(serde::de::Error::custom(format!(
                    "column default must be a string, {{ \"expression\": \"...\" }}, or {{ \"value\": \"...\" }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            other => Err(serde::de::Error::custom(format!(
                "column default must be a scalar or {{ \"expression\": \"...\" }}; got {}",
                type_name_of_json(&other)
            ))),
        }
    }
}

fn type_name_of_json(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefaultConfig>,
    /// External name used in requests and responses instead of `name`.
    #[serde(default)]
    pub alias: Option<String>,
    /// Computed by the server (identity ALWAYS, generated columns); never writable.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Settings for one generated router.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrudRouterConfig {
    /// Path every route is mounted under, e.g. `/users`.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Column names hidden from every request and response shape.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_operations")]
    pub operations: Vec<OperationKind>,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Commit per statement instead of per request.
    #[serde(default)]
    pub autocommit: bool,
    /// Name of the uniqueness group upserts resolve against; primary key when unset.
    #[serde(default)]
    pub conflict_target: Option<String>,
    /// When false, upserts are plain inserts and any duplicate answers 409.
    #[serde(default = "default_true")]
    pub resolve_conflicts: bool,
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_operations() -> Vec<OperationKind> {
    OperationKind::FULL_CRUD.to_vec()
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

impl Default for CrudRouterConfig {
    fn default() -> Self {
        CrudRouterConfig {
            prefix: String::new(),
            tags: Vec::new(),
            exclude: Vec::new(),
            operations: default_operations(),
            mode: ExecutionMode::default(),
            autocommit: false,
            conflict_target: None,
            resolve_conflicts: true,
            body_limit: default_body_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_defaults_accept_literals_and_expressions() {
        let c: ColumnConfig = serde_json::from_value(json!({
            "name": "created_at",
            "type": "timestamptz",
            "default": { "expression": "now()" }
        }))
        .unwrap();
        assert!(c.nullable);
        assert!(matches!(c.default, Some(ColumnDefaultConfig::Expression { ref expression }) if expression == "now()"));

        let c: ColumnConfig =
            serde_json::from_value(json!({"name": "n", "type": "int8", "default": 99})).unwrap();
        assert!(matches!(c.default, Some(ColumnDefaultConfig::Literal(ref s)) if s == "99"));

        let err = serde_json::from_value::<ColumnConfig>(json!({"name": "n", "type": "int8", "default": [1]}));
        assert!(err.is_err());
    }

    #[test]
    fn type_names() {
        let t = ColumnTypeConfig::Simple("varchar(10)".into());
        assert_eq!(t.base_name(), "varchar");
        assert_eq!(t.sql(), "varchar(10)");
        let t = ColumnTypeConfig::Simple("numeric(10,2)[]".into());
        assert_eq!(t.base_name(), "numeric[]");
        let t = ColumnTypeConfig::Parameterized { name: "char".into(), params: Some(vec![10]) };
        assert_eq!(t.base_name(), "char");
        assert_eq!(t.sql(), "char(10)");
        assert_eq!(t.max_length(), Some(10));
        assert_eq!(ColumnTypeConfig::Simple("varchar(10)".into()).max_length(), Some(10));
        assert_eq!(ColumnTypeConfig::Simple("varchar".into()).max_length(), None);
        assert_eq!(ColumnTypeConfig::Simple("varchar(10)[]".into()).max_length(), None);
        assert_eq!(ColumnTypeConfig::Simple("numeric(10,2)".into()).max_length(), None);
    }

    #[test]
    fn router_config_defaults() {
        let c: CrudRouterConfig = serde_json::from_value(json!({
            "prefix": "/users",
            "operations": ["find_one", "upsert_many"],
            "mode": "sync"
        }))
        .unwrap();
        assert_eq!(c.operations, vec![OperationKind::FindOne, OperationKind::UpsertMany]);
        assert_eq!(c.mode, ExecutionMode::Sync);
        assert!(c.resolve_conflicts);
        assert!(!c.autocommit);

        let c: CrudRouterConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(c.operations, OperationKind::FULL_CRUD.to_vec());
        assert_eq!(c.body_limit, 2 * 1024 * 1024);
    }
}
