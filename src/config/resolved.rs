//! Resolved table model: config validated and flattened for binding.

use crate::config::SemanticType;
use serde_json::Value;

/// Column default as the server applies it.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    /// Typed literal, e.g. `false` or `99`.
    Literal(Value),
    /// Server-side expression, e.g. `now()` or `nextval('t_id_seq'::regclass)`.
    Expression(String),
}

impl DefaultValue {
    /// SQL text for DDL.
    pub fn sql(&self) -> String {
        match self {
            DefaultValue::Literal(Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Literal(v) => v.to_string(),
            DefaultValue::Expression(e) => e.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub ty: SemanticType,
    /// Declared SQL type, e.g. `varchar(10)`.
    pub sql_type: String,
    /// Character limit from `varchar(n)`/`char(n)`.
    pub max_length: Option<usize>,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub alias: Option<String>,
    pub primary_key: bool,
    pub generated: bool,
    /// Names of the uniqueness groups this column belongs to.
    pub unique_groups: Vec<String>,
}

impl ColumnDescriptor {
    /// Name exposed in requests and responses.
    pub fn external_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Named set of columns that together must be unique.
#[derive(Clone, Debug, PartialEq)]
pub struct UniqueGroup {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: bool,
}

/// Rebuild the uniqueness groups from column membership, preserving
/// declaration order of the columns.
pub fn unique_groups(columns: &[ColumnDescriptor]) -> Vec<UniqueGroup> {
    let mut groups: Vec<UniqueGroup> = Vec::new();
    for c in columns {
        for g in &c.unique_groups {
            match groups.iter_mut().find(|x| x.name == *g) {
                Some(group) => group.columns.push(c.name.clone()),
                None => groups.push(UniqueGroup {
                    name: g.clone(),
                    columns: vec![c.name.clone()],
                    primary_key: false,
                }),
            }
        }
    }
    for group in &mut groups {
        let pk: Vec<&str> = columns.iter().filter(|c| c.primary_key).map(|c| c.name.as_str()).collect();
        group.primary_key = !pk.is_empty()
            && pk.len() == group.columns.len()
            && pk.iter().all(|p| group.columns.iter().any(|c| c == p));
    }
    groups
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescriptor {
    pub schema_name: Option<String>,
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub unique_groups: Vec<UniqueGroup>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn pk_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn primary_key_group(&self) -> Option<&UniqueGroup> {
        self.unique_groups.iter().find(|g| g.primary_key)
    }

    pub fn group(&self, name: &str) -> Option<&UniqueGroup> {
        self.unique_groups.iter().find(|g| g.name == name)
    }

    /// `schema.table` or `table`, unquoted. Used as a key by stores.
    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(s) => format!("{}.{}", s, self.table_name),
            None => self.table_name.clone(),
        }
    }
}
