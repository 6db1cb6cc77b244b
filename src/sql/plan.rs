//! Abstract query plan handed from the builder to a session.

use crate::config::TableDescriptor;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanOp {
    Select,
    Insert,
    Upsert,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value is a JSON array.
    In,
    /// Value is a boolean: true for IS NULL, false for IS NOT NULL.
    IsNull,
}

impl FilterOp {
    /// Query-string suffix, `None` for equality.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            FilterOp::Eq => None,
            FilterOp::Ne => Some("ne"),
            FilterOp::Gt => Some("gt"),
            FilterOp::Gte => Some("gte"),
            FilterOp::Lt => Some("lt"),
            FilterOp::Lte => Some("lte"),
            FilterOp::In => Some("in"),
            FilterOp::IsNull => Some("is_null"),
        }
    }

    pub fn from_suffix(s: &str) -> Option<FilterOp> {
        Some(match s {
            "ne" => FilterOp::Ne,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "in" => FilterOp::In,
            "is_null" => FilterOp::IsNull,
            _ => return None,
        })
    }

    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "IN",
            FilterOp::IsNull => "IS NULL",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AssignValue {
    Value(Value),
    /// Reset to the column's server default.
    Default,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: AssignValue,
}

/// ON CONFLICT (target) DO UPDATE SET update = excluded.update
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictClause {
    /// Uniqueness group the target comes from.
    pub group: String,
    pub target: Vec<String>,
    pub update: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

#[derive(Clone, Debug)]
pub struct QueryPlan {
    pub op: PlanOp,
    pub table: Arc<TableDescriptor>,
    pub predicates: Vec<Predicate>,
    /// Rows for insert/upsert; columns absent from a row take their default.
    pub rows: Vec<Vec<Assignment>>,
    /// SET list for update.
    pub assignments: Vec<Assignment>,
    pub conflict: Option<ConflictClause>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl QueryPlan {
    pub fn new(op: PlanOp, table: Arc<TableDescriptor>) -> Self {
        QueryPlan {
            op,
            table,
            predicates: Vec::new(),
            rows: Vec::new(),
            assignments: Vec::new(),
            conflict: None,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Whether an update/delete is restricted to one page of matches.
    pub fn is_paged(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} predicates={} rows={} set={} conflict={:?}",
            self.op,
            self.table.qualified_name(),
            self.predicates.len(),
            self.rows.len(),
            self.assignments.len(),
            self.conflict.as_ref().map(|c| c.group.as_str())
        )
    }
}
