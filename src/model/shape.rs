//! Typed request/response shapes and binding of raw request values against them.

use crate::config::{DefaultValue, SemanticType};
use crate::error::AppError;
use crate::model::{OperationKind, ResponseKind};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Query parameters that are never column filters.
pub const LIMIT_PARAM: &str = "limit";
pub const OFFSET_PARAM: &str = "offset";
pub const ORDER_BY_PARAM: &str = "order_by";
pub const DIRECTION_PARAM: &str = "direction";
pub const RESERVED_QUERY_PARAMS: [&str; 4] = [LIMIT_PARAM, OFFSET_PARAM, ORDER_BY_PARAM, DIRECTION_PARAM];

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    /// External name: the alias when one is declared, else the column name.
    pub name: String,
    /// Real column name.
    pub column: String,
    pub ty: SemanticType,
    /// Character limit of a `varchar(n)`/`char(n)` column.
    pub max_length: Option<usize>,
    pub required: bool,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

impl FieldSpec {
    /// Trailing spaces do not count, as with PostgreSQL's own check.
    fn check_length(&self, value: &Value) -> Result<(), AppError> {
        match (self.max_length, value) {
            (Some(max), Value::String(s)) if s.trim_end_matches(' ').chars().count() > max => Err(
                AppError::Validation(format!("{} is longer than {} characters", self.name, max)),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSet {
    pub fields: Vec<FieldSpec>,
}

/// Value supplied for one field, keyed by real column name.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundField {
    pub column: String,
    pub value: Value,
}

impl ParamSet {
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn by_column(&self, column: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse path segments (external names) into typed values.
    pub fn bind_path(&self, raw: &HashMap<String, String>) -> Result<Vec<BoundField>, AppError> {
        self.fields
            .iter()
            .map(|f| {
                let s = raw
                    .get(&f.name)
                    .ok_or_else(|| AppError::BadRequest(format!("missing path parameter '{}'", f.name)))?;
                let value = f
                    .ty
                    .parse_str(s)
                    .map_err(|e| AppError::Validation(format!("{}: {}", f.name, e)))?;
                Ok(BoundField { column: f.column.clone(), value })
            })
            .collect()
    }

    /// Validate a JSON object against the set: unknown fields, type mismatches,
    /// nulls for non-nullable fields and missing required fields are rejected.
    /// Returns supplied fields in declaration order.
    pub fn bind_object(&self, obj: &Map<String, Value>) -> Result<Vec<BoundField>, AppError> {
        for key in obj.keys() {
            if !self.contains(key) {
                return Err(AppError::Validation(format!("unknown field '{}'", key)));
            }
        }
        let mut out = Vec::with_capacity(obj.len());
        for f in &self.fields {
            match obj.get(&f.name) {
                Some(v) => {
                    if v.is_null() && !f.nullable {
                        return Err(AppError::Validation(format!("{} may not be null", f.name)));
                    }
                    let value = f
                        .ty
                        .coerce_json(v)
                        .map_err(|e| AppError::Validation(format!("{}: {}", f.name, e)))?;
                    f.check_length(&value)?;
                    out.push(BoundField { column: f.column.clone(), value });
                }
                None if f.required => {
                    return Err(AppError::Validation(format!("{} is required", f.name)));
                }
                None => {}
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryParams {
    /// One optional filter field per column; operator suffixes are resolved by the query builder.
    pub filters: ParamSet,
    /// Whether `limit`, `offset`, `order_by` and `direction` are accepted.
    pub paginated: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BodyParams {
    /// A single JSON object.
    One(ParamSet),
    /// A JSON array of objects.
    Many(ParamSet),
}

impl BodyParams {
    pub fn fields(&self) -> &ParamSet {
        match self {
            BodyParams::One(p) | BodyParams::Many(p) => p,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestShape {
    pub path: Option<ParamSet>,
    pub query: Option<QueryParams>,
    pub body: Option<BodyParams>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseShape {
    pub kind: ResponseKind,
    /// Row fields for row kinds; location fields for the redirect kind.
    pub fields: ParamSet,
}

impl ResponseShape {
    /// Project a raw row (real column names) onto the shape (external names).
    pub fn project(&self, row: &Map<String, Value>) -> Value {
        let mut out = Map::with_capacity(self.fields.fields.len());
        for f in &self.fields.fields {
            out.insert(f.name.clone(), row.get(&f.column).cloned().unwrap_or(Value::Null));
        }
        Value::Object(out)
    }
}

/// Everything synthesized for one (table, operation kind) pairing.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationShapes {
    pub kind: OperationKind,
    pub request: RequestShape,
    pub response: ResponseShape,
    /// Key columns of the table, in declaration order (real names).
    pub key_columns: Vec<String>,
}

/// Request values bound against a kind's shapes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestValues {
    pub path: Vec<BoundField>,
    /// Raw query pairs; filters are parsed by the query builder.
    pub query: Vec<(String, String)>,
    pub body: BodyValues,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum BodyValues {
    #[default]
    None,
    One(Vec<BoundField>),
    Many(Vec<Vec<BoundField>>),
}

impl OperationShapes {
    /// Bind a parsed JSON body against the body shape. Kinds without a body
    /// ignore it.
    pub fn bind_body(&self, body: Option<Value>) -> Result<BodyValues, AppError> {
        let Some(shape) = &self.request.body else {
            return Ok(BodyValues::None);
        };
        let body = body.ok_or_else(|| AppError::BadRequest("request body required".into()))?;
        match shape {
            BodyParams::One(params) => match body {
                Value::Object(obj) => Ok(BodyValues::One(params.bind_object(&obj)?)),
                _ => Err(AppError::BadRequest("body must be a JSON object".into())),
            },
            BodyParams::Many(params) => match body {
                Value::Array(items) => {
                    if items.is_empty() {
                        return Err(AppError::Validation("body must contain at least one item".into()));
                    }
                    let mut rows = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Object(obj) => rows.push(params.bind_object(&obj)?),
                            _ => return Err(AppError::BadRequest("each item must be a JSON object".into())),
                        }
                    }
                    Ok(BodyValues::Many(rows))
                }
                _ => Err(AppError::BadRequest("body must be a JSON array".into())),
            },
        }
    }
}
