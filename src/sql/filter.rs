//! Query-string parsing: filter operator suffixes, pagination and ordering.

use crate::error::AppError;
use crate::model::{FieldSpec, QueryParams, DIRECTION_PARAM, LIMIT_PARAM, OFFSET_PARAM, ORDER_BY_PARAM};
use crate::sql::{Direction, FilterOp, OrderBy, Predicate};
use serde_json::Value;

/// Separator between a field name and its operator suffix: `age__gte=18`.
pub const SUFFIX_SEPARATOR: &str = "__";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedQuery {
    pub predicates: Vec<Predicate>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub order_by: Vec<OrderBy>,
}

/// Parse raw query pairs against the kind's query shape. Every pair must be a
/// filter field (optionally suffixed) or, for paginated kinds, one of the
/// pagination/ordering parameters.
pub fn parse_query(params: Option<&QueryParams>, pairs: &[(String, String)]) -> Result<ParsedQuery, AppError> {
    let mut out = ParsedQuery::default();
    let Some(params) = params else {
        if let Some((k, _)) = pairs.first() {
            return Err(AppError::Validation(format!("unknown query parameter '{}'", k)));
        }
        return Ok(out);
    };

    let mut order_fields: Vec<&FieldSpec> = Vec::new();
    let mut direction = Direction::Asc;

    for (key, raw) in pairs {
        if params.paginated {
            match key.as_str() {
                LIMIT_PARAM => {
                    out.limit = Some(parse_non_negative(LIMIT_PARAM, raw)?);
                    continue;
                }
                OFFSET_PARAM => {
                    out.offset = parse_non_negative(OFFSET_PARAM, raw)?;
                    continue;
                }
                ORDER_BY_PARAM => {
                    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        let f = params
                            .filters
                            .get(name)
                            .ok_or_else(|| AppError::Validation(format!("cannot order by unknown field '{}'", name)))?;
                        if !f.ty.is_sortable() {
                            return Err(AppError::Validation(format!("cannot order by '{}'", name)));
                        }
                        order_fields.push(f);
                    }
                    continue;
                }
                DIRECTION_PARAM => {
                    direction = match raw.to_lowercase().as_str() {
                        "asc" => Direction::Asc,
                        "desc" => Direction::Desc,
                        _ => {
                            return Err(AppError::Validation(format!(
                                "direction must be 'asc' or 'desc', got '{}'",
                                raw
                            )))
                        }
                    };
                    continue;
                }
                _ => {}
            }
        }

        let (field, op) = resolve_key(params, key)?;
        out.predicates.push(predicate(field, op, raw)?);
    }

    out.order_by = order_fields
        .into_iter()
        .map(|f| OrderBy { column: f.column.clone(), direction })
        .collect();
    Ok(out)
}

/// An exact field match wins; otherwise split at the last separator.
fn resolve_key<'a>(params: &'a QueryParams, key: &str) -> Result<(&'a FieldSpec, FilterOp), AppError> {
    if let Some(f) = params.filters.get(key) {
        return Ok((f, FilterOp::Eq));
    }
    if let Some(i) = key.rfind(SUFFIX_SEPARATOR) {
        let (name, suffix) = (&key[..i], &key[i + SUFFIX_SEPARATOR.len()..]);
        if let Some(f) = params.filters.get(name) {
            let op = FilterOp::from_suffix(suffix).ok_or_else(|| {
                AppError::Validation(format!("unknown filter operator '{}' for field '{}'", suffix, name))
            })?;
            return Ok((f, op));
        }
    }
    Err(AppError::Validation(format!("unknown query parameter '{}'", key)))
}

fn predicate(f: &FieldSpec, op: FilterOp, raw: &str) -> Result<Predicate, AppError> {
    let supported = match op {
        FilterOp::IsNull => true,
        FilterOp::Eq | FilterOp::Ne | FilterOp::In => f.ty.supports_equality(),
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => f.ty.is_orderable(),
    };
    if !supported {
        return Err(AppError::Validation(format!(
            "operator '{}' is not supported for field '{}'",
            op.suffix().unwrap_or("eq"),
            f.name
        )));
    }
    let invalid = |e: String| AppError::Validation(format!("{}: {}", f.name, e));
    let value = match op {
        FilterOp::IsNull => match raw.to_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(invalid(format!("'{}' is not a boolean", raw))),
        },
        FilterOp::In => Value::Array(
            raw.split(',')
                .filter(|s| !s.is_empty())
                .map(|s| f.ty.parse_str(s.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?,
        ),
        _ => f.ty.parse_str(raw).map_err(invalid)?,
    };
    Ok(Predicate { column: f.column.clone(), op, value })
}

fn parse_non_negative(name: &str, raw: &str) -> Result<u64, AppError> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{} must be an integer, got '{}'", name, raw)))?;
    u64::try_from(n).map_err(|_| AppError::Validation(format!("{} may not be negative", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SemanticType;
    use crate::model::ParamSet;
    use serde_json::json;

    fn spec(name: &str, column: &str, ty: SemanticType) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            column: column.into(),
            ty,
            max_length: None,
            required: false,
            nullable: true,
            default: None,
        }
    }

    fn params() -> QueryParams {
        QueryParams {
            filters: ParamSet {
                fields: vec![
                    spec("age", "age", SemanticType::Integer),
                    spec("text_alias", "text_value", SemanticType::Text),
                    spec("array_str__value", "array_str__value", SemanticType::Array(Box::new(SemanticType::Text))),
                    spec("doc", "doc", SemanticType::Jsonb),
                ],
            },
            paginated: true,
        }
    }

    fn pairs(v: &[(&str, &str)]) -> Vec<(String, String)> {
        v.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn suffixes_map_to_operators() {
        let p = params();
        let q = parse_query(
            Some(&p),
            &pairs(&[("age__gte", "18"), ("age__in", "1,2,3"), ("text_alias__ne", "x"), ("doc__is_null", "true")]),
        )
        .unwrap();
        assert_eq!(
            q.predicates,
            vec![
                Predicate { column: "age".into(), op: FilterOp::Gte, value: json!(18) },
                Predicate { column: "age".into(), op: FilterOp::In, value: json!([1, 2, 3]) },
                Predicate { column: "text_value".into(), op: FilterOp::Ne, value: json!("x") },
                Predicate { column: "doc".into(), op: FilterOp::IsNull, value: json!(true) },
            ]
        );
    }

    #[test]
    fn exact_field_name_with_separator_wins() {
        let p = params();
        let q = parse_query(Some(&p), &pairs(&[("array_str__value__is_null", "false")])).unwrap();
        assert_eq!(q.predicates[0].column, "array_str__value");
        assert_eq!(q.predicates[0].op, FilterOp::IsNull);
    }

    #[test]
    fn unknown_suffix_and_parameter_are_rejected() {
        let p = params();
        let err = parse_query(Some(&p), &pairs(&[("age__between", "1")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("unknown filter operator 'between'")));
        assert!(parse_query(Some(&p), &pairs(&[("nope", "1")])).is_err());
        assert!(parse_query(Some(&p), &pairs(&[("text_value", "x")])).is_err());
        assert!(parse_query(Some(&p), &pairs(&[("doc__gt", "1")])).is_err());
    }

    #[test]
    fn pagination_and_ordering() {
        let p = params();
        let q = parse_query(
            Some(&p),
            &pairs(&[("limit", "10"), ("offset", "5"), ("order_by", "text_alias,age"), ("direction", "DESC")]),
        )
        .unwrap();
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, 5);
        assert_eq!(
            q.order_by,
            vec![
                OrderBy { column: "text_value".into(), direction: Direction::Desc },
                OrderBy { column: "age".into(), direction: Direction::Desc },
            ]
        );
        assert!(parse_query(Some(&p), &pairs(&[("limit", "-1")])).is_err());
        assert!(parse_query(Some(&p), &pairs(&[("offset", "-3")])).is_err());
        assert!(parse_query(Some(&p), &pairs(&[("order_by", "missing")])).is_err());
        assert!(parse_query(Some(&p), &pairs(&[("direction", "sideways")])).is_err());
    }

    #[test]
    fn pagination_is_only_for_paginated_kinds() {
        let mut p = params();
        p.paginated = false;
        assert!(parse_query(Some(&p), &pairs(&[("limit", "1")])).is_err());
        assert!(parse_query(None, &pairs(&[("age", "1")])).is_err());
        assert_eq!(parse_query(None, &[]).unwrap(), ParsedQuery::default());
    }
}
