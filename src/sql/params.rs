//! Convert typed serde_json::Value to values that sqlx can bind.

use crate::config::SemanticType;
use crate::error::AppError;
use base64::Engine;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A value that can be bound to a PostgreSQL query. The rendered SQL casts
/// every placeholder to the column type, so text carries dates, uuids,
/// decimals and intervals.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl PgBindValue {
    /// Convert a value already checked against `ty` by the request binder.
    pub fn from_typed(v: &Value, ty: &SemanticType) -> Result<Self, AppError> {
        if v.is_null() {
            return Ok(PgBindValue::Null);
        }
        let mismatch = || AppError::Validation(format!("value {} does not fit {}", v, ty.pg_name()));
        Ok(match ty {
            SemanticType::Boolean => PgBindValue::Bool(v.as_bool().ok_or_else(mismatch)?),
            SemanticType::SmallInt | SemanticType::Integer | SemanticType::BigInt => {
                PgBindValue::I64(v.as_i64().ok_or_else(mismatch)?)
            }
            SemanticType::Real | SemanticType::Double => PgBindValue::F64(v.as_f64().ok_or_else(mismatch)?),
            SemanticType::Decimal => match v {
                Value::Number(n) => PgBindValue::String(n.to_string()),
                Value::String(s) => PgBindValue::String(s.clone()),
                _ => return Err(mismatch()),
            },
            SemanticType::Binary => {
                let s = v.as_str().ok_or_else(mismatch)?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|_| AppError::Validation("expected base64-encoded bytes".into()))?;
                PgBindValue::Bytes(bytes)
            }
            SemanticType::Json | SemanticType::Jsonb | SemanticType::Array(_) => PgBindValue::Json(v.clone()),
            _ => PgBindValue::String(v.as_str().ok_or_else(mismatch)?.to_string()),
        })
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => IsNull::Yes,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Bytes(b) => <Vec<u8> as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::Json(v) => <serde_json::Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => <String as Type<Postgres>>::type_info(),
            PgBindValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
            PgBindValue::I64(_) => <i64 as Type<Postgres>>::type_info(),
            PgBindValue::F64(_) => <f64 as Type<Postgres>>::type_info(),
            PgBindValue::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
            PgBindValue::Json(_) => <serde_json::Value as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_by_semantic_type() {
        assert_eq!(PgBindValue::from_typed(&json!(5), &SemanticType::SmallInt).unwrap(), PgBindValue::I64(5));
        assert_eq!(PgBindValue::from_typed(&json!(1.5), &SemanticType::Real).unwrap(), PgBindValue::F64(1.5));
        assert_eq!(
            PgBindValue::from_typed(&json!(10.25), &SemanticType::Decimal).unwrap(),
            PgBindValue::String("10.25".into())
        );
        assert_eq!(
            PgBindValue::from_typed(&json!("aGk="), &SemanticType::Binary).unwrap(),
            PgBindValue::Bytes(b"hi".to_vec())
        );
        assert_eq!(
            PgBindValue::from_typed(&json!([1, 2]), &SemanticType::Array(Box::new(SemanticType::Integer))).unwrap(),
            PgBindValue::Json(json!([1, 2]))
        );
        assert_eq!(PgBindValue::from_typed(&Value::Null, &SemanticType::Uuid).unwrap(), PgBindValue::Null);
        assert!(PgBindValue::from_typed(&json!("x"), &SemanticType::Integer).is_err());
    }
}
