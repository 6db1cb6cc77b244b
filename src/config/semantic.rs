//! Semantic column types: mapping from SQL type names and value coercion for
//! request fields (JSON bodies, path segments, query strings).

use base64::Engine;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

const INTERVAL_UNITS: &str = "microseconds?|milliseconds?|seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?|months?|mons?|years?|yrs?|decades?|centuries|century|millenniums?|millennia";

fn iso_interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let n = r"\d+(?:\.\d+)?";
        Regex::new(&format!(
            r"(?i)^P(?:{n}Y)?(?:{n}M)?(?:{n}W)?(?:{n}D)?(?:T(?:{n}H)?(?:{n}M)?(?:{n}S)?)?$"
        ))
        .expect("static interval regex")
    })
}

fn pg_interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^@?\s*(?:[+-]?\d+(?:\.\d+)?\s*(?:{INTERVAL_UNITS})(?:\s+|$))*(?:[+-]?\d+:\d{{2}}(?::\d{{2}}(?:\.\d+)?)?)?(?:\s*ago)?$"
        ))
        .expect("static interval regex")
    })
}

/// ISO 8601 durations (`P1DT2H`) and PostgreSQL's verbose form
/// (`1 day 02:00:00`, `3 hours ago`).
fn is_interval(s: &str) -> bool {
    let s = s.trim();
    s.bytes().any(|b| b.is_ascii_digit()) && (iso_interval_re().is_match(s) || pg_interval_re().is_match(s))
}

/// A time of day followed by a UTC offset: `10:00:00+02`, `10:00+05:30`, `10:00:00Z`.
fn is_timetz(s: &str) -> bool {
    let s = s.trim();
    let (time, offset) = match s.strip_suffix(['Z', 'z']) {
        Some(t) => (t, None),
        None => match s.rfind(['+', '-']) {
            Some(i) => (&s[..i], Some(&s[i..])),
            None => return false,
        },
    };
    let time_ok = chrono::NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveTime::parse_from_str(time, "%H:%M"))
        .is_ok();
    time_ok && offset.map_or(true, |o| offset_seconds(o).and_then(chrono::FixedOffset::east_opt).is_some())
}

fn offset_seconds(o: &str) -> Option<i32> {
    let (sign, rest) = match o.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) || !matches!(digits.len(), 2 | 4) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = if digits.len() == 4 { digits[2..].parse().ok()? } else { 0 };
    if minutes >= 60 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Text,
    Binary,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
    Jsonb,
    Array(Box<SemanticType>),
}

/// Result of mapping a SQL type name: the semantic type, and whether the type
/// implies a sequence default (`serial` family).
pub struct SqlTypeMapping {
    pub ty: SemanticType,
    pub serial: bool,
}

impl SemanticType {
    /// Map a PostgreSQL type name (parameters already stripped). Arrays are
    /// accepted as `int4[]` or `_int4`. Returns None for unsupported types.
    pub fn from_sql(name: &str) -> Option<SqlTypeMapping> {
        let lower = name.trim().to_lowercase();
        if let Some(elem) = lower.strip_suffix("[]") {
            let inner = Self::from_sql(elem)?;
            return Some(SqlTypeMapping { ty: SemanticType::Array(Box::new(inner.ty)), serial: false });
        }
        if let Some(elem) = lower.strip_prefix('_') {
            let inner = Self::from_sql(elem)?;
            return Some(SqlTypeMapping { ty: SemanticType::Array(Box::new(inner.ty)), serial: false });
        }
        let (ty, serial) = match lower.as_str() {
            "bool" | "boolean" => (SemanticType::Boolean, false),
            "int2" | "smallint" => (SemanticType::SmallInt, false),
            "smallserial" | "serial2" => (SemanticType::SmallInt, true),
            "int" | "int4" | "integer" => (SemanticType::Integer, false),
            "serial" | "serial4" => (SemanticType::Integer, true),
            "int8" | "bigint" => (SemanticType::BigInt, false),
            "bigserial" | "serial8" => (SemanticType::BigInt, true),
            "float4" | "real" => (SemanticType::Real, false),
            "float8" | "double precision" | "float" => (SemanticType::Double, false),
            "numeric" | "decimal" | "money" => (SemanticType::Decimal, false),
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "citext" | "name" => (SemanticType::Text, false),
            "bytea" => (SemanticType::Binary, false),
            "date" => (SemanticType::Date, false),
            "time" | "time without time zone" => (SemanticType::Time, false),
            "timetz" | "time with time zone" => (SemanticType::TimeTz, false),
            "timestamp" | "timestamp without time zone" => (SemanticType::Timestamp, false),
            "timestamptz" | "timestamp with time zone" => (SemanticType::TimestampTz, false),
            "interval" => (SemanticType::Interval, false),
            "uuid" => (SemanticType::Uuid, false),
            "json" => (SemanticType::Json, false),
            "jsonb" => (SemanticType::Jsonb, false),
            _ => return None,
        };
        Some(SqlTypeMapping { ty, serial })
    }

    /// Canonical PostgreSQL name, used for parameter casts.
    pub fn pg_name(&self) -> String {
        match self {
            SemanticType::Boolean => "bool".into(),
            SemanticType::SmallInt => "int2".into(),
            SemanticType::Integer => "int4".into(),
            SemanticType::BigInt => "int8".into(),
            SemanticType::Real => "float4".into(),
            SemanticType::Double => "float8".into(),
            SemanticType::Decimal => "numeric".into(),
            SemanticType::Text => "text".into(),
            SemanticType::Binary => "bytea".into(),
            SemanticType::Date => "date".into(),
            SemanticType::Time => "time".into(),
            SemanticType::TimeTz => "timetz".into(),
            SemanticType::Timestamp => "timestamp".into(),
            SemanticType::TimestampTz => "timestamptz".into(),
            SemanticType::Interval => "interval".into(),
            SemanticType::Uuid => "uuid".into(),
            SemanticType::Json => "json".into(),
            SemanticType::Jsonb => "jsonb".into(),
            SemanticType::Array(inner) => format!("{}[]", inner.pg_name()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, SemanticType::SmallInt | SemanticType::Integer | SemanticType::BigInt)
    }

    /// Equality and IN filters. Documents, blobs and arrays only support null checks.
    pub fn supports_equality(&self) -> bool {
        !matches!(
            self,
            SemanticType::Json | SemanticType::Jsonb | SemanticType::Binary | SemanticType::Array(_)
        )
    }

    /// Range filters (`gt`, `lt`, …).
    pub fn is_orderable(&self) -> bool {
        self.supports_equality() && !matches!(self, SemanticType::Boolean)
    }

    /// Usable in ORDER BY.
    pub fn is_sortable(&self) -> bool {
        self.supports_equality()
    }

    /// Check a JSON body value against the type. Null passes; nullability is
    /// the caller's concern.
    pub fn coerce_json(&self, v: &Value) -> Result<Value, String> {
        if v.is_null() {
            return Ok(Value::Null);
        }
        match self {
            SemanticType::Boolean => v.as_bool().map(Value::Bool).ok_or_else(|| "expected a boolean".into()),
            SemanticType::SmallInt | SemanticType::Integer | SemanticType::BigInt => {
                let n = v.as_i64().ok_or_else(|| "expected an integer".to_string())?;
                self.check_int_range(n)?;
                Ok(Value::Number(n.into()))
            }
            SemanticType::Real | SemanticType::Double => {
                v.as_f64().map(|_| v.clone()).ok_or_else(|| "expected a number".into())
            }
            SemanticType::Decimal => match v {
                Value::Number(_) => Ok(v.clone()),
                Value::String(s) if s.trim().parse::<f64>().is_ok() => Ok(v.clone()),
                _ => Err("expected a decimal number".into()),
            },
            SemanticType::Json | SemanticType::Jsonb => Ok(v.clone()),
            SemanticType::Array(inner) => match v {
                Value::Array(items) => items
                    .iter()
                    .map(|i| inner.coerce_json(i))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err("expected an array".into()),
            },
            _ => match v {
                Value::String(s) => self.parse_str(s),
                _ => Err("expected a string".into()),
            },
        }
    }

    /// Parse a path segment or query-string value into a typed JSON value.
    pub fn parse_str(&self, s: &str) -> Result<Value, String> {
        match self {
            SemanticType::Boolean => match s.to_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },
            SemanticType::SmallInt | SemanticType::Integer | SemanticType::BigInt => {
                let n: i64 = s.trim().parse().map_err(|_| format!("'{}' is not an integer", s))?;
                self.check_int_range(n)?;
                Ok(Value::Number(n.into()))
            }
            SemanticType::Real | SemanticType::Double => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", s)),
            SemanticType::Decimal => {
                s.trim().parse::<f64>().map_err(|_| format!("'{}' is not a decimal", s))?;
                Ok(Value::String(s.trim().to_string()))
            }
            SemanticType::Text => Ok(Value::String(s.to_string())),
            SemanticType::Interval if is_interval(s) => Ok(Value::String(s.trim().to_string())),
            SemanticType::Interval => Err(format!("'{}' is not an interval", s)),
            SemanticType::TimeTz if is_timetz(s) => Ok(Value::String(s.trim().to_string())),
            SemanticType::TimeTz => Err(format!("'{}' is not a time with offset", s)),
            SemanticType::Binary => {
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|_| "expected base64-encoded bytes".to_string())?;
                Ok(Value::String(s.to_string()))
            }
            SemanticType::Date => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| Value::String(s.to_string()))
                .map_err(|_| format!("'{}' is not a date (YYYY-MM-DD)", s)),
            SemanticType::Time => chrono::NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M"))
                .map(|_| Value::String(s.to_string()))
                .map_err(|_| format!("'{}' is not a time", s)),
            SemanticType::Timestamp => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|_| Value::String(s.to_string()))
                .map_err(|_| format!("'{}' is not a timestamp", s)),
            SemanticType::TimestampTz => chrono::DateTime::parse_from_rfc3339(s)
                .map(|_| Value::String(s.to_string()))
                .map_err(|_| format!("'{}' is not an RFC 3339 timestamp", s)),
            SemanticType::Uuid => uuid::Uuid::parse_str(s)
                .map(|u| Value::String(u.to_string()))
                .map_err(|_| format!("'{}' is not a uuid", s)),
            SemanticType::Json | SemanticType::Jsonb => {
                Ok(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
            }
            SemanticType::Array(_) => {
                let v: Value = serde_json::from_str(s).map_err(|_| "expected a JSON array".to_string())?;
                self.coerce_json(&v)
            }
        }
    }

    fn check_int_range(&self, n: i64) -> Result<(), String> {
        let ok = match self {
            SemanticType::SmallInt => i16::try_from(n).is_ok(),
            SemanticType::Integer => i32::try_from(n).is_ok(),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{} is out of range for {}", n, self.pg_name()))
        }
    }
}
