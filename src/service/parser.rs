//! Raw rows → response payload, per the kind's response shape.

use crate::error::AppError;
use crate::model::{OperationShapes, ResponseKind};
use crate::service::RawResult;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Row(Value),
    Rows(Vec<Value>),
    /// Location fields (external names) of the created row.
    Redirect(Map<String, Value>),
}

pub fn parse(shapes: &OperationShapes, raw: RawResult) -> Result<Payload, AppError> {
    let response = &shapes.response;
    match response.kind {
        ResponseKind::ListOfRows => Ok(Payload::Rows(raw.rows.iter().map(|r| response.project(r)).collect())),
        ResponseKind::SingleRow => {
            // Upsert always yields its affected row; zero rows is a store fault, not a miss.
            let row = raw.rows.first().ok_or_else(|| {
                if shapes.kind.is_upsert() {
                    no_row()
                } else {
                    AppError::NotFound(format!("no {} match", shapes.kind))
                }
            })?;
            Ok(Payload::Row(response.project(row)))
        }
        ResponseKind::Empty => {
            let row = raw.rows.first().ok_or_else(no_row)?;
            match response.project(row) {
                Value::Object(location) => Ok(Payload::Redirect(location)),
                _ => Err(no_row()),
            }
        }
    }
}

fn no_row() -> AppError {
    AppError::Db(sqlx::Error::Protocol("write returned no row".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TableConfig, TableDescriptor};
    use crate::model::{synthesize, OperationKind};
    use serde_json::json;
    use std::collections::{BTreeMap, HashSet};

    fn shapes() -> BTreeMap<OperationKind, OperationShapes> {
        let t: TableConfig = serde_json::from_value(json!({
            "name": "items",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "serial", "alias": "item_id"},
                {"name": "code", "type": "text"},
                {"name": "secret", "type": "text"}
            ]
        }))
        .unwrap();
        let t = TableDescriptor::from_config(&t).unwrap();
        synthesize(&t.columns, &OperationKind::ALL, &["secret".to_string()].into_iter().collect::<HashSet<_>>()).unwrap()
    }

    fn raw(rows: Vec<Value>) -> RawResult {
        RawResult::from_rows(rows.into_iter().filter_map(|v| v.as_object().cloned()).collect())
    }

    #[test]
    fn single_row_is_projected_and_aliased() {
        let all = shapes();
        let out = parse(&all[&OperationKind::FindOne], raw(vec![json!({"id": 1, "code": "a", "secret": "s"})])).unwrap();
        assert_eq!(out, Payload::Row(json!({"item_id": 1, "code": "a"})));
    }

    #[test]
    fn zero_rows_per_kind() {
        let all = shapes();
        assert!(matches!(parse(&all[&OperationKind::FindOne], raw(vec![])), Err(AppError::NotFound(_))));
        assert!(matches!(parse(&all[&OperationKind::DeleteOne], raw(vec![])), Err(AppError::NotFound(_))));
        assert_eq!(parse(&all[&OperationKind::FindMany], raw(vec![])).unwrap(), Payload::Rows(vec![]));
        assert!(matches!(parse(&all[&OperationKind::UpsertOne], raw(vec![])), Err(AppError::Db(_))));
    }

    #[test]
    fn redirect_carries_only_location() {
        let all = shapes();
        let out = parse(
            &all[&OperationKind::PostRedirectGet],
            raw(vec![json!({"id": 9, "code": "a", "secret": "s"})]),
        )
        .unwrap();
        let Payload::Redirect(location) = out else { panic!("expected redirect") };
        assert_eq!(Value::Object(location), json!({"item_id": 9}));
    }
}
