//! Shape synthesis: column descriptors + requested kinds → typed request/response shapes.

use crate::config::ColumnDescriptor;
use crate::error::SchemaError;
use crate::model::{
    BodyKind, BodyParams, FieldSpec, OperationKind, OperationShapes, ParamSet, QueryParams, RequestShape,
    ResponseKind, ResponseShape, RESERVED_QUERY_PARAMS,
};
use std::collections::{BTreeMap, HashSet};

/// Derive the shapes for every requested kind. `exclude` names columns by real
/// name or alias; names matching no column are ignored.
pub fn synthesize(
    columns: &[ColumnDescriptor],
    kinds: &[OperationKind],
    exclude: &HashSet<String>,
) -> Result<BTreeMap<OperationKind, OperationShapes>, SchemaError> {
    let visible: Vec<&ColumnDescriptor> = columns
        .iter()
        .filter(|c| !exclude.contains(&c.name) && !exclude.contains(c.external_name()))
        .collect();
    let key_columns: Vec<String> = columns.iter().filter(|c| c.primary_key).map(|c| c.name.clone()).collect();
    if key_columns.is_empty() {
        return Err(SchemaError::Validation("table has no primary key column".into()));
    }

    let mut out = BTreeMap::new();
    for &kind in kinds {
        if out.contains_key(&kind) {
            continue;
        }
        let shapes = synthesize_kind(kind, columns, &visible, &key_columns)?;
        out.insert(kind, shapes);
    }
    Ok(out)
}

fn synthesize_kind(
    kind: OperationKind,
    all: &[ColumnDescriptor],
    visible: &[&ColumnDescriptor],
    key_columns: &[String],
) -> Result<OperationShapes, SchemaError> {
    let keys_visible = key_columns.iter().all(|k| visible.iter().any(|c| c.name == *k));
    let needs_key = kind.takes_path() || kind == OperationKind::PostRedirectGet;
    if needs_key && !keys_visible {
        return Err(SchemaError::Validation(format!(
            "{} needs the primary key ({}), which is excluded",
            kind,
            key_columns.join(", ")
        )));
    }

    let path = kind.takes_path().then(|| ParamSet {
        fields: all
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| field(c, true))
            .collect(),
    });

    let query = if kind.takes_filters() {
        let filters = ParamSet {
            fields: visible.iter().map(|c| field(c, false)).collect(),
        };
        for f in &filters.fields {
            if RESERVED_QUERY_PARAMS.contains(&f.name.as_str()) {
                return Err(SchemaError::Validation(format!(
                    "field '{}' of {} collides with a reserved query parameter; declare an alias",
                    f.name, kind
                )));
            }
        }
        Some(QueryParams { filters, paginated: kind.takes_pagination() })
    } else {
        None
    };

    let insertable = || visible.iter().filter(|c| !c.generated);
    let updatable = || visible.iter().filter(|c| !c.generated && !c.primary_key);
    let body = match kind.body_kind() {
        BodyKind::None => None,
        BodyKind::Insert => Some(BodyParams::One(ParamSet {
            fields: insertable().map(|c| field(c, insert_required(c))).collect(),
        })),
        BodyKind::InsertMany => Some(BodyParams::Many(ParamSet {
            fields: insertable().map(|c| field(c, insert_required(c))).collect(),
        })),
        BodyKind::Patch => Some(BodyParams::One(ParamSet {
            fields: updatable().map(|c| field(c, false)).collect(),
        })),
        BodyKind::Update => Some(BodyParams::One(ParamSet {
            fields: updatable().map(|c| field(c, insert_required(c))).collect(),
        })),
    };
    if let Some(b) = &body {
        if b.fields().is_empty() {
            return Err(SchemaError::Validation(format!("{} has no writable fields left", kind)));
        }
    }

    let response_fields = match kind.response_kind() {
        ResponseKind::Empty => ParamSet {
            fields: visible.iter().filter(|c| c.primary_key).map(|c| field(c, true)).collect(),
        },
        _ => ParamSet {
            fields: visible.iter().map(|c| field(c, !c.nullable)).collect(),
        },
    };

    Ok(OperationShapes {
        kind,
        request: RequestShape { path, query, body },
        response: ResponseShape { kind: kind.response_kind(), fields: response_fields },
        key_columns: key_columns.to_vec(),
    })
}

/// Required on insert/full update: not nullable and no server default.
fn insert_required(c: &ColumnDescriptor) -> bool {
    !c.nullable && c.default.is_none()
}

fn field(c: &ColumnDescriptor, required: bool) -> FieldSpec {
    FieldSpec {
        name: c.external_name().to_string(),
        column: c.name.clone(),
        ty: c.ty.clone(),
        max_length: c.max_length,
        required,
        nullable: c.nullable,
        default: c.default.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{describe, TableConfig};
    use serde_json::json;

    fn columns() -> Vec<ColumnDescriptor> {
        let t: TableConfig = serde_json::from_value(json!({
            "name": "items",
            "primary_key": "id",
            "unique": [["code"]],
            "columns": [
                {"name": "id", "type": "bigserial", "alias": "item_id"},
                {"name": "code", "type": "text", "nullable": false},
                {"name": "qty", "type": "int4", "nullable": false, "default": 0},
                {"name": "note", "type": "text"},
                {"name": "secret", "type": "text", "nullable": false},
                {"name": "search", "type": "text", "generated": true}
            ]
        }))
        .unwrap();
        describe(&t).unwrap()
    }

    fn names(p: &ParamSet) -> Vec<&str> {
        p.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn excluded_columns_never_appear() {
        let exclude: HashSet<String> = ["secret".to_string()].into();
        let shapes = synthesize(&columns(), &OperationKind::ALL, &exclude).unwrap();
        for s in shapes.values() {
            let mut all: Vec<&FieldSpec> = s.response.fields.fields.iter().collect();
            if let Some(q) = &s.request.query {
                all.extend(q.filters.fields.iter());
            }
            if let Some(b) = &s.request.body {
                all.extend(b.fields().fields.iter());
            }
            assert!(all.iter().all(|f| f.column != "secret"), "{} leaks secret", s.kind);
        }
    }

    #[test]
    fn patch_fields_are_all_optional() {
        let shapes = synthesize(&columns(), &[OperationKind::PatchOne, OperationKind::PatchMany], &HashSet::new()).unwrap();
        for s in shapes.values() {
            let body = s.request.body.as_ref().unwrap().fields();
            assert!(!body.is_empty());
            assert!(body.fields.iter().all(|f| !f.required));
            assert!(!body.contains("item_id"));
        }
    }

    #[test]
    fn update_keeps_required_split() {
        let shapes = synthesize(&columns(), &[OperationKind::UpdateOne], &HashSet::new()).unwrap();
        let body = shapes[&OperationKind::UpdateOne].request.body.as_ref().unwrap().fields();
        assert!(body.get("code").unwrap().required);
        assert!(!body.get("qty").unwrap().required);
        assert!(!body.get("note").unwrap().required);
        assert!(!body.contains("search"));
    }

    #[test]
    fn insert_body_uses_aliases_and_skips_generated() {
        let shapes = synthesize(&columns(), &[OperationKind::UpsertMany], &HashSet::new()).unwrap();
        let s = &shapes[&OperationKind::UpsertMany];
        let Some(BodyParams::Many(body)) = &s.request.body else { panic!("expected list body") };
        assert_eq!(names(body), vec!["item_id", "code", "qty", "note", "secret"]);
        assert!(!body.get("item_id").unwrap().required);
        assert!(body.get("code").unwrap().required);
        assert_eq!(s.response.kind, ResponseKind::ListOfRows);
        assert!(s.response.fields.contains("search"));
    }

    #[test]
    fn path_and_query_per_kind() {
        let shapes = synthesize(&columns(), &OperationKind::ALL, &HashSet::new()).unwrap();
        let find_one = &shapes[&OperationKind::FindOne];
        assert_eq!(names(find_one.request.path.as_ref().unwrap()), vec!["item_id"]);
        assert!(!find_one.request.query.as_ref().unwrap().paginated);
        let find_many = &shapes[&OperationKind::FindMany];
        assert!(find_many.request.path.is_none());
        assert!(find_many.request.query.as_ref().unwrap().paginated);
        let prg = &shapes[&OperationKind::PostRedirectGet];
        assert_eq!(prg.response.kind, ResponseKind::Empty);
        assert_eq!(names(&prg.response.fields), vec!["item_id"]);
        assert!(shapes[&OperationKind::UpsertOne].request.query.is_none());
    }

    #[test]
    fn excluding_the_key_breaks_keyed_kinds() {
        let exclude: HashSet<String> = ["item_id".to_string()].into();
        let err = synthesize(&columns(), &[OperationKind::FindOne], &exclude).unwrap_err();
        assert!(matches!(err, SchemaError::Validation(_)));
        assert!(synthesize(&columns(), &[OperationKind::FindMany], &exclude).is_ok());
    }

    #[test]
    fn reserved_names_need_an_alias() {
        let t: TableConfig = serde_json::from_value(json!({
            "name": "pages",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "int4"},
                {"name": "offset", "type": "int4"}
            ]
        }))
        .unwrap();
        let cols = describe(&t).unwrap();
        assert!(synthesize(&cols, &[OperationKind::FindMany], &HashSet::new()).is_err());
        assert!(synthesize(&cols, &[OperationKind::UpsertOne], &HashSet::new()).is_ok());
    }
}
