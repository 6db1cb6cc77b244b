//! OpenAPI document for the synthesized shapes, built with utoipa's builder API.

use crate::config::SemanticType;
use crate::model::{FieldSpec, OperationShapes, ParamSet, ResponseKind};
use axum::http::Method;
use std::collections::BTreeMap;
use utoipa::openapi::content::ContentBuilder;
use utoipa::openapi::path::{Operation, OperationBuilder, ParameterBuilder, ParameterIn, PathItem};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::schema::{
    ArrayBuilder, KnownFormat, ObjectBuilder, OneOfBuilder, Schema, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::{InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, RefOr, Required};

const JSON: &str = "application/json";

/// One registered endpoint as the document sees it.
#[derive(Clone, Debug)]
pub struct RouteDoc {
    /// axum-style path, `/items/:id`.
    pub path: String,
    pub method: Method,
    pub tags: Vec<String>,
    pub shapes: OperationShapes,
}

pub fn document(title: &str, version: &str, routes: &[RouteDoc]) -> OpenApi {
    let mut items: BTreeMap<String, PathItem> = BTreeMap::new();
    for r in routes {
        let item = items.entry(openapi_path(&r.path)).or_default();
        let op = Some(operation(r));
        match r.method {
            Method::GET => item.get = op,
            Method::POST => item.post = op,
            Method::PUT => item.put = op,
            Method::PATCH => item.patch = op,
            Method::DELETE => item.delete = op,
            _ => {}
        }
    }
    let mut paths = PathsBuilder::new();
    for (path, item) in items {
        paths = paths.path(path, item);
    }
    OpenApiBuilder::new()
        .info(InfoBuilder::new().title(title).version(version).build())
        .paths(paths.build())
        .build()
}

/// `/items/:id` → `/items/{id}`
fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn operation(r: &RouteDoc) -> Operation {
    let s = &r.shapes;
    let mut op = OperationBuilder::new()
        .operation_id(Some(format!("{}{}", s.kind, r.path.replace(['/', ':'], "_"))))
        .summary(Some(s.kind.as_str().replace('_', " ")))
        .tags(Some(r.tags.clone()));

    if let Some(path) = &s.request.path {
        for f in &path.fields {
            op = op.parameter(
                ParameterBuilder::new()
                    .name(&f.name)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(field_schema(f))),
            );
        }
    }
    if let Some(query) = &s.request.query {
        for f in &query.filters.fields {
            op = op.parameter(
                ParameterBuilder::new()
                    .name(&f.name)
                    .parameter_in(ParameterIn::Query)
                    .required(Required::False)
                    .schema(Some(field_schema(f))),
            );
        }
        if query.paginated {
            for (name, ty) in [
                ("limit", Type::Integer),
                ("offset", Type::Integer),
                ("order_by", Type::String),
                ("direction", Type::String),
            ] {
                op = op.parameter(
                    ParameterBuilder::new()
                        .name(name)
                        .parameter_in(ParameterIn::Query)
                        .required(Required::False)
                        .schema(Some(RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(ty).build())))),
                );
            }
        }
    }
    if let Some(body) = &s.request.body {
        let object = object_schema(body.fields());
        let schema = match body {
            crate::model::BodyParams::One(_) => object,
            crate::model::BodyParams::Many(_) => RefOr::T(Schema::Array(ArrayBuilder::new().items(object).build())),
        };
        op = op.request_body(Some(
            RequestBodyBuilder::new()
                .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
                .required(Some(Required::True))
                .build(),
        ));
    }

    let status = s.kind.status().as_u16().to_string();
    let response = match s.response.kind {
        ResponseKind::SingleRow => ResponseBuilder::new().description("row").content(
            JSON,
            ContentBuilder::new().schema(Some(envelope(object_schema(&s.response.fields), false))).build(),
        ),
        ResponseKind::ListOfRows => ResponseBuilder::new().description("rows").content(
            JSON,
            ContentBuilder::new()
                .schema(Some(envelope(
                    RefOr::T(Schema::Array(ArrayBuilder::new().items(object_schema(&s.response.fields)).build())),
                    true,
                )))
                .build(),
        ),
        ResponseKind::Empty => ResponseBuilder::new().description("redirect to the created row (Location header)"),
    };
    op.response(status, response.build())
        .response("409", ResponseBuilder::new().description("duplicate key").build())
        .response("422", ResponseBuilder::new().description("invalid request").build())
        .build()
}

/// `{"data": …}` plus `meta.count` for lists.
fn envelope(data: RefOr<Schema>, list: bool) -> RefOr<Schema> {
    let mut obj = ObjectBuilder::new().property("data", data).required("data");
    if list {
        obj = obj.property(
            "meta",
            ObjectBuilder::new()
                .property("count", ObjectBuilder::new().schema_type(Type::Integer))
                .required("count"),
        );
    }
    RefOr::T(Schema::Object(obj.build()))
}

fn object_schema(params: &ParamSet) -> RefOr<Schema> {
    let mut obj = ObjectBuilder::new().schema_type(Type::Object);
    for f in &params.fields {
        obj = obj.property(&f.name, field_schema(f));
        if f.required {
            obj = obj.required(&f.name);
        }
    }
    RefOr::T(Schema::Object(obj.build()))
}

fn field_schema(f: &FieldSpec) -> RefOr<Schema> {
    let schema = match f.max_length {
        Some(n) => RefOr::T(Schema::Object(
            ObjectBuilder::new().schema_type(Type::String).max_length(Some(n)).build(),
        )),
        None => type_schema(&f.ty),
    };
    if f.nullable {
        RefOr::T(Schema::OneOf(
            OneOfBuilder::new()
                .item(schema)
                .item(ObjectBuilder::new().schema_type(Type::Null))
                .build(),
        ))
    } else {
        schema
    }
}

fn type_schema(ty: &SemanticType) -> RefOr<Schema> {
    let scalar = |t: Type, format: Option<KnownFormat>| {
        RefOr::T(Schema::Object(
            ObjectBuilder::new()
                .schema_type(t)
                .format(format.map(SchemaFormat::KnownFormat))
                .build(),
        ))
    };
    match ty {
        SemanticType::Boolean => scalar(Type::Boolean, None),
        SemanticType::SmallInt | SemanticType::Integer => scalar(Type::Integer, Some(KnownFormat::Int32)),
        SemanticType::BigInt => scalar(Type::Integer, Some(KnownFormat::Int64)),
        SemanticType::Real => scalar(Type::Number, Some(KnownFormat::Float)),
        SemanticType::Double => scalar(Type::Number, Some(KnownFormat::Double)),
        SemanticType::Binary => scalar(Type::String, Some(KnownFormat::Byte)),
        SemanticType::Date => scalar(Type::String, Some(KnownFormat::Date)),
        SemanticType::Timestamp | SemanticType::TimestampTz => scalar(Type::String, Some(KnownFormat::DateTime)),
        SemanticType::Uuid => scalar(Type::String, Some(KnownFormat::Uuid)),
        SemanticType::Decimal
        | SemanticType::Text
        | SemanticType::Time
        | SemanticType::TimeTz
        | SemanticType::Interval => scalar(Type::String, None),
        SemanticType::Json | SemanticType::Jsonb => {
            RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::AnyValue).build()))
        }
        SemanticType::Array(inner) => RefOr::T(Schema::Array(ArrayBuilder::new().items(type_schema(inner)).build())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TableConfig, TableDescriptor};
    use crate::model::{synthesize, OperationKind};
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn documents_every_route() {
        let t: TableConfig = serde_json::from_value(json!({
            "name": "items",
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "serial", "alias": "item_id"},
                {"name": "code", "type": "text", "nullable": false},
                {"name": "tags", "type": "text[]"}
            ]
        }))
        .unwrap();
        let t = TableDescriptor::from_config(&t).unwrap();
        let shapes = synthesize(&t.columns, &[OperationKind::FindOne, OperationKind::UpsertMany], &HashSet::new()).unwrap();
        let routes = vec![
            RouteDoc {
                path: "/items/:item_id".into(),
                method: Method::GET,
                tags: vec!["items".into()],
                shapes: shapes[&OperationKind::FindOne].clone(),
            },
            RouteDoc {
                path: "/items".into(),
                method: Method::POST,
                tags: vec!["items".into()],
                shapes: shapes[&OperationKind::UpsertMany].clone(),
            },
        ];
        let doc = serde_json::to_value(document("items", "1", &routes)).unwrap();
        let find_one = &doc["paths"]["/items/{item_id}"]["get"];
        assert_eq!(find_one["parameters"][0]["name"], json!("item_id"));
        assert_eq!(find_one["parameters"][0]["in"], json!("path"));
        assert!(find_one["responses"]["200"].is_object());
        let upsert = &doc["paths"]["/items"]["post"];
        assert_eq!(upsert["requestBody"]["content"]["application/json"]["schema"]["type"], json!("array"));
        assert!(upsert["responses"]["201"].is_object());
    }
}
