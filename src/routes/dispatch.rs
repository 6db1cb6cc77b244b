//! Endpoint binding and the per-request dispatch pipeline:
//! guards → bind request → build plan → execute → parse → respond.

use crate::config::TableDescriptor;
use crate::error::{AppError, SchemaError};
use crate::model::{OperationKind, OperationShapes, RequestValues};
use crate::response::{see_other, success_many, success_one};
use crate::service::{parse, ExecutionMode, Executor, Payload, SessionSource};
use crate::sql::{build, PlanOptions};
use axum::extract::{FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Request-time check run before anything is parsed, e.g. authorization.
pub trait RouteGuard: Send + Sync {
    fn check(&self, kind: OperationKind, parts: &Parts) -> Result<(), AppError>;
}

/// Everything a table's endpoints share.
#[derive(Clone)]
pub struct Components {
    pub table: Arc<TableDescriptor>,
    pub shapes: Arc<BTreeMap<OperationKind, OperationShapes>>,
    pub options: PlanOptions,
    pub sessions: Arc<dyn SessionSource>,
    pub autocommit: bool,
    pub guards: Vec<Arc<dyn RouteGuard>>,
    /// Mount prefix, `""` or `/items`.
    pub prefix: String,
    pub body_limit: usize,
}

/// A kind wired to its verb, path and pipeline. Consumed by `RouteTable::register`.
pub struct Endpoint {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) inner: Arc<EndpointInner>,
}

pub(crate) struct EndpointInner {
    pub(crate) kind: OperationKind,
    pub(crate) status: StatusCode,
    pub(crate) shapes: OperationShapes,
    pub(crate) table: Arc<TableDescriptor>,
    pub(crate) options: PlanOptions,
    pub(crate) executor: Executor,
    pub(crate) guards: Vec<Arc<dyn RouteGuard>>,
    pub(crate) prefix: String,
    pub(crate) body_limit: usize,
}

impl Endpoint {
    pub fn kind(&self) -> OperationKind {
        self.inner.kind
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.executor.mode()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shapes(&self) -> &OperationShapes {
        &self.inner.shapes
    }
}

/// Wire one kind. Fails when the kind was not synthesized for the table.
pub fn bind(kind: OperationKind, mode: ExecutionMode, components: &Components) -> Result<Endpoint, SchemaError> {
    let shapes = components
        .shapes
        .get(&kind)
        .cloned()
        .ok_or_else(|| SchemaError::Validation(format!("{} was not synthesized for {}", kind, components.table.qualified_name())))?;
    let prefix = normalize_prefix(&components.prefix);
    let path = match &shapes.request.path {
        Some(params) => {
            let mut p = prefix.clone();
            for f in &params.fields {
                p.push_str("/:");
                p.push_str(&f.name);
            }
            p
        }
        None if prefix.is_empty() => "/".to_string(),
        None => prefix.clone(),
    };
    Ok(Endpoint {
        method: kind.method(),
        path,
        inner: Arc::new(EndpointInner {
            kind,
            status: kind.status(),
            shapes,
            table: components.table.clone(),
            options: components.options.clone(),
            executor: Executor::new(components.sessions.clone(), mode, components.autocommit),
            guards: components.guards.clone(),
            prefix,
            body_limit: components.body_limit,
        }),
    })
}

/// `items/` → `/items`; empty stays empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

pub(crate) async fn handle(ep: Arc<EndpointInner>, req: Request) -> Response {
    match dispatch(&ep, req).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(kind = %ep.kind, error = %e, "request failed");
            e.into_response()
        }
    }
}

async fn dispatch(ep: &EndpointInner, req: Request) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    for guard in &ep.guards {
        guard.check(ep.kind, &parts)?;
    }

    let shapes = &ep.shapes;
    let path = match &shapes.request.path {
        Some(params) => {
            let Path(raw) = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            params.bind_path(&raw)?
        }
        None => Vec::new(),
    };
    let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map_err(|e| AppError::BadRequest(e.body_text()))?;
    let body = match &shapes.request.body {
        Some(_) => {
            let bytes = axum::body::to_bytes(body, ep.body_limit)
                .await
                .map_err(|e| body_error(e, ep.body_limit))?;
            let value = if bytes.is_empty() {
                None
            } else {
                Some(
                    serde_json::from_slice::<Value>(&bytes)
                        .map_err(|e| AppError::BadRequest(format!("malformed JSON: {}", e)))?,
                )
            };
            shapes.bind_body(value)?
        }
        None => Default::default(),
    };
    let values = RequestValues { path, query, body };

    // Validation is done; only now is a session opened.
    let plan = build(shapes, &values, &ep.table, &ep.options)?;
    let payload = match ep.executor.run(&plan, |raw| parse(shapes, raw)).await {
        Ok(payload) => payload,
        Err(e) if e.is_duplicate_key() => {
            tracing::warn!(kind = %ep.kind, table = %ep.table.qualified_name(), error = %e, "duplicate key");
            return Err(AppError::Conflict(match e {
                AppError::ConstraintViolation { message, .. } => message,
                other => other.to_string(),
            }));
        }
        Err(e @ AppError::ConstraintViolation { .. }) => {
            tracing::error!(kind = %ep.kind, table = %ep.table.qualified_name(), error = %e, "constraint violation");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    Ok(match payload {
        Payload::Row(row) => success_one(ep.status, row).into_response(),
        Payload::Rows(rows) => success_many(ep.status, rows).into_response(),
        Payload::Redirect(location) => see_other(&location_path(&ep.prefix, shapes, &location)?),
    })
}

/// `<prefix>/<key>[/<key>…]`, each segment percent-encoded.
fn body_error(e: axum::Error, limit: usize) -> AppError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&e);
    while let Some(err) = source {
        if err.is::<http_body_util::LengthLimitError>() {
            return AppError::PayloadTooLarge(format!("body exceeds {} bytes", limit));
        }
        source = err.source();
    }
    AppError::BadRequest(format!("unreadable body: {}", e))
}

fn location_path(prefix: &str, shapes: &OperationShapes, location: &Map<String, Value>) -> Result<String, AppError> {
    let mut url = url::Url::parse("http://localhost/").map_err(|e| AppError::BadRequest(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| AppError::BadRequest("cannot build location".into()))?;
        segments.pop_if_empty();
        for seg in prefix.split('/').filter(|s| !s.is_empty()) {
            segments.push(seg);
        }
        for f in &shapes.response.fields.fields {
            let seg = match location.get(&f.name) {
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => String::new(),
            };
            segments.push(&seg);
        }
    }
    Ok(url.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_normalized() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("items/"), "/items");
        assert_eq!(normalize_prefix("/api/items"), "/api/items");
    }
}
