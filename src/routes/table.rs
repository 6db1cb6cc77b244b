//! Route table: the registered state of endpoints and the axum router they form.

use crate::error::SchemaError;
use crate::model::openapi::{document, RouteDoc};
use crate::model::OperationKind;
use crate::routes::dispatch::{handle, Endpoint};
use crate::service::ExecutionMode;
use axum::extract::Request;
use axum::http::Method;
use axum::routing::{on, MethodFilter};
use axum::Router;
use std::collections::HashSet;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::openapi::OpenApi;

#[derive(Clone, Debug, PartialEq)]
pub struct RouteInfo {
    pub kind: OperationKind,
    pub mode: ExecutionMode,
    pub method: Method,
    pub path: String,
}

#[derive(Default)]
pub struct RouteTable {
    router: Router,
    routes: Vec<RouteInfo>,
    docs: Vec<RouteDoc>,
    tags: Vec<String>,
    seen: HashSet<(Method, String)>,
    body_limit: usize,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags attached to endpoints registered from now on.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Attach an endpoint. A second endpoint on the same method and path is
    /// rejected rather than shadowing the first.
    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), SchemaError> {
        let key = (endpoint.method.clone(), endpoint.path.clone());
        if self.seen.contains(&key) {
            return Err(SchemaError::DuplicateRoute {
                method: endpoint.method.to_string(),
                path: endpoint.path,
            });
        }
        let filter = MethodFilter::try_from(endpoint.method.clone())
            .map_err(|_| SchemaError::Validation(format!("unsupported method {}", endpoint.method)))?;
        let inner = endpoint.inner.clone();
        tracing::info!(
            kind = %inner.kind,
            mode = inner.executor.mode().as_str(),
            method = %endpoint.method,
            path = %endpoint.path,
            "route bound"
        );
        self.routes.push(RouteInfo {
            kind: inner.kind,
            mode: inner.executor.mode(),
            method: endpoint.method.clone(),
            path: endpoint.path.clone(),
        });
        self.docs.push(RouteDoc {
            path: endpoint.path.clone(),
            method: endpoint.method.clone(),
            tags: self.tags.clone(),
            shapes: inner.shapes.clone(),
        });
        self.body_limit = self.body_limit.max(inner.body_limit);
        let router = std::mem::take(&mut self.router);
        self.router = router.route(
            &endpoint.path,
            on(filter, move |req: Request| {
                let inner = inner.clone();
                async move { handle(inner, req).await }
            }),
        );
        self.seen.insert(key);
        Ok(())
    }

    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    pub fn openapi(&self, title: &str, version: &str) -> OpenApi {
        document(title, version, &self.docs)
    }

    /// Merge another table's routes, e.g. several tables under one router.
    pub fn merge(&mut self, other: RouteTable) -> Result<(), SchemaError> {
        for (method, path) in &other.seen {
            if self.seen.contains(&(method.clone(), path.clone())) {
                return Err(SchemaError::DuplicateRoute { method: method.to_string(), path: path.clone() });
            }
        }
        self.seen.extend(other.seen);
        self.routes.extend(other.routes);
        self.docs.extend(other.docs);
        self.body_limit = self.body_limit.max(other.body_limit);
        let router = std::mem::take(&mut self.router);
        self.router = router.merge(other.router);
        Ok(())
    }

    pub fn into_router(self) -> Router {
        if self.body_limit == 0 {
            return self.router;
        }
        self.router
            .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(self.body_limit)))
    }
}
