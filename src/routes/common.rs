//! Common routes: health, version, OpenAPI document.

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::openapi::OpenApi;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Common routes plus GET /openapi.json serving `doc`.
pub fn common_routes_with_openapi(doc: OpenApi) -> Router {
    let doc = Arc::new(doc);
    common_routes().route(
        "/openapi.json",
        get(move || {
            let doc = doc.clone();
            async move { Json(serde_json::to_value(doc.as_ref()).unwrap_or_default()) }
        }),
    )
}
