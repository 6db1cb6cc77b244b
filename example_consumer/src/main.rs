//! Example consumer: a separate Rust project that uses quickcrud-sdk as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`
//!
//! `TABLE_CONFIG` may point at another table definition (JSON); the bundled
//! `untitled_table_256.json` is used otherwise.

use quickcrud::{
    common_routes_with_openapi, ensure_table, CrudRouterBuilder, CrudRouterConfig, OperationKind,
    PgSessionSource, SessionSource, TableConfig, TableDescriptor,
};
use std::sync::Arc;
use tokio::net::TcpListener;

const EXAMPLE_TABLE: &str = include_str!("../untitled_table_256.json");

fn load_table() -> Result<TableConfig, Box<dyn std::error::Error>> {
    let raw = match std::env::var("TABLE_CONFIG") {
        Ok(path) => std::fs::read_to_string(path)?,
        Err(_) => EXAMPLE_TABLE.to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}

fn router_config(prefix: &str, operations: &[OperationKind], exclude: &[&str]) -> CrudRouterConfig {
    CrudRouterConfig {
        prefix: prefix.into(),
        tags: vec!["test".into()],
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
        operations: operations.to_vec(),
        ..CrudRouterConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quickcrud=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://postgres@127.0.0.1:5432/postgres".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await?;

    let table = Arc::new(TableDescriptor::from_config(&load_table()?)?);
    ensure_table(&pool, &table).await?;
    let sessions: Arc<dyn SessionSource> = Arc::new(PgSessionSource::new(pool));

    let mut routes = CrudRouterBuilder::new(table.clone(), sessions.clone())
        .config(router_config(
            "/test_CRUD",
            &[
                OperationKind::FindMany,
                OperationKind::FindOne,
                OperationKind::UpsertOne,
                OperationKind::UpdateMany,
                OperationKind::UpdateOne,
                OperationKind::DeleteOne,
                OperationKind::DeleteMany,
                OperationKind::PatchMany,
                OperationKind::PatchOne,
            ],
            &["array_str__value", "bytea_value"],
        ))
        .build()?;
    routes.merge(
        CrudRouterBuilder::new(table.clone(), sessions.clone())
            .config(router_config(
                "/post_redirect_get",
                &[OperationKind::PostRedirectGet, OperationKind::FindOne],
                &["bytea_value"],
            ))
            .build()?,
    )?;
    routes.merge(
        CrudRouterBuilder::new(table, sessions)
            .config(router_config("/upsert_many", &[OperationKind::UpsertMany], &["bytea_value"]))
            .build()?,
    )?;

    let doc = routes.openapi("quickcrud example", env!("CARGO_PKG_VERSION"));
    let app = common_routes_with_openapi(doc).merge(routes.into_router());
    let listener = TcpListener::bind("0.0.0.0:8000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
