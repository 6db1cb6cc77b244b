//! Example server: reads table definitions and router settings from a config
//! directory, ensures every table exists, and serves the generated routes next
//! to the common routes. Tables without router settings are mounted at
//! `/api/v1/<table>`.

use axum::Router;
use quickcrud::{
    common_routes_with_openapi, ensure_table, CrudRouterBuilder, CrudRouterConfig, PgSessionSource, RouteTable,
    SessionSource, TableConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// One entry of `tables.json`.
#[derive(Deserialize)]
struct TableEntry {
    table: TableConfig,
    #[serde(default)]
    router: Option<CrudRouterConfig>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quickcrud=info".parse()?))
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/quickcrud".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    let sessions: Arc<dyn SessionSource> = Arc::new(PgSessionSource::new(pool.clone()));

    let config_source = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "demos/sample".into());
    let entries = load_tables(&config_source).await?;

    let mut routes = RouteTable::new();
    for entry in entries {
        let router = entry.router.unwrap_or_else(|| CrudRouterConfig {
            prefix: format!("/api/v1/{}", entry.table.name),
            ..CrudRouterConfig::default()
        });
        let builder = CrudRouterBuilder::from_config(&entry.table, sessions.clone())?.config(router);
        ensure_table(&pool, builder.table()).await?;
        routes.merge(builder.build()?)?;
    }

    let doc = routes.openapi("quickcrud", env!("CARGO_PKG_VERSION"));
    let app = Router::new()
        .merge(common_routes_with_openapi(doc))
        .merge(routes.into_router());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_tables(dir: &str) -> Result<Vec<TableEntry>, Box<dyn std::error::Error>> {
    let dir = PathBuf::from(dir);
    Ok(serde_json::from_str(&tokio::fs::read_to_string(dir.join("tables.json")).await?)?)
}
