//! QuickCRUD SDK: REST CRUD endpoints generated from a relational table schema.

pub mod config;
pub mod error;
pub mod migration;
pub mod model;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;

pub use config::{CrudRouterConfig, TableConfig, TableDescriptor};
pub use error::{AppError, SchemaError, DUPLICATE_KEY_MESSAGE};
pub use migration::ensure_table;
pub use model::{synthesize, OperationKind, OperationShapes};
pub use routes::{
    bind, common_routes, common_routes_with_openapi, Components, CrudRouterBuilder, Endpoint, RouteGuard,
    RouteInfo, RouteTable,
};
#[cfg(any(test, feature = "testutil"))]
pub use service::MemoryStore;
pub use service::{ExecutionMode, Executor, PgSessionSource, Session, SessionSource};
