//! Route wiring: endpoint binding, the route table, and common routes.

mod builder;
mod common;
pub mod dispatch;
mod table;

pub use builder::CrudRouterBuilder;
pub use common::{common_routes, common_routes_with_openapi};
pub use dispatch::{bind, Components, Endpoint, RouteGuard};
pub use table::{RouteInfo, RouteTable};
