//! Query plans and their PostgreSQL lowering: identifiers from config only, values as parameters.

mod builder;
pub mod filter;
pub mod params;
mod plan;
pub mod render;

pub use builder::*;
pub use params::*;
pub use plan::*;
pub use render::{render, QueryBuf};
