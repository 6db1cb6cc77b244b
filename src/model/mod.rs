//! Model synthesis: typed request/response shapes per operation kind.

mod kind;
pub mod openapi;
mod shape;
mod synthesize;

pub use kind::*;
pub use shape::*;
pub use synthesize::synthesize;
