pub mod types;
pub mod semantic;
pub mod loader;
pub mod validator;
pub mod resolved;

pub use types::*;
pub use semantic::*;
pub use loader::*;
pub use validator::*;
pub use resolved::*;
