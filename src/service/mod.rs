//! Execution: sessions, the transaction pipeline and result parsing.

mod executor;
#[cfg(any(test, feature = "testutil"))]
mod memory;
mod parser;
mod postgres;
mod session;

pub use executor::{ExecutionMode, Executor};
#[cfg(any(test, feature = "testutil"))]
pub use memory::{MemorySession, MemoryStore};
pub use parser::{parse, Payload};
pub use postgres::{PgSession, PgSessionSource};
pub use session::{RawResult, Row, Session, SessionSource};
