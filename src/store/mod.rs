//! Persistence layer: libSQL-backed forward target lookup.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlTargetStore;
pub use traits::{ForwardTarget, TargetResolver};
