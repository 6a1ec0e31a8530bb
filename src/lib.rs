//! Mail Forward: scans a mailbox on a schedule and forwards messages whose
//! subject names a routing keyword and a target.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod mail;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod store;
