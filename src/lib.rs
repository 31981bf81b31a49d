//! Purpose: Client library for storage-management plugins reachable over Unix sockets.
//! Exports: `api` (sessions, operations, data model) and `core` (framing, transport, errors).
//! Role: Synchronous access layer; the daemon and vendor plugins live out of process.
//! Invariants: One request in flight per session; no background threads.
//! Invariants: Configuration is explicit (`Locator`); the environment is read only on request.
pub mod api;
pub mod core;

pub use api::{Client, Error, ErrorKind, Locator};
