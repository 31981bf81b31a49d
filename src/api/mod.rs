//! Purpose: Everything a caller needs to talk to a storage plugin.
//! Exports: `Client`, `Locator`, the storage entities, job and capability types, errors.
//! Role: Sessions, discovery and typed operations; framing stays in `core`.
//! Invariants: Plugin sessions are opened only through `Client::connect`.
//! Invariants: The operation table in `ops` is static and read-only.

mod capabilities;
mod client;
mod job;
mod locator;
pub mod ops;
mod types;

pub use crate::core::error::{Entity, Error, ErrorKind, WireCode};
pub use capabilities::{Capabilities, Capability};
pub use client::{ApiResult, Client, DEFAULT_TIMEOUT_MS};
pub use job::{Async, Job, JobId, JobReport, JobResult, JobState, JobStatus};
pub use locator::{BASE_DIR_ENV, DEFAULT_BASE_DIR, Discovery, Locator, PluginInfo, plugin_scheme};
pub use types::{
    ANON_UID_GID_NA, Access, AccessGroup, BlockRange, Disk, ExportRequest, FileSystem, FsSnapshot,
    Initiator, InitiatorType, MemberType, NfsExport, Pool, Provisioning, RaidType,
    ReplicationType, Search, System, Volume, WireObject,
};
