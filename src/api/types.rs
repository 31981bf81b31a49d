//! Purpose: Storage data model exchanged with plugins (systems, pools, volumes, ...).
//! Exports: Entity structs, the `WireObject` trait, argument enums, `Search`.
//! Role: Typed view of the class-tagged JSON objects that cross the socket.
//! Invariants: Every entity travels as a JSON object whose `class` names its type.
//! Invariants: Each searchable entity declares its fixed supported search-key set.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use crate::core::shape::ValueKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub trait WireObject: Serialize + DeserializeOwned {
    const CLASS: &'static str;
    const SEARCH_KEYS: &'static [&'static str] = &[];
    const KIND: ValueKind = ValueKind::Entity(Self::CLASS);

    fn to_wire(&self) -> Result<Value, Error> {
        let mut value = serde_json::to_value(self).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("failed to encode {}", Self::CLASS))
                .with_source(err)
        })?;
        if let Value::Object(object) = &mut value {
            object.insert("class".to_string(), Value::String(Self::CLASS.to_string()));
        }
        Ok(value)
    }

    /// Decode a value whose `class` has already been shape-checked.
    fn from_wire(method: &'static str, value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|err| {
            Error::new(ErrorKind::PluginBug)
                .with_method(method)
                .with_message(format!("malformed {} object", Self::CLASS))
                .with_source(err)
        })
    }
}

/// Optional `(search_key, search_value)` filter for listing operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Search {
    pub key: String,
    pub value: String,
}

impl Search {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub(crate) fn check_search_key<T: WireObject>(search: Option<&Search>) -> Result<(), Error> {
    let Some(search) = search else {
        return Ok(());
    };
    if T::SEARCH_KEYS.contains(&search.key.as_str()) {
        return Ok(());
    }
    Err(Error::new(ErrorKind::UnsupportedSearchKey).with_message(format!(
        "unsupported search_key '{}' for {}; supported: {}",
        search.key,
        T::CLASS,
        T::SEARCH_KEYS.join(", ")
    )))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub status: u32,
    #[serde(default)]
    pub status_info: String,
}

impl WireObject for System {
    const CLASS: &'static str = "System";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub total_space: u64,
    pub free_space: u64,
    #[serde(default)]
    pub status: u64,
    #[serde(default)]
    pub status_info: String,
    pub system_id: String,
}

impl WireObject for Pool {
    const CLASS: &'static str = "Pool";
    const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id"];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub vpd83: String,
    pub block_size: u64,
    pub num_of_blocks: u64,
    #[serde(default)]
    pub status: u32,
    pub system_id: String,
    pub pool_id: String,
}

impl Volume {
    pub fn size_bytes(&self) -> u64 {
        self.block_size.saturating_mul(self.num_of_blocks)
    }
}

impl WireObject for Volume {
    const CLASS: &'static str = "Volume";
    const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id", "pool_id"];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub id: String,
    pub name: String,
    pub disk_type: i32,
    pub block_size: u64,
    pub num_of_blocks: u64,
    #[serde(default)]
    pub status: u64,
    pub system_id: String,
}

impl WireObject for Disk {
    const CLASS: &'static str = "Disk";
    const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id"];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiator {
    pub id: String,
    #[serde(rename = "type")]
    pub initiator_type: i32,
    #[serde(default)]
    pub name: String,
}

impl WireObject for Initiator {
    const CLASS: &'static str = "Initiator";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub initiators: Vec<String>,
    pub system_id: String,
}

impl WireObject for AccessGroup {
    const CLASS: &'static str = "AccessGroup";
    const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id"];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystem {
    pub id: String,
    pub name: String,
    pub total_space: u64,
    pub free_space: u64,
    pub pool_id: String,
    pub system_id: String,
}

impl WireObject for FileSystem {
    const CLASS: &'static str = "FileSystem";
    const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id", "pool_id"];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ts: u64,
}

impl WireObject for FsSnapshot {
    const CLASS: &'static str = "FsSnapshot";
}

pub const ANON_UID_GID_NA: i64 = -1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsExport {
    pub id: String,
    pub fs_id: String,
    pub export_path: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub root: Vec<String>,
    #[serde(default)]
    pub rw: Vec<String>,
    #[serde(default)]
    pub ro: Vec<String>,
    #[serde(default = "anon_na")]
    pub anonuid: i64,
    #[serde(default = "anon_na")]
    pub anongid: i64,
    #[serde(default)]
    pub options: Option<String>,
}

fn anon_na() -> i64 {
    ANON_UID_GID_NA
}

impl WireObject for NfsExport {
    const CLASS: &'static str = "NfsExport";
    const SEARCH_KEYS: &'static [&'static str] = &["id", "fs_id"];
}

/// Arguments for `export_fs`; host lists may be empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRequest {
    pub fs_id: String,
    pub export_path: Option<String>,
    pub root: Vec<String>,
    pub rw: Vec<String>,
    pub ro: Vec<String>,
    pub anon_uid: i64,
    pub anon_gid: i64,
    pub auth_type: Option<String>,
    pub options: Option<String>,
}

impl ExportRequest {
    pub fn new(fs_id: impl Into<String>) -> Self {
        Self {
            fs_id: fs_id.into(),
            export_path: None,
            root: Vec::new(),
            rw: Vec::new(),
            ro: Vec::new(),
            anon_uid: ANON_UID_GID_NA,
            anon_gid: ANON_UID_GID_NA,
            auth_type: None,
            options: None,
        }
    }
}

/// Block span copied by `volume_replicate_range`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub src_block: u64,
    pub dest_block: u64,
    pub block_count: u64,
}

impl WireObject for BlockRange {
    const CLASS: &'static str = "BlockRange";
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Provisioning {
    Unknown,
    Thin,
    Full,
    Default,
}

impl Provisioning {
    pub fn code(self) -> i64 {
        match self {
            Provisioning::Unknown => -1,
            Provisioning::Thin => 1,
            Provisioning::Full => 2,
            Provisioning::Default => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplicationType {
    Snapshot,
    Clone,
    Copy,
    MirrorSync,
    MirrorAsync,
}

impl ReplicationType {
    pub fn code(self) -> i64 {
        match self {
            ReplicationType::Snapshot => 1,
            ReplicationType::Clone => 2,
            ReplicationType::Copy => 3,
            ReplicationType::MirrorSync => 4,
            ReplicationType::MirrorAsync => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

impl Access {
    pub fn code(self) -> i64 {
        match self {
            Access::ReadWrite => 1,
            Access::ReadOnly => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RaidType {
    Unknown,
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
    NotApplicable,
}

impl RaidType {
    pub fn code(self) -> i64 {
        match self {
            RaidType::Unknown => -1,
            RaidType::Raid0 => 0,
            RaidType::Raid1 => 1,
            RaidType::Raid5 => 5,
            RaidType::Raid6 => 6,
            RaidType::Raid10 => 10,
            RaidType::NotApplicable => 40,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemberType {
    Unknown,
    Disk,
    Volume,
    Pool,
}

impl MemberType {
    pub fn code(self) -> i64 {
        match self {
            MemberType::Unknown => 0,
            MemberType::Disk => 1,
            MemberType::Volume => 2,
            MemberType::Pool => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitiatorType {
    Unknown,
    Other,
    PortWwn,
    NodeWwn,
    Hostname,
    Iscsi,
    SasAddress,
}

impl InitiatorType {
    pub fn code(self) -> i64 {
        match self {
            InitiatorType::Unknown => 0,
            InitiatorType::Other => 1,
            InitiatorType::PortWwn => 2,
            InitiatorType::NodeWwn => 3,
            InitiatorType::Hostname => 4,
            InitiatorType::Iscsi => 5,
            InitiatorType::SasAddress => 7,
        }
    }
}

/// Reject initiator types and id formats that cannot be granted access.
pub(crate) fn validate_initiator(id: &str, initiator_type: InitiatorType) -> Result<(), Error> {
    match initiator_type {
        InitiatorType::PortWwn => {
            let digits: String = id.chars().filter(|c| *c != ':' && *c != '-').collect();
            if digits.len() != 16 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("invalid WWPN '{id}': expected 16 hex digits")));
            }
            Ok(())
        }
        InitiatorType::Iscsi => {
            let lower = id.to_ascii_lowercase();
            if !["iqn.", "eui.", "naa."].iter().any(|prefix| lower.starts_with(prefix)) {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("invalid iSCSI name '{id}'")));
            }
            Ok(())
        }
        other => Err(Error::new(ErrorKind::UnsupportedInitiatorType)
            .with_message(format!("initiator type {other:?} is not supported"))),
    }
}
