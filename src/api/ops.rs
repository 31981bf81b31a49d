//! Purpose: Static operation descriptor table: name, parameter schema, return shape.
//! Exports: `OpDescriptor`, `Param`, `OPERATIONS`, `lookup`, one const per operation.
//! Role: Replaces call-site introspection; stubs bind arguments against these descriptors.
//! Invariants: Table well-formedness (unique names and params, trailing `flags`) is checked at compile time.
//! Invariants: Unknown, duplicate or missing required arguments are caller errors raised before dispatch.
#![allow(clippy::result_large_err)]

use super::capabilities::Capabilities;
use super::types::{
    AccessGroup, BlockRange, Disk, FileSystem, FsSnapshot, Initiator, NfsExport, Pool, System,
    Volume, WireObject,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::shape::{ArgShape, ReturnShape, ValueKind, check_arg, check_return};
use crate::core::transport::Transport;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub shape: ArgShape,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpDescriptor {
    pub name: &'static str,
    pub params: &'static [Param],
    pub returns: ReturnShape,
}

impl OpDescriptor {
    pub fn param(&self, name: &str) -> Option<&'static Param> {
        self.params.iter().find(|param| param.name == name)
    }

    /// Bind named arguments into the wire argument map.
    ///
    /// `flags` defaults to 0 and optional parameters default to null.
    pub fn bind(&self, args: Vec<(&str, Value)>) -> Result<Map<String, Value>, Error> {
        let mut bound = Map::new();
        for (name, value) in args {
            let Some(param) = self.param(name) else {
                return Err(self.usage(format!("unknown argument '{name}'")));
            };
            check_arg(self.name, name, param.shape, &value)?;
            if bound.insert(name.to_string(), value).is_some() {
                return Err(self.usage(format!("argument '{name}' given twice")));
            }
        }
        for param in self.params {
            if bound.contains_key(param.name) {
                continue;
            }
            if param.name == "flags" {
                bound.insert("flags".to_string(), Value::from(0));
            } else if param.shape.is_optional() {
                bound.insert(param.name.to_string(), Value::Null);
            } else {
                return Err(self.usage(format!("missing argument '{}'", param.name)));
            }
        }
        Ok(bound)
    }

    /// Bind, dispatch one round trip, and check the reply against `returns`.
    pub fn invoke(&self, transport: &mut Transport, args: Vec<(&str, Value)>) -> Result<Value, Error> {
        let bound = self.bind(args)?;
        let reply = transport.call(self.name, &bound)?;
        check_return(self.name, self.returns, &reply)?;
        Ok(reply)
    }

    fn usage(&self, message: String) -> Error {
        Error::new(ErrorKind::InvalidArgument)
            .with_method(self.name)
            .with_message(message)
    }
}

pub fn lookup(name: &str) -> Option<&'static OpDescriptor> {
    OPERATIONS.iter().copied().find(|op| op.name == name)
}

const fn p(name: &'static str, shape: ArgShape) -> Param {
    Param { name, shape }
}

const fn op(name: &'static str, params: &'static [Param], returns: ReturnShape) -> OpDescriptor {
    OpDescriptor {
        name,
        params,
        returns,
    }
}

const INT: ValueKind = ValueKind::Int;
const STR: ValueKind = ValueKind::Str;
const BOOL: ValueKind = ValueKind::Bool;
const FLAGS: Param = p("flags", ArgShape::One(INT));
const SEARCH_KEY: Param = p("search_key", ArgShape::Maybe(STR));
const SEARCH_VALUE: Param = p("search_value", ArgShape::Maybe(STR));

const fn one(kind: ValueKind) -> ArgShape {
    ArgShape::One(kind)
}

const SYSTEM: ValueKind = System::KIND;
const POOL: ValueKind = Pool::KIND;
const VOLUME: ValueKind = Volume::KIND;
const DISK: ValueKind = Disk::KIND;
const INITIATOR: ValueKind = Initiator::KIND;
const ACCESS_GROUP: ValueKind = AccessGroup::KIND;
const FS: ValueKind = FileSystem::KIND;
const SNAPSHOT: ValueKind = FsSnapshot::KIND;
const EXPORT: ValueKind = NfsExport::KIND;
const RANGE: ValueKind = BlockRange::KIND;
const CAPS: ValueKind = Capabilities::KIND;

pub const PLUGIN_REGISTER: OpDescriptor = op(
    "plugin_register",
    &[p("uri", one(STR)), p("password", ArgShape::Maybe(STR)), p("timeout", one(INT)), FLAGS],
    ReturnShape::Void,
);
pub const PLUGIN_UNREGISTER: OpDescriptor = op("plugin_unregister", &[FLAGS], ReturnShape::Void);
pub const TIME_OUT_SET: OpDescriptor =
    op("time_out_set", &[p("ms", one(INT)), FLAGS], ReturnShape::Void);
pub const TIME_OUT_GET: OpDescriptor = op("time_out_get", &[FLAGS], ReturnShape::Scalar(INT));
pub const JOB_STATUS: OpDescriptor = op(
    "job_status",
    &[p("job_id", one(STR)), FLAGS],
    ReturnShape::Tuple(&[INT, INT, ValueKind::Any]),
);
pub const JOB_FREE: OpDescriptor = op("job_free", &[p("job_id", one(STR)), FLAGS], ReturnShape::Void);
pub const CAPABILITIES: OpDescriptor = op(
    "capabilities",
    &[p("system", one(SYSTEM)), FLAGS],
    ReturnShape::Scalar(CAPS),
);
pub const PLUGIN_INFO: OpDescriptor =
    op("plugin_info", &[FLAGS], ReturnShape::Tuple(&[STR, STR]));

pub const SYSTEMS: OpDescriptor = op("systems", &[FLAGS], ReturnShape::List(SYSTEM));
pub const POOLS: OpDescriptor = op(
    "pools",
    &[SEARCH_KEY, SEARCH_VALUE, FLAGS],
    ReturnShape::List(POOL),
);
pub const POOL_CREATE: OpDescriptor = op(
    "pool_create",
    &[
        p("system", one(SYSTEM)),
        p("pool_name", one(STR)),
        p("size_bytes", one(INT)),
        p("raid_type", one(INT)),
        p("member_type", one(INT)),
        FLAGS,
    ],
    ReturnShape::JobOr(POOL),
);
pub const POOL_CREATE_FROM_DISKS: OpDescriptor = op(
    "pool_create_from_disks",
    &[
        p("system_id", one(STR)),
        p("pool_name", one(STR)),
        p("disks", ArgShape::Many(DISK)),
        p("raid_type", one(INT)),
        FLAGS,
    ],
    ReturnShape::JobOr(POOL),
);
pub const POOL_CREATE_FROM_VOLUMES: OpDescriptor = op(
    "pool_create_from_volumes",
    &[
        p("system_id", one(STR)),
        p("pool_name", one(STR)),
        p("volumes", ArgShape::Many(VOLUME)),
        p("raid_type", one(INT)),
        FLAGS,
    ],
    ReturnShape::JobOr(POOL),
);
pub const POOL_CREATE_FROM_POOL: OpDescriptor = op(
    "pool_create_from_pool",
    &[
        p("system_id", one(STR)),
        p("pool_name", one(STR)),
        p("pool", one(POOL)),
        p("size_bytes", one(INT)),
        FLAGS,
    ],
    ReturnShape::JobOr(POOL),
);
pub const POOL_DELETE: OpDescriptor =
    op("pool_delete", &[p("pool", one(POOL)), FLAGS], ReturnShape::JobOrVoid);

pub const VOLUMES: OpDescriptor = op(
    "volumes",
    &[SEARCH_KEY, SEARCH_VALUE, FLAGS],
    ReturnShape::List(VOLUME),
);
pub const VOLUME_CREATE: OpDescriptor = op(
    "volume_create",
    &[
        p("pool", one(POOL)),
        p("volume_name", one(STR)),
        p("size_bytes", one(INT)),
        p("provisioning", one(INT)),
        FLAGS,
    ],
    ReturnShape::JobOr(VOLUME),
);
pub const VOLUME_RESIZE: OpDescriptor = op(
    "volume_resize",
    &[p("volume", one(VOLUME)), p("new_size_bytes", one(INT)), FLAGS],
    ReturnShape::JobOr(VOLUME),
);
pub const VOLUME_REPLICATE: OpDescriptor = op(
    "volume_replicate",
    &[
        p("pool", ArgShape::Maybe(POOL)),
        p("rep_type", one(INT)),
        p("volume_src", one(VOLUME)),
        p("name", one(STR)),
        FLAGS,
    ],
    ReturnShape::JobOr(VOLUME),
);
pub const VOLUME_REPLICATE_RANGE_BLOCK_SIZE: OpDescriptor = op(
    "volume_replicate_range_block_size",
    &[p("system", one(SYSTEM)), FLAGS],
    ReturnShape::Scalar(INT),
);
pub const VOLUME_REPLICATE_RANGE: OpDescriptor = op(
    "volume_replicate_range",
    &[
        p("rep_type", one(INT)),
        p("volume_src", one(VOLUME)),
        p("volume_dest", one(VOLUME)),
        p("ranges", ArgShape::Many(RANGE)),
        FLAGS,
    ],
    ReturnShape::JobOrVoid,
);
pub const VOLUME_DELETE: OpDescriptor =
    op("volume_delete", &[p("volume", one(VOLUME)), FLAGS], ReturnShape::JobOrVoid);
pub const VOLUME_ONLINE: OpDescriptor =
    op("volume_online", &[p("volume", one(VOLUME)), FLAGS], ReturnShape::Void);
pub const VOLUME_OFFLINE: OpDescriptor =
    op("volume_offline", &[p("volume", one(VOLUME)), FLAGS], ReturnShape::Void);
pub const VOLUME_CHILD_DEPENDENCY: OpDescriptor = op(
    "volume_child_dependency",
    &[p("volume", one(VOLUME)), FLAGS],
    ReturnShape::Scalar(BOOL),
);
pub const VOLUME_CHILD_DEPENDENCY_RM: OpDescriptor = op(
    "volume_child_dependency_rm",
    &[p("volume", one(VOLUME)), FLAGS],
    ReturnShape::JobOrVoid,
);

pub const DISKS: OpDescriptor = op(
    "disks",
    &[SEARCH_KEY, SEARCH_VALUE, FLAGS],
    ReturnShape::List(DISK),
);

pub const INITIATORS: OpDescriptor = op("initiators", &[FLAGS], ReturnShape::List(INITIATOR));
pub const ISCSI_CHAP_AUTH: OpDescriptor = op(
    "iscsi_chap_auth",
    &[
        p("initiator", one(INITIATOR)),
        p("in_user", ArgShape::Maybe(STR)),
        p("in_password", ArgShape::Maybe(STR)),
        p("out_user", ArgShape::Maybe(STR)),
        p("out_password", ArgShape::Maybe(STR)),
        FLAGS,
    ],
    ReturnShape::Void,
);
pub const INITIATOR_GRANT: OpDescriptor = op(
    "initiator_grant",
    &[
        p("initiator_id", one(STR)),
        p("initiator_type", one(INT)),
        p("volume", one(VOLUME)),
        p("access", one(INT)),
        FLAGS,
    ],
    ReturnShape::Void,
);
pub const INITIATOR_REVOKE: OpDescriptor = op(
    "initiator_revoke",
    &[p("initiator", one(INITIATOR)), p("volume", one(VOLUME)), FLAGS],
    ReturnShape::Void,
);
pub const VOLUMES_ACCESSIBLE_BY_INITIATOR: OpDescriptor = op(
    "volumes_accessible_by_initiator",
    &[p("initiator", one(INITIATOR)), FLAGS],
    ReturnShape::List(VOLUME),
);
pub const INITIATORS_GRANTED_TO_VOLUME: OpDescriptor = op(
    "initiators_granted_to_volume",
    &[p("volume", one(VOLUME)), FLAGS],
    ReturnShape::List(INITIATOR),
);

pub const ACCESS_GROUPS: OpDescriptor = op(
    "access_groups",
    &[SEARCH_KEY, SEARCH_VALUE, FLAGS],
    ReturnShape::List(ACCESS_GROUP),
);
pub const ACCESS_GROUP_CREATE: OpDescriptor = op(
    "access_group_create",
    &[
        p("name", one(STR)),
        p("initiator_id", one(STR)),
        p("id_type", one(INT)),
        p("system_id", one(STR)),
        FLAGS,
    ],
    ReturnShape::Scalar(ACCESS_GROUP),
);
pub const ACCESS_GROUP_DELETE: OpDescriptor = op(
    "access_group_delete",
    &[p("group", one(ACCESS_GROUP)), FLAGS],
    ReturnShape::Void,
);
pub const ACCESS_GROUP_INITIATOR_ADD: OpDescriptor = op(
    "access_group_initiator_add",
    &[
        p("group", one(ACCESS_GROUP)),
        p("initiator_id", one(STR)),
        p("id_type", one(INT)),
        FLAGS,
    ],
    ReturnShape::Void,
);
pub const ACCESS_GROUP_INITIATOR_DELETE: OpDescriptor = op(
    "access_group_initiator_delete",
    &[p("group", one(ACCESS_GROUP)), p("initiator_id", one(STR)), FLAGS],
    ReturnShape::Void,
);
pub const ACCESS_GROUP_GRANT: OpDescriptor = op(
    "access_group_grant",
    &[
        p("group", one(ACCESS_GROUP)),
        p("volume", one(VOLUME)),
        p("access", one(INT)),
        FLAGS,
    ],
    ReturnShape::Void,
);
pub const ACCESS_GROUP_REVOKE: OpDescriptor = op(
    "access_group_revoke",
    &[p("group", one(ACCESS_GROUP)), p("volume", one(VOLUME)), FLAGS],
    ReturnShape::Void,
);
pub const VOLUMES_ACCESSIBLE_BY_ACCESS_GROUP: OpDescriptor = op(
    "volumes_accessible_by_access_group",
    &[p("group", one(ACCESS_GROUP)), FLAGS],
    ReturnShape::List(VOLUME),
);
pub const ACCESS_GROUPS_GRANTED_TO_VOLUME: OpDescriptor = op(
    "access_groups_granted_to_volume",
    &[p("volume", one(VOLUME)), FLAGS],
    ReturnShape::List(ACCESS_GROUP),
);

pub const FS_LIST: OpDescriptor = op(
    "fs",
    &[SEARCH_KEY, SEARCH_VALUE, FLAGS],
    ReturnShape::List(FS),
);
pub const FS_DELETE: OpDescriptor =
    op("fs_delete", &[p("fs", one(FS)), FLAGS], ReturnShape::JobOrVoid);
pub const FS_RESIZE: OpDescriptor = op(
    "fs_resize",
    &[p("fs", one(FS)), p("new_size_bytes", one(INT)), FLAGS],
    ReturnShape::JobOr(FS),
);
pub const FS_CREATE: OpDescriptor = op(
    "fs_create",
    &[p("pool", one(POOL)), p("name", one(STR)), p("size_bytes", one(INT)), FLAGS],
    ReturnShape::JobOr(FS),
);
pub const FS_CLONE: OpDescriptor = op(
    "fs_clone",
    &[
        p("src_fs", one(FS)),
        p("dest_fs_name", one(STR)),
        p("snapshot", ArgShape::Maybe(SNAPSHOT)),
        FLAGS,
    ],
    ReturnShape::JobOr(FS),
);
pub const FS_FILE_CLONE: OpDescriptor = op(
    "fs_file_clone",
    &[
        p("fs", one(FS)),
        p("src_file_name", one(STR)),
        p("dest_file_name", one(STR)),
        p("snapshot", ArgShape::Maybe(SNAPSHOT)),
        FLAGS,
    ],
    ReturnShape::JobOrVoid,
);
pub const FS_SNAPSHOTS: OpDescriptor =
    op("fs_snapshots", &[p("fs", one(FS)), FLAGS], ReturnShape::List(SNAPSHOT));
pub const FS_SNAPSHOT_CREATE: OpDescriptor = op(
    "fs_snapshot_create",
    &[
        p("fs", one(FS)),
        p("snapshot_name", one(STR)),
        p("files", ArgShape::MaybeMany(STR)),
        FLAGS,
    ],
    ReturnShape::JobOr(SNAPSHOT),
);
pub const FS_SNAPSHOT_DELETE: OpDescriptor = op(
    "fs_snapshot_delete",
    &[p("fs", one(FS)), p("snapshot", one(SNAPSHOT)), FLAGS],
    ReturnShape::JobOrVoid,
);
pub const FS_SNAPSHOT_RESTORE: OpDescriptor = op(
    "fs_snapshot_restore",
    &[
        p("fs", one(FS)),
        p("snapshot", one(SNAPSHOT)),
        p("files", ArgShape::MaybeMany(STR)),
        p("restore_files", ArgShape::MaybeMany(STR)),
        p("all_files", one(BOOL)),
        FLAGS,
    ],
    ReturnShape::JobOrVoid,
);
pub const FS_CHILD_DEPENDENCY: OpDescriptor = op(
    "fs_child_dependency",
    &[p("fs", one(FS)), p("files", ArgShape::MaybeMany(STR)), FLAGS],
    ReturnShape::Scalar(BOOL),
);
pub const FS_CHILD_DEPENDENCY_RM: OpDescriptor = op(
    "fs_child_dependency_rm",
    &[p("fs", one(FS)), p("files", ArgShape::MaybeMany(STR)), FLAGS],
    ReturnShape::JobOrVoid,
);

pub const EXPORT_AUTH: OpDescriptor = op("export_auth", &[FLAGS], ReturnShape::List(STR));
pub const EXPORTS: OpDescriptor = op(
    "exports",
    &[SEARCH_KEY, SEARCH_VALUE, FLAGS],
    ReturnShape::List(EXPORT),
);
pub const EXPORT_FS: OpDescriptor = op(
    "export_fs",
    &[
        p("fs_id", one(STR)),
        p("export_path", ArgShape::Maybe(STR)),
        p("root_list", ArgShape::Many(STR)),
        p("rw_list", ArgShape::Many(STR)),
        p("ro_list", ArgShape::Many(STR)),
        p("anon_uid", one(INT)),
        p("anon_gid", one(INT)),
        p("auth_type", ArgShape::Maybe(STR)),
        p("options", ArgShape::Maybe(STR)),
        FLAGS,
    ],
    ReturnShape::Scalar(EXPORT),
);
pub const EXPORT_REMOVE: OpDescriptor =
    op("export_remove", &[p("export", one(EXPORT)), FLAGS], ReturnShape::Void);

pub const OPERATIONS: &[&OpDescriptor] = &[
    &PLUGIN_REGISTER,
    &PLUGIN_UNREGISTER,
    &TIME_OUT_SET,
    &TIME_OUT_GET,
    &JOB_STATUS,
    &JOB_FREE,
    &CAPABILITIES,
    &PLUGIN_INFO,
    &SYSTEMS,
    &POOLS,
    &POOL_CREATE,
    &POOL_CREATE_FROM_DISKS,
    &POOL_CREATE_FROM_VOLUMES,
    &POOL_CREATE_FROM_POOL,
    &POOL_DELETE,
    &VOLUMES,
    &VOLUME_CREATE,
    &VOLUME_RESIZE,
    &VOLUME_REPLICATE,
    &VOLUME_REPLICATE_RANGE_BLOCK_SIZE,
    &VOLUME_REPLICATE_RANGE,
    &VOLUME_DELETE,
    &VOLUME_ONLINE,
    &VOLUME_OFFLINE,
    &VOLUME_CHILD_DEPENDENCY,
    &VOLUME_CHILD_DEPENDENCY_RM,
    &DISKS,
    &INITIATORS,
    &ISCSI_CHAP_AUTH,
    &INITIATOR_GRANT,
    &INITIATOR_REVOKE,
    &VOLUMES_ACCESSIBLE_BY_INITIATOR,
    &INITIATORS_GRANTED_TO_VOLUME,
    &ACCESS_GROUPS,
    &ACCESS_GROUP_CREATE,
    &ACCESS_GROUP_DELETE,
    &ACCESS_GROUP_INITIATOR_ADD,
    &ACCESS_GROUP_INITIATOR_DELETE,
    &ACCESS_GROUP_GRANT,
    &ACCESS_GROUP_REVOKE,
    &VOLUMES_ACCESSIBLE_BY_ACCESS_GROUP,
    &ACCESS_GROUPS_GRANTED_TO_VOLUME,
    &FS_LIST,
    &FS_DELETE,
    &FS_RESIZE,
    &FS_CREATE,
    &FS_CLONE,
    &FS_FILE_CLONE,
    &FS_SNAPSHOTS,
    &FS_SNAPSHOT_CREATE,
    &FS_SNAPSHOT_DELETE,
    &FS_SNAPSHOT_RESTORE,
    &FS_CHILD_DEPENDENCY,
    &FS_CHILD_DEPENDENCY_RM,
    &EXPORT_AUTH,
    &EXPORTS,
    &EXPORT_FS,
    &EXPORT_REMOVE,
];

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn params_well_formed(params: &[Param]) -> bool {
    if params.is_empty() || !str_eq(params[params.len() - 1].name, "flags") {
        return false;
    }
    let mut i = 0;
    while i < params.len() {
        let mut j = i + 1;
        while j < params.len() {
            if str_eq(params[i].name, params[j].name) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const fn table_well_formed(table: &[&OpDescriptor]) -> bool {
    let mut i = 0;
    while i < table.len() {
        if !params_well_formed(table[i].params) {
            return false;
        }
        let mut j = i + 1;
        while j < table.len() {
            if str_eq(table[i].name, table[j].name) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(table_well_formed(OPERATIONS), "operation table is malformed");
