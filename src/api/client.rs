//! Purpose: One logical session to one plugin, with one method per storage operation.
//! Exports: `Client`, `DEFAULT_TIMEOUT_MS`.
//! Role: Public entry point; binds typed arguments to descriptors and decodes validated replies.
//! Invariants: Exactly one RPC in flight; every method takes `&mut self`.
//! Invariants: `close` consumes the client; a failed reconnect leaves it closed (`ConnectionClosed`).
//! Invariants: A `Transport` failure mid-call also closes the session; replies never cross requests.
//! Invariants: Local validation (search keys, initiator ids, sizes) runs before any socket traffic.
#![allow(clippy::result_large_err)]

use super::capabilities::Capabilities;
use super::job::{Async, Job, JobId, JobReport, JobResult, JobState};
use super::locator::{Locator, PluginInfo, plugin_info};
use super::ops::{self, OpDescriptor};
use super::types::{
    Access, AccessGroup, BlockRange, Disk, ExportRequest, FileSystem, FsSnapshot, Initiator,
    InitiatorType, MemberType, NfsExport, Pool, Provisioning, RaidType, ReplicationType, Search,
    System, Volume, WireObject, check_search_key, validate_initiator,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::transport::Transport;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_TIMEOUT_MS: u32 = 30_000;

type Args<'a> = Vec<(&'a str, Value)>;

/// Session with one plugin. Not for concurrent use; move it to a worker instead.
#[derive(Debug)]
pub struct Client {
    transport: Option<Transport>,
    endpoint: PathBuf,
    uri: String,
    password: Option<String>,
    timeout_ms: u32,
    capabilities: HashMap<String, Capabilities>,
}

impl Client {
    /// Locate the plugin for `uri`, connect, and register.
    pub fn connect(
        uri: &str,
        password: Option<&str>,
        timeout_ms: u32,
        locator: &Locator,
    ) -> ApiResult<Self> {
        let endpoint = locator.locate(uri)?;
        let transport = open_session(&endpoint, uri, password, timeout_ms)?;
        Ok(Self {
            transport: Some(transport),
            endpoint,
            uri: uri.to_string(),
            password: password.map(str::to_string),
            timeout_ms,
            capabilities: HashMap::new(),
        })
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Unregister and close the socket.
    pub fn close(mut self) -> ApiResult<()> {
        let mut transport = self.take_transport()?;
        ops::PLUGIN_UNREGISTER.invoke(&mut transport, vec![])?;
        debug!(path = %self.endpoint.display(), "plugin unregistered");
        Ok(())
    }

    /// Tear the session down and register a new one with timeout `ms`.
    pub fn time_out_set(&mut self, ms: u32) -> ApiResult<()> {
        let mut previous = self.take_transport()?;
        self.capabilities.clear();
        ops::PLUGIN_UNREGISTER.invoke(&mut previous, vec![])?;
        drop(previous);
        debug!(path = %self.endpoint.display(), ms, "reconnecting with new timeout");

        let mut transport =
            open_session(&self.endpoint, &self.uri, self.password.as_deref(), ms)?;
        ops::TIME_OUT_SET.invoke(&mut transport, vec![("ms", Value::from(ms))])?;
        self.timeout_ms = ms;
        self.transport = Some(transport);
        Ok(())
    }

    pub fn time_out_get(&mut self) -> ApiResult<u32> {
        let reply = self.invoke(&ops::TIME_OUT_GET, vec![])?;
        decode(ops::TIME_OUT_GET.name, reply)
    }

    /// Timeout the current session was registered with.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn plugin_info(&mut self) -> ApiResult<PluginInfo> {
        let outcome = plugin_info(self.transport()?);
        self.settle(outcome)
    }

    /// Capabilities for `system`, fetched once per session.
    pub fn capabilities(&mut self, system: &System) -> ApiResult<Capabilities> {
        if let Some(cached) = self.capabilities.get(&system.id) {
            return Ok(cached.clone());
        }
        let reply = self.invoke(&ops::CAPABILITIES, vec![("system", system.to_wire()?)])?;
        let capabilities = Capabilities::from_wire(ops::CAPABILITIES.name, reply)?;
        self.capabilities
            .insert(system.id.clone(), capabilities.clone());
        Ok(capabilities)
    }

    pub fn job_status(&mut self, job_id: &JobId) -> ApiResult<JobReport> {
        let reply = self.invoke(&ops::JOB_STATUS, vec![("job_id", job_id.as_str().into())])?;
        JobReport::from_reply(ops::JOB_STATUS.name, reply)
    }

    /// Poll `job` once and type its outcome for the operation that started it.
    pub fn job_state<T: JobResult>(&mut self, job: &Job<T>) -> ApiResult<JobState<T>> {
        let report = self.job_status(job.id())?;
        JobState::from_report(job.method(), report)
    }

    pub fn job_free(&mut self, job_id: &JobId) -> ApiResult<()> {
        self.invoke(&ops::JOB_FREE, vec![("job_id", job_id.as_str().into())])?;
        Ok(())
    }

    pub fn systems(&mut self) -> ApiResult<Vec<System>> {
        let reply = self.invoke(&ops::SYSTEMS, vec![])?;
        list(ops::SYSTEMS.name, reply)
    }

    pub fn pools(&mut self, search: Option<&Search>) -> ApiResult<Vec<Pool>> {
        self.search::<Pool>(&ops::POOLS, search)
    }

    pub fn pool_create(
        &mut self,
        system: &System,
        pool_name: &str,
        size_bytes: u64,
        raid_type: RaidType,
        member_type: MemberType,
    ) -> ApiResult<Async<Pool>> {
        if size_bytes == 0 {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_method(ops::POOL_CREATE.name)
                .with_message("pool size must be greater than zero"));
        }
        let args = vec![
            ("system", system.to_wire()?),
            ("pool_name", pool_name.into()),
            ("size_bytes", size_bytes.into()),
            ("raid_type", raid_type.code().into()),
            ("member_type", member_type.code().into()),
        ];
        self.dual(&ops::POOL_CREATE, args)
    }

    pub fn pool_create_from_disks(
        &mut self,
        system_id: &str,
        pool_name: &str,
        disks: &[Disk],
        raid_type: RaidType,
    ) -> ApiResult<Async<Pool>> {
        let args = vec![
            ("system_id", system_id.into()),
            ("pool_name", pool_name.into()),
            ("disks", wire_list(disks)?),
            ("raid_type", raid_type.code().into()),
        ];
        self.dual(&ops::POOL_CREATE_FROM_DISKS, args)
    }

    pub fn pool_create_from_volumes(
        &mut self,
        system_id: &str,
        pool_name: &str,
        volumes: &[Volume],
        raid_type: RaidType,
    ) -> ApiResult<Async<Pool>> {
        let args = vec![
            ("system_id", system_id.into()),
            ("pool_name", pool_name.into()),
            ("volumes", wire_list(volumes)?),
            ("raid_type", raid_type.code().into()),
        ];
        self.dual(&ops::POOL_CREATE_FROM_VOLUMES, args)
    }

    pub fn pool_create_from_pool(
        &mut self,
        system_id: &str,
        pool_name: &str,
        pool: &Pool,
        size_bytes: u64,
    ) -> ApiResult<Async<Pool>> {
        let args = vec![
            ("system_id", system_id.into()),
            ("pool_name", pool_name.into()),
            ("pool", pool.to_wire()?),
            ("size_bytes", size_bytes.into()),
        ];
        self.dual(&ops::POOL_CREATE_FROM_POOL, args)
    }

    pub fn pool_delete(&mut self, pool: &Pool) -> ApiResult<Async<()>> {
        self.completion(&ops::POOL_DELETE, vec![("pool", pool.to_wire()?)])
    }

    pub fn volumes(&mut self, search: Option<&Search>) -> ApiResult<Vec<Volume>> {
        self.search::<Volume>(&ops::VOLUMES, search)
    }

    pub fn volume_create(
        &mut self,
        pool: &Pool,
        volume_name: &str,
        size_bytes: u64,
        provisioning: Provisioning,
    ) -> ApiResult<Async<Volume>> {
        let args = vec![
            ("pool", pool.to_wire()?),
            ("volume_name", volume_name.into()),
            ("size_bytes", size_bytes.into()),
            ("provisioning", provisioning.code().into()),
        ];
        self.dual(&ops::VOLUME_CREATE, args)
    }

    pub fn volume_resize(&mut self, volume: &Volume, new_size_bytes: u64) -> ApiResult<Async<Volume>> {
        let args = vec![
            ("volume", volume.to_wire()?),
            ("new_size_bytes", new_size_bytes.into()),
        ];
        self.dual(&ops::VOLUME_RESIZE, args)
    }

    /// Replicate `volume_src`; `pool` of `None` lets the plugin choose.
    pub fn volume_replicate(
        &mut self,
        pool: Option<&Pool>,
        rep_type: ReplicationType,
        volume_src: &Volume,
        name: &str,
    ) -> ApiResult<Async<Volume>> {
        let args = vec![
            ("pool", maybe(pool)?),
            ("rep_type", rep_type.code().into()),
            ("volume_src", volume_src.to_wire()?),
            ("name", name.into()),
        ];
        self.dual(&ops::VOLUME_REPLICATE, args)
    }

    pub fn volume_replicate_range_block_size(&mut self, system: &System) -> ApiResult<u64> {
        let op = &ops::VOLUME_REPLICATE_RANGE_BLOCK_SIZE;
        let reply = self.invoke(op, vec![("system", system.to_wire()?)])?;
        decode(op.name, reply)
    }

    pub fn volume_replicate_range(
        &mut self,
        rep_type: ReplicationType,
        volume_src: &Volume,
        volume_dest: &Volume,
        ranges: &[BlockRange],
    ) -> ApiResult<Async<()>> {
        let args = vec![
            ("rep_type", rep_type.code().into()),
            ("volume_src", volume_src.to_wire()?),
            ("volume_dest", volume_dest.to_wire()?),
            ("ranges", wire_list(ranges)?),
        ];
        self.completion(&ops::VOLUME_REPLICATE_RANGE, args)
    }

    pub fn volume_delete(&mut self, volume: &Volume) -> ApiResult<Async<()>> {
        self.completion(&ops::VOLUME_DELETE, vec![("volume", volume.to_wire()?)])
    }

    pub fn volume_online(&mut self, volume: &Volume) -> ApiResult<()> {
        self.void(&ops::VOLUME_ONLINE, vec![("volume", volume.to_wire()?)])
    }

    pub fn volume_offline(&mut self, volume: &Volume) -> ApiResult<()> {
        self.void(&ops::VOLUME_OFFLINE, vec![("volume", volume.to_wire()?)])
    }

    /// True when other volumes depend on `volume` (snapshots, clones).
    pub fn volume_child_dependency(&mut self, volume: &Volume) -> ApiResult<bool> {
        let op = &ops::VOLUME_CHILD_DEPENDENCY;
        let reply = self.invoke(op, vec![("volume", volume.to_wire()?)])?;
        decode(op.name, reply)
    }

    pub fn volume_child_dependency_rm(&mut self, volume: &Volume) -> ApiResult<Async<()>> {
        self.completion(&ops::VOLUME_CHILD_DEPENDENCY_RM, vec![("volume", volume.to_wire()?)])
    }

    pub fn disks(&mut self, search: Option<&Search>) -> ApiResult<Vec<Disk>> {
        self.search::<Disk>(&ops::DISKS, search)
    }

    pub fn initiators(&mut self) -> ApiResult<Vec<Initiator>> {
        let reply = self.invoke(&ops::INITIATORS, vec![])?;
        list(ops::INITIATORS.name, reply)
    }

    pub fn iscsi_chap_auth(
        &mut self,
        initiator: &Initiator,
        in_user: Option<&str>,
        in_password: Option<&str>,
        out_user: Option<&str>,
        out_password: Option<&str>,
    ) -> ApiResult<()> {
        let args = vec![
            ("initiator", initiator.to_wire()?),
            ("in_user", in_user.into()),
            ("in_password", in_password.into()),
            ("out_user", out_user.into()),
            ("out_password", out_password.into()),
        ];
        self.void(&ops::ISCSI_CHAP_AUTH, args)
    }

    pub fn initiator_grant(
        &mut self,
        initiator_id: &str,
        initiator_type: InitiatorType,
        volume: &Volume,
        access: Access,
    ) -> ApiResult<()> {
        validate_initiator(initiator_id, initiator_type)
            .map_err(|err| err.with_method(ops::INITIATOR_GRANT.name))?;
        let args = vec![
            ("initiator_id", initiator_id.into()),
            ("initiator_type", initiator_type.code().into()),
            ("volume", volume.to_wire()?),
            ("access", access.code().into()),
        ];
        self.void(&ops::INITIATOR_GRANT, args)
    }

    pub fn initiator_revoke(&mut self, initiator: &Initiator, volume: &Volume) -> ApiResult<()> {
        let args = vec![
            ("initiator", initiator.to_wire()?),
            ("volume", volume.to_wire()?),
        ];
        self.void(&ops::INITIATOR_REVOKE, args)
    }

    pub fn volumes_accessible_by_initiator(&mut self, initiator: &Initiator) -> ApiResult<Vec<Volume>> {
        let op = &ops::VOLUMES_ACCESSIBLE_BY_INITIATOR;
        let reply = self.invoke(op, vec![("initiator", initiator.to_wire()?)])?;
        list(op.name, reply)
    }

    pub fn initiators_granted_to_volume(&mut self, volume: &Volume) -> ApiResult<Vec<Initiator>> {
        let op = &ops::INITIATORS_GRANTED_TO_VOLUME;
        let reply = self.invoke(op, vec![("volume", volume.to_wire()?)])?;
        list(op.name, reply)
    }

    pub fn access_groups(&mut self, search: Option<&Search>) -> ApiResult<Vec<AccessGroup>> {
        self.search::<AccessGroup>(&ops::ACCESS_GROUPS, search)
    }

    pub fn access_group_create(
        &mut self,
        name: &str,
        initiator_id: &str,
        id_type: InitiatorType,
        system_id: &str,
    ) -> ApiResult<AccessGroup> {
        let op = &ops::ACCESS_GROUP_CREATE;
        validate_initiator(initiator_id, id_type).map_err(|err| err.with_method(op.name))?;
        let args = vec![
            ("name", name.into()),
            ("initiator_id", initiator_id.into()),
            ("id_type", id_type.code().into()),
            ("system_id", system_id.into()),
        ];
        let reply = self.invoke(op, args)?;
        AccessGroup::from_wire(op.name, reply)
    }

    pub fn access_group_delete(&mut self, group: &AccessGroup) -> ApiResult<()> {
        self.void(&ops::ACCESS_GROUP_DELETE, vec![("group", group.to_wire()?)])
    }

    pub fn access_group_initiator_add(
        &mut self,
        group: &AccessGroup,
        initiator_id: &str,
        id_type: InitiatorType,
    ) -> ApiResult<()> {
        let op = &ops::ACCESS_GROUP_INITIATOR_ADD;
        validate_initiator(initiator_id, id_type).map_err(|err| err.with_method(op.name))?;
        let args = vec![
            ("group", group.to_wire()?),
            ("initiator_id", initiator_id.into()),
            ("id_type", id_type.code().into()),
        ];
        self.void(op, args)
    }

    pub fn access_group_initiator_delete(
        &mut self,
        group: &AccessGroup,
        initiator_id: &str,
    ) -> ApiResult<()> {
        let args = vec![
            ("group", group.to_wire()?),
            ("initiator_id", initiator_id.into()),
        ];
        self.void(&ops::ACCESS_GROUP_INITIATOR_DELETE, args)
    }

    pub fn access_group_grant(
        &mut self,
        group: &AccessGroup,
        volume: &Volume,
        access: Access,
    ) -> ApiResult<()> {
        let args = vec![
            ("group", group.to_wire()?),
            ("volume", volume.to_wire()?),
            ("access", access.code().into()),
        ];
        self.void(&ops::ACCESS_GROUP_GRANT, args)
    }

    pub fn access_group_revoke(&mut self, group: &AccessGroup, volume: &Volume) -> ApiResult<()> {
        let args = vec![("group", group.to_wire()?), ("volume", volume.to_wire()?)];
        self.void(&ops::ACCESS_GROUP_REVOKE, args)
    }

    pub fn volumes_accessible_by_access_group(
        &mut self,
        group: &AccessGroup,
    ) -> ApiResult<Vec<Volume>> {
        let op = &ops::VOLUMES_ACCESSIBLE_BY_ACCESS_GROUP;
        let reply = self.invoke(op, vec![("group", group.to_wire()?)])?;
        list(op.name, reply)
    }

    pub fn access_groups_granted_to_volume(&mut self, volume: &Volume) -> ApiResult<Vec<AccessGroup>> {
        let op = &ops::ACCESS_GROUPS_GRANTED_TO_VOLUME;
        let reply = self.invoke(op, vec![("volume", volume.to_wire()?)])?;
        list(op.name, reply)
    }

    pub fn fs(&mut self, search: Option<&Search>) -> ApiResult<Vec<FileSystem>> {
        self.search::<FileSystem>(&ops::FS_LIST, search)
    }

    pub fn fs_delete(&mut self, fs: &FileSystem) -> ApiResult<Async<()>> {
        self.completion(&ops::FS_DELETE, vec![("fs", fs.to_wire()?)])
    }

    pub fn fs_resize(&mut self, fs: &FileSystem, new_size_bytes: u64) -> ApiResult<Async<FileSystem>> {
        let args = vec![("fs", fs.to_wire()?), ("new_size_bytes", new_size_bytes.into())];
        self.dual(&ops::FS_RESIZE, args)
    }

    pub fn fs_create(&mut self, pool: &Pool, name: &str, size_bytes: u64) -> ApiResult<Async<FileSystem>> {
        let args = vec![
            ("pool", pool.to_wire()?),
            ("name", name.into()),
            ("size_bytes", size_bytes.into()),
        ];
        self.dual(&ops::FS_CREATE, args)
    }

    pub fn fs_clone(
        &mut self,
        src_fs: &FileSystem,
        dest_fs_name: &str,
        snapshot: Option<&FsSnapshot>,
    ) -> ApiResult<Async<FileSystem>> {
        let args = vec![
            ("src_fs", src_fs.to_wire()?),
            ("dest_fs_name", dest_fs_name.into()),
            ("snapshot", maybe(snapshot)?),
        ];
        self.dual(&ops::FS_CLONE, args)
    }

    pub fn fs_file_clone(
        &mut self,
        fs: &FileSystem,
        src_file_name: &str,
        dest_file_name: &str,
        snapshot: Option<&FsSnapshot>,
    ) -> ApiResult<Async<()>> {
        let args = vec![
            ("fs", fs.to_wire()?),
            ("src_file_name", src_file_name.into()),
            ("dest_file_name", dest_file_name.into()),
            ("snapshot", maybe(snapshot)?),
        ];
        self.completion(&ops::FS_FILE_CLONE, args)
    }

    pub fn fs_snapshots(&mut self, fs: &FileSystem) -> ApiResult<Vec<FsSnapshot>> {
        let reply = self.invoke(&ops::FS_SNAPSHOTS, vec![("fs", fs.to_wire()?)])?;
        list(ops::FS_SNAPSHOTS.name, reply)
    }

    /// Snapshot `fs`; `files` of `None` snapshots the whole file system.
    pub fn fs_snapshot_create(
        &mut self,
        fs: &FileSystem,
        snapshot_name: &str,
        files: Option<&[String]>,
    ) -> ApiResult<Async<FsSnapshot>> {
        let args = vec![
            ("fs", fs.to_wire()?),
            ("snapshot_name", snapshot_name.into()),
            ("files", files.into()),
        ];
        self.dual(&ops::FS_SNAPSHOT_CREATE, args)
    }

    pub fn fs_snapshot_delete(&mut self, fs: &FileSystem, snapshot: &FsSnapshot) -> ApiResult<Async<()>> {
        let args = vec![("fs", fs.to_wire()?), ("snapshot", snapshot.to_wire()?)];
        self.completion(&ops::FS_SNAPSHOT_DELETE, args)
    }

    /// Restore `files` from `snapshot`, optionally under the paired `restore_files` names.
    pub fn fs_snapshot_restore(
        &mut self,
        fs: &FileSystem,
        snapshot: &FsSnapshot,
        files: Option<&[String]>,
        restore_files: Option<&[String]>,
        all_files: bool,
    ) -> ApiResult<Async<()>> {
        let op = &ops::FS_SNAPSHOT_RESTORE;
        if let (Some(files), Some(restore_files)) = (files, restore_files) {
            if files.len() != restore_files.len() {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_method(op.name)
                    .with_message("restore_files must pair one-to-one with files"));
            }
        }
        let args = vec![
            ("fs", fs.to_wire()?),
            ("snapshot", snapshot.to_wire()?),
            ("files", files.into()),
            ("restore_files", restore_files.into()),
            ("all_files", all_files.into()),
        ];
        self.completion(op, args)
    }

    pub fn fs_child_dependency(&mut self, fs: &FileSystem, files: Option<&[String]>) -> ApiResult<bool> {
        let op = &ops::FS_CHILD_DEPENDENCY;
        let reply = self.invoke(op, vec![("fs", fs.to_wire()?), ("files", files.into())])?;
        decode(op.name, reply)
    }

    pub fn fs_child_dependency_rm(
        &mut self,
        fs: &FileSystem,
        files: Option<&[String]>,
    ) -> ApiResult<Async<()>> {
        let args = vec![("fs", fs.to_wire()?), ("files", files.into())];
        self.completion(&ops::FS_CHILD_DEPENDENCY_RM, args)
    }

    pub fn export_auth(&mut self) -> ApiResult<Vec<String>> {
        let reply = self.invoke(&ops::EXPORT_AUTH, vec![])?;
        decode(ops::EXPORT_AUTH.name, reply)
    }

    pub fn exports(&mut self, search: Option<&Search>) -> ApiResult<Vec<NfsExport>> {
        self.search::<NfsExport>(&ops::EXPORTS, search)
    }

    pub fn export_fs(&mut self, request: &ExportRequest) -> ApiResult<NfsExport> {
        let op = &ops::EXPORT_FS;
        let args = vec![
            ("fs_id", request.fs_id.as_str().into()),
            ("export_path", request.export_path.as_deref().into()),
            ("root_list", request.root.as_slice().into()),
            ("rw_list", request.rw.as_slice().into()),
            ("ro_list", request.ro.as_slice().into()),
            ("anon_uid", request.anon_uid.into()),
            ("anon_gid", request.anon_gid.into()),
            ("auth_type", request.auth_type.as_deref().into()),
            ("options", request.options.as_deref().into()),
        ];
        let reply = self.invoke(op, args)?;
        NfsExport::from_wire(op.name, reply)
    }

    pub fn export_remove(&mut self, export: &NfsExport) -> ApiResult<()> {
        self.void(&ops::EXPORT_REMOVE, vec![("export", export.to_wire()?)])
    }

    fn transport(&mut self) -> ApiResult<&mut Transport> {
        let endpoint = &self.endpoint;
        self.transport.as_mut().ok_or_else(|| closed(endpoint))
    }

    fn take_transport(&mut self) -> ApiResult<Transport> {
        self.transport.take().ok_or_else(|| closed(&self.endpoint))
    }

    fn invoke(&mut self, op: &OpDescriptor, args: Args<'_>) -> ApiResult<Value> {
        let outcome = op.invoke(self.transport()?, args);
        self.settle(outcome)
    }

    /// Drop the session when a call left the stream out of step.
    fn settle<T>(&mut self, outcome: ApiResult<T>) -> ApiResult<T> {
        let failed = outcome.as_ref().err().filter(|err| err.kind() == ErrorKind::Transport);
        if let Some(err) = failed {
            debug!(path = %self.endpoint.display(), error = %err, "closing session after transport failure");
            self.transport = None;
            self.capabilities.clear();
        }
        outcome
    }

    fn void(&mut self, op: &OpDescriptor, args: Args<'_>) -> ApiResult<()> {
        self.invoke(op, args).map(drop)
    }

    fn search<T: WireObject>(&mut self, op: &OpDescriptor, search: Option<&Search>) -> ApiResult<Vec<T>> {
        check_search_key::<T>(search).map_err(|err| err.with_method(op.name))?;
        let args = match search {
            Some(search) => vec![
                ("search_key", search.key.as_str().into()),
                ("search_value", search.value.as_str().into()),
            ],
            None => vec![],
        };
        let reply = self.invoke(op, args)?;
        list(op.name, reply)
    }

    fn dual<T: WireObject>(&mut self, op: &OpDescriptor, args: Args<'_>) -> ApiResult<Async<T>> {
        let reply = self.invoke(op, args)?;
        dual_result(op.name, reply)
    }

    fn completion(&mut self, op: &OpDescriptor, args: Args<'_>) -> ApiResult<Async<()>> {
        let reply = self.invoke(op, args)?;
        Ok(job_or_done(op.name, reply))
    }
}

fn open_session(
    endpoint: &Path,
    uri: &str,
    password: Option<&str>,
    timeout_ms: u32,
) -> ApiResult<Transport> {
    let deadline = Some(Duration::from_millis(u64::from(timeout_ms)));
    let mut transport = Transport::connect(endpoint, deadline)?;
    let args = vec![
        ("uri", uri.into()),
        ("password", password.into()),
        ("timeout", timeout_ms.into()),
    ];
    ops::PLUGIN_REGISTER.invoke(&mut transport, args)?;
    debug!(path = %endpoint.display(), uri, timeout_ms, "plugin registered");
    Ok(transport)
}

fn closed(endpoint: &Path) -> Error {
    Error::new(ErrorKind::ConnectionClosed)
        .with_message("connection is closed")
        .with_path(endpoint)
}

fn decode<T: DeserializeOwned>(method: &'static str, value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|err| {
        Error::new(ErrorKind::PluginBug)
            .with_method(method)
            .with_message("result does not fit its declared type")
            .with_source(err)
    })
}

fn list<T: WireObject>(method: &'static str, value: Value) -> ApiResult<Vec<T>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| T::from_wire(method, item))
            .collect(),
        _ => Err(Error::new(ErrorKind::PluginBug)
            .with_method(method)
            .with_message("expected a list")),
    }
}

fn maybe<T: WireObject>(item: Option<&T>) -> ApiResult<Value> {
    item.map_or(Ok(Value::Null), T::to_wire)
}

fn wire_list<T: WireObject>(items: &[T]) -> ApiResult<Value> {
    items
        .iter()
        .map(T::to_wire)
        .collect::<ApiResult<Vec<_>>>()
        .map(Value::Array)
}

/// Split a shape-checked `[job_id, item]` pair.
fn dual_result<T: WireObject>(method: &'static str, value: Value) -> ApiResult<Async<T>> {
    let (job, item) = match value {
        Value::Array(pair) => {
            let mut pair = pair.into_iter();
            (pair.next(), pair.next())
        }
        _ => (None, None),
    };
    match (job, item) {
        (Some(Value::String(id)), _) => Ok(Async::Job(Job::new(JobId::new(id), method))),
        (_, Some(item)) if !item.is_null() => T::from_wire(method, item).map(Async::Done),
        _ => Err(Error::new(ErrorKind::PluginBug)
            .with_method(method)
            .with_message("neither job id nor item is set")),
    }
}

fn job_or_done(method: &'static str, value: Value) -> Async<()> {
    match value {
        Value::String(id) => Async::Job(Job::new(JobId::new(id), method)),
        _ => Async::Done(()),
    }
}
