//! Purpose: Resolve a URI scheme to its plugin socket and enumerate running plugins.
//! Exports: `Locator`, `Discovery`, `PluginInfo`, `DEFAULT_BASE_DIR`, `BASE_DIR_ENV`.
//! Role: Configuration value for socket addressing; threaded explicitly into every connect.
//! Invariants: Socket path is `<base_dir>/<scheme>`, with any `+transport` suffix stripped.
//! Invariants: The environment is read only by `Locator::from_env`, never mid-call.
#![allow(clippy::result_large_err)]

use super::ops::PLUGIN_INFO;
use crate::core::error::{Error, ErrorKind};
use crate::core::transport::{Transport, connect_socket};
use std::ffi::OsString;
use std::os::unix::fs::FileTypeExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_DIR: &str = "/var/run/lsm/ipc";
pub const BASE_DIR_ENV: &str = "LSM_UDS_PATH";

const ENUMERATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tagged outcome of resolving one scheme.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Discovery {
    Found(PathBuf),
    /// Other plugin sockets respond, but not the named one.
    PluginAbsent(PathBuf),
    /// No socket under the base directory responds.
    DaemonAbsent,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PluginInfo {
    pub description: String,
    pub version: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Locator {
    base_dir: PathBuf,
}

impl Locator {
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
        }
    }

    pub fn from_env() -> Self {
        Self::from_override(std::env::var_os(BASE_DIR_ENV))
    }

    fn from_override(value: Option<OsString>) -> Self {
        match value.filter(|value| !value.is_empty()) {
            Some(dir) => Self::new().with_base_dir(dir),
            None => Self::new(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn socket_path(&self, uri: &str) -> Result<PathBuf, Error> {
        Ok(self.base_dir.join(plugin_scheme(uri)?))
    }

    pub fn discover(&self, uri: &str) -> Result<Discovery, Error> {
        let path = self.socket_path(uri)?;
        if path.exists() {
            return Ok(Discovery::Found(path));
        }
        let outcome = if self.daemon_running() {
            Discovery::PluginAbsent(path)
        } else {
            Discovery::DaemonAbsent
        };
        debug!(uri, ?outcome, "plugin socket missing");
        Ok(outcome)
    }

    /// Resolve `uri` to an existing socket path, or the matching absence error.
    pub fn locate(&self, uri: &str) -> Result<PathBuf, Error> {
        match self.discover(uri)? {
            Discovery::Found(path) => Ok(path),
            Discovery::PluginAbsent(path) => Err(Error::new(ErrorKind::PluginNotFound)
                .with_message(format!("plug-in for '{uri}' not found"))
                .with_path(path)),
            Discovery::DaemonAbsent => Err(daemon_not_running(&self.base_dir)),
        }
    }

    /// True when at least one socket under the base directory accepts a connection.
    pub fn daemon_running(&self) -> bool {
        self.sockets()
            .iter()
            .any(|socket| connect_socket(socket).is_ok())
    }

    /// `plugin_info` from every socket that accepts; refused sockets are skipped.
    pub fn available_plugins(&self) -> Result<Vec<PluginInfo>, Error> {
        if !self.daemon_running() {
            return Err(daemon_not_running(&self.base_dir));
        }
        let mut plugins = Vec::new();
        for socket in self.sockets() {
            let Ok(stream) = connect_socket(&socket) else {
                debug!(path = %socket.display(), "skipping stale plugin socket");
                continue;
            };
            let mut transport = Transport::from_stream(stream, &socket);
            transport.set_timeout(Some(ENUMERATE_TIMEOUT))?;
            plugins.push(plugin_info(&mut transport)?);
        }
        debug!(count = plugins.len(), "enumerated plugins");
        Ok(plugins)
    }

    fn sockets(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.base_dir) else {
            return Vec::new();
        };
        let mut sockets: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_type()
                    .is_ok_and(|file_type| file_type.is_socket())
            })
            .map(|entry| entry.path())
            .collect();
        sockets.sort();
        sockets
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn plugin_info(transport: &mut Transport) -> Result<PluginInfo, Error> {
    let reply = PLUGIN_INFO.invoke(transport, vec![])?;
    info_from_pair(reply)
}

fn info_from_pair(reply: Value) -> Result<PluginInfo, Error> {
    let Value::Array(pair) = reply else {
        return Err(info_bug());
    };
    match <[Value; 2]>::try_from(pair) {
        Ok([Value::String(description), Value::String(version)]) => Ok(PluginInfo {
            description,
            version,
        }),
        _ => Err(info_bug()),
    }
}

fn info_bug() -> Error {
    Error::new(ErrorKind::PluginBug)
        .with_method(PLUGIN_INFO.name)
        .with_message("plugin_info reply is not a (description, version) pair")
}

/// Device-family scheme of `uri`: `sim+ssl://host` names the `sim` plugin.
pub fn plugin_scheme(uri: &str) -> Result<String, Error> {
    let url = Url::parse(uri).map_err(|err| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("invalid uri '{uri}'"))
            .with_source(err)
    })?;
    let scheme = url.scheme().split('+').next().unwrap_or_default();
    if scheme.is_empty() {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("uri '{uri}' has no plug-in scheme")));
    }
    Ok(scheme.to_string())
}

fn daemon_not_running(base_dir: &Path) -> Error {
    Error::new(ErrorKind::DaemonNotRunning)
        .with_message("the libStorageMgmt daemon is not running (process name lsmd)")
        .with_path(base_dir)
}
