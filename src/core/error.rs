//! Purpose: Define the single error type shared by every layer of the client.
//! Exports: `Error`, `ErrorKind`, `Entity`, `WireCode`, `kind_for_wire_code`.
//! Role: Error mapper target; locator, transport, shape checks and wire errors all land here.
//! Invariants: Wire-reported code and message are preserved verbatim on the error.
//! Invariants: Daemon-absent and plugin-absent never collapse into one kind.
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

/// Storage entity referenced by a not-found error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Entity {
    AccessGroup,
    FileSystem,
    Job,
    Pool,
    Snapshot,
    Volume,
    NfsExport,
    Initiator,
    System,
    Disk,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    DaemonNotRunning,
    PluginNotFound,
    Transport,
    UnsupportedSearchKey,
    UnsupportedInitiatorType,
    InvalidArgument,
    PluginError,
    PluginBug,
    NotFound(Entity),
    NotImplemented,
    ConnectionClosed,
}

impl ErrorKind {
    /// Stable numeric code, shared with the wire error table.
    pub fn code(self) -> i64 {
        match self {
            ErrorKind::PluginError => 1,
            ErrorKind::PluginBug => 2,
            ErrorKind::DaemonNotRunning => 12,
            ErrorKind::InvalidArgument => 101,
            ErrorKind::NotImplemented => 225,
            ErrorKind::NotFound(entity) => match entity {
                Entity::AccessGroup => 200,
                Entity::FileSystem => 201,
                Entity::Job => 202,
                Entity::Pool => 203,
                Entity::Snapshot => 204,
                Entity::Volume => 205,
                Entity::NfsExport => 206,
                Entity::Initiator => 207,
                Entity::System => 208,
                Entity::Disk => 209,
            },
            ErrorKind::PluginNotFound => 311,
            ErrorKind::Transport => 400,
            ErrorKind::ConnectionClosed => 401,
            ErrorKind::UnsupportedSearchKey => 510,
            ErrorKind::UnsupportedInitiatorType => 511,
        }
    }
}

/// Error code as it appeared on the wire.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireCode {
    Number(i64),
    Text(String),
}

impl fmt::Display for WireCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireCode::Number(code) => write!(f, "{code}"),
            WireCode::Text(code) => f.write_str(code),
        }
    }
}

pub fn kind_for_wire_code(code: &WireCode) -> ErrorKind {
    let number = match code {
        WireCode::Number(number) => *number,
        WireCode::Text(text) => match text.trim().parse::<i64>() {
            Ok(number) => number,
            Err(_) => return kind_for_wire_name(text),
        },
    };
    match number {
        2 => ErrorKind::PluginBug,
        11 | 400 => ErrorKind::Transport,
        12 => ErrorKind::DaemonNotRunning,
        101 => ErrorKind::InvalidArgument,
        153 | 225 => ErrorKind::NotImplemented,
        200 => ErrorKind::NotFound(Entity::AccessGroup),
        201 => ErrorKind::NotFound(Entity::FileSystem),
        202 => ErrorKind::NotFound(Entity::Job),
        203 => ErrorKind::NotFound(Entity::Pool),
        204 => ErrorKind::NotFound(Entity::Snapshot),
        205 => ErrorKind::NotFound(Entity::Volume),
        206 => ErrorKind::NotFound(Entity::NfsExport),
        207 => ErrorKind::NotFound(Entity::Initiator),
        208 => ErrorKind::NotFound(Entity::System),
        209 => ErrorKind::NotFound(Entity::Disk),
        311 => ErrorKind::PluginNotFound,
        510 => ErrorKind::UnsupportedSearchKey,
        511 => ErrorKind::UnsupportedInitiatorType,
        _ => ErrorKind::PluginError,
    }
}

fn kind_for_wire_name(name: &str) -> ErrorKind {
    match name {
        "PLUGIN_BUG" => ErrorKind::PluginBug,
        "TIMEOUT" | "TRANSPORT_COMMUNICATION" => ErrorKind::Transport,
        "DAEMON_NOT_RUNNING" => ErrorKind::DaemonNotRunning,
        "INVALID_ARGUMENT" => ErrorKind::InvalidArgument,
        "NO_SUPPORT" | "NOT_IMPLEMENTED" => ErrorKind::NotImplemented,
        "NOT_FOUND_ACCESS_GROUP" => ErrorKind::NotFound(Entity::AccessGroup),
        "NOT_FOUND_FS" => ErrorKind::NotFound(Entity::FileSystem),
        "NOT_FOUND_JOB" => ErrorKind::NotFound(Entity::Job),
        "NOT_FOUND_POOL" => ErrorKind::NotFound(Entity::Pool),
        "NOT_FOUND_FS_SS" => ErrorKind::NotFound(Entity::Snapshot),
        "NOT_FOUND_VOLUME" => ErrorKind::NotFound(Entity::Volume),
        "NOT_FOUND_NFS_EXPORT" => ErrorKind::NotFound(Entity::NfsExport),
        "NOT_FOUND_INITIATOR" => ErrorKind::NotFound(Entity::Initiator),
        "NOT_FOUND_SYSTEM" => ErrorKind::NotFound(Entity::System),
        "NOT_FOUND_DISK" => ErrorKind::NotFound(Entity::Disk),
        "PLUGIN_NOT_EXIST" | "PLUGIN_NOT_FOUND" => ErrorKind::PluginNotFound,
        "UNSUPPORTED_SEARCH_KEY" => ErrorKind::UnsupportedSearchKey,
        "UNSUPPORTED_INITIATOR_TYPE" => ErrorKind::UnsupportedInitiatorType,
        _ => ErrorKind::PluginError,
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    code: Option<WireCode>,
    path: Option<PathBuf>,
    method: Option<&'static str>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            code: None,
            path: None,
            method: None,
            source: None,
        }
    }

    /// Build the error for a well-formed wire error envelope.
    pub fn from_wire(code: WireCode, message: impl Into<String>) -> Self {
        Error::new(kind_for_wire_code(&code))
            .with_code(code)
            .with_message(message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Code reported by the plugin, if this error came off the wire.
    pub fn code(&self) -> Option<&WireCode> {
        self.code.as_ref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn method(&self) -> Option<&'static str> {
        self.method
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_code(mut self, code: WireCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_method(mut self, method: &'static str) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        if let Some(method) = self.method {
            write!(f, " (method: {method})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, Error, ErrorKind, WireCode, kind_for_wire_code};

    #[test]
    fn numeric_wire_codes_map_to_kinds() {
        let cases = [
            (2, ErrorKind::PluginBug),
            (12, ErrorKind::DaemonNotRunning),
            (153, ErrorKind::NotImplemented),
            (202, ErrorKind::NotFound(Entity::Job)),
            (207, ErrorKind::NotFound(Entity::Initiator)),
            (311, ErrorKind::PluginNotFound),
            (510, ErrorKind::UnsupportedSearchKey),
            (9999, ErrorKind::PluginError),
        ];

        for (code, kind) in cases {
            assert_eq!(kind_for_wire_code(&WireCode::Number(code)), kind);
        }
    }

    #[test]
    fn kind_codes_agree_with_wire_table() {
        let kinds = [
            ErrorKind::PluginBug,
            ErrorKind::DaemonNotRunning,
            ErrorKind::InvalidArgument,
            ErrorKind::NotImplemented,
            ErrorKind::NotFound(Entity::Volume),
            ErrorKind::NotFound(Entity::Disk),
            ErrorKind::PluginNotFound,
            ErrorKind::Transport,
            ErrorKind::UnsupportedSearchKey,
            ErrorKind::UnsupportedInitiatorType,
        ];
        for kind in kinds {
            assert_eq!(kind_for_wire_code(&WireCode::Number(kind.code())), kind);
        }
    }

    #[test]
    fn text_wire_codes_accept_numbers_and_names() {
        assert_eq!(
            kind_for_wire_code(&WireCode::Text("202".to_string())),
            ErrorKind::NotFound(Entity::Job)
        );
        assert_eq!(
            kind_for_wire_code(&WireCode::Text("NOT_IMPLEMENTED".to_string())),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            kind_for_wire_code(&WireCode::Text("E_VENDOR_42".to_string())),
            ErrorKind::PluginError
        );
    }

    #[test]
    fn wire_error_keeps_code_and_message_verbatim() {
        let err = Error::from_wire(WireCode::Text("CMMVC5753E".to_string()), "object not found");
        assert_eq!(err.kind(), ErrorKind::PluginError);
        assert_eq!(err.code(), Some(&WireCode::Text("CMMVC5753E".to_string())));
        assert_eq!(err.message(), Some("object not found"));
        assert_eq!(
            err.to_string(),
            "PluginError: object not found (code: CMMVC5753E)"
        );
    }

    #[test]
    fn wire_code_deserializes_either_form() {
        let number: WireCode = serde_json::from_str("205").expect("number");
        let text: WireCode = serde_json::from_str("\"x\"").expect("text");
        assert_eq!(number, WireCode::Number(205));
        assert_eq!(text, WireCode::Text("x".to_string()));
    }
}
