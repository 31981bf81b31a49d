//! Purpose: Own one connected plugin socket and run one RPC round trip at a time.
//! Exports: `Transport`, `connect_socket`.
//! Role: Serialize `{method, args}`, write one frame, block for one response frame, decode it.
//! Invariants: Strict request/response alternation; `call` takes `&mut self` so nothing overlaps.
//! Invariants: Malformed envelopes and socket failures are `Transport`; wire errors keep code+message.
//! Invariants: After any `Transport` failure the stream is out of step and every later call fails.
use crate::core::error::{Error, ErrorKind, WireCode};
use crate::core::frame::{read_frame, write_frame};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Serialize)]
struct Request<'a> {
    method: &'a str,
    args: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct WireError {
    code: WireCode,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

pub fn connect_socket(path: &Path) -> Result<UnixStream, Error> {
    UnixStream::connect(path).map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to connect to plugin socket")
            .with_path(path)
            .with_source(err)
    })
}

#[derive(Debug)]
pub struct Transport {
    stream: UnixStream,
    path: PathBuf,
    broken: bool,
}

impl Transport {
    /// Connect to `path`; `timeout` of `None` blocks without a deadline.
    pub fn connect(path: &Path, timeout: Option<Duration>) -> Result<Self, Error> {
        let stream = connect_socket(path)?;
        let transport = Self::from_stream(stream, path);
        transport.set_timeout(timeout)?;
        debug!(path = %path.display(), ?timeout, "plugin socket connected");
        Ok(transport)
    }

    pub fn from_stream(stream: UnixStream, path: impl Into<PathBuf>) -> Self {
        Self {
            stream,
            path: path.into(),
            broken: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once a round trip has failed mid-stream; a late reply may still be queued.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Read and write deadline per frame; `None` or zero blocks indefinitely.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let timeout = timeout.filter(|duration| !duration.is_zero());
        self.stream
            .set_read_timeout(timeout)
            .and_then(|()| self.stream.set_write_timeout(timeout))
            .map_err(|err| {
                Error::new(ErrorKind::Transport)
                    .with_message("failed to set socket timeout")
                    .with_path(&self.path)
                    .with_source(err)
            })
    }

    pub fn call(&mut self, method: &'static str, args: &Map<String, Value>) -> Result<Value, Error> {
        if self.broken {
            return Err(Error::new(ErrorKind::Transport)
                .with_method(method)
                .with_path(&self.path)
                .with_message("session unusable after an earlier transport failure"));
        }
        let started = Instant::now();
        let payload = serde_json::to_vec(&Request { method, args }).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_method(method)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        write_frame(&mut self.stream, &payload)
            .and_then(|()| read_frame(&mut self.stream))
            .and_then(|frame| decode_response(&frame))
            .map_err(|err| {
                if err.kind() == ErrorKind::Transport {
                    self.broken = true;
                    debug!(method, path = %self.path.display(), "transport marked broken");
                }
                err.with_method(method).with_path(&self.path)
            })
            .inspect(|_| {
                debug!(method, elapsed_ms = started.elapsed().as_millis() as u64, "rpc complete");
            })
    }
}

fn decode_response(frame: &[u8]) -> Result<Value, Error> {
    let value: Value = serde_json::from_slice(frame).map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("invalid response json")
            .with_source(err)
    })?;
    let Value::Object(mut envelope) = value else {
        return Err(Error::new(ErrorKind::Transport).with_message("response is not an object"));
    };
    match (envelope.remove("result"), envelope.remove("error")) {
        (Some(result), None) => Ok(result),
        (None, Some(error)) => Err(decode_wire_error(error)),
        (Some(_), Some(_)) => Err(Error::new(ErrorKind::Transport)
            .with_message("response carries both result and error")),
        (None, None) => Err(Error::new(ErrorKind::Transport)
            .with_message("response carries neither result nor error")),
    }
}

fn decode_wire_error(error: Value) -> Error {
    match serde_json::from_value::<WireError>(error) {
        Ok(wire) => {
            if let Some(data) = &wire.data {
                debug!(code = %wire.code, %data, "plugin error data");
            }
            Error::from_wire(wire.code, wire.message)
        }
        Err(err) => Error::new(ErrorKind::Transport)
            .with_message("malformed error envelope")
            .with_source(err),
    }
}
