//! Purpose: Model asynchronous storage jobs and the dual-result contract.
//! Exports: `JobId`, `Job`, `JobStatus`, `JobReport`, `JobState`, `Async`, `JobResult`.
//! Role: Typed interpretation of `job_status` replies and of job-or-result returns.
//! Invariants: `IN_PROGRESS -> COMPLETE | ERROR`; both terminal states are final.
//! Invariants: An `Async` is exactly one of a job handle or an immediate result.
#![allow(clippy::result_large_err)]

use super::types::WireObject;
use crate::core::error::{Error, ErrorKind, WireCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a running job whose completion yields a `T`.
#[derive(Debug, Eq, PartialEq)]
pub struct Job<T> {
    id: JobId,
    method: &'static str,
    _result: PhantomData<fn() -> T>,
}

impl<T> Job<T> {
    pub(crate) fn new(id: JobId, method: &'static str) -> Self {
        Self {
            id,
            method,
            _result: PhantomData,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Operation that started this job.
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone(), self.method)
    }
}

/// Outcome of an operation that may run asynchronously.
#[derive(Debug)]
pub enum Async<T> {
    Job(Job<T>),
    Done(T),
}

impl<T> Async<T> {
    pub fn job(&self) -> Option<&Job<T>> {
        match self {
            Async::Job(job) => Some(job),
            Async::Done(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Async::Done(_))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    InProgress,
    Complete,
    Error,
}

impl JobStatus {
    pub fn code(self) -> i64 {
        match self {
            JobStatus::InProgress => 1,
            JobStatus::Complete => 2,
            JobStatus::Error => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(JobStatus::InProgress),
            2 => Some(JobStatus::Complete),
            4 => Some(JobStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != JobStatus::InProgress
    }
}

/// Raw `(status, percent, item)` triple as reported by `job_status`.
#[derive(Clone, Debug, PartialEq)]
pub struct JobReport {
    pub status: JobStatus,
    pub percent: u8,
    pub item: Option<Value>,
}

impl JobReport {
    /// Interpret a shape-checked `[status, percent, item]` reply.
    pub(crate) fn from_reply(method: &'static str, reply: Value) -> Result<Self, Error> {
        let bug = |message: String| {
            Error::new(ErrorKind::PluginBug)
                .with_method(method)
                .with_message(message)
        };
        let Value::Array(mut triple) = reply else {
            return Err(bug("job status reply is not a triple".to_string()));
        };
        if triple.len() != 3 {
            return Err(bug("job status reply is not a triple".to_string()));
        }
        let item = triple.pop().filter(|item| !item.is_null());
        let percent = triple.pop().and_then(|percent| percent.as_i64()).unwrap_or(-1);
        let code = triple.pop().and_then(|status| status.as_i64()).unwrap_or(-1);
        let status =
            JobStatus::from_code(code).ok_or_else(|| bug(format!("unknown job status {code}")))?;
        let percent = u8::try_from(percent)
            .ok()
            .filter(|percent| *percent <= 100)
            .ok_or_else(|| bug(format!("job percent {percent} outside 0..=100")))?;
        if status == JobStatus::InProgress && item.is_some() {
            return Err(bug("in-progress job carries an item".to_string()));
        }
        Ok(Self {
            status,
            percent,
            item,
        })
    }
}

#[derive(Debug)]
pub enum JobState<T> {
    InProgress { percent: u8 },
    Complete(T),
    Failed(Error),
}

impl<T> JobState<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::InProgress { .. })
    }
}

/// Result type a completed job may carry.
pub trait JobResult: Sized {
    fn from_item(method: &'static str, item: Option<Value>) -> Result<Self, Error>;
}

impl JobResult for () {
    fn from_item(method: &'static str, item: Option<Value>) -> Result<Self, Error> {
        match item {
            None => Ok(()),
            Some(_) => Err(Error::new(ErrorKind::PluginBug)
                .with_method(method)
                .with_message("completed job carries an item for an operation without a result")),
        }
    }
}

impl<T: WireObject> JobResult for T {
    fn from_item(method: &'static str, item: Option<Value>) -> Result<Self, Error> {
        match item {
            Some(value) if T::KIND.matches(&value) => T::from_wire(method, value),
            Some(_) => Err(Error::new(ErrorKind::PluginBug)
                .with_method(method)
                .with_message(format!("completed job item is not a {}", T::CLASS))),
            None => Err(Error::new(ErrorKind::PluginBug)
                .with_method(method)
                .with_message(format!("completed job carries no {}", T::CLASS))),
        }
    }
}

#[derive(Deserialize)]
struct FailurePayload {
    code: WireCode,
    #[serde(default)]
    message: String,
}

impl<T: JobResult> JobState<T> {
    pub(crate) fn from_report(method: &'static str, report: JobReport) -> Result<Self, Error> {
        match report.status {
            JobStatus::InProgress => Ok(JobState::InProgress {
                percent: report.percent,
            }),
            JobStatus::Complete => T::from_item(method, report.item).map(JobState::Complete),
            JobStatus::Error => Ok(JobState::Failed(failure_from_item(method, report.item))),
        }
    }
}

fn failure_from_item(method: &'static str, item: Option<Value>) -> Error {
    match item {
        Some(Value::String(message)) => Error::new(ErrorKind::PluginError)
            .with_method(method)
            .with_message(message),
        Some(value) => match serde_json::from_value::<FailurePayload>(value) {
            Ok(payload) => Error::from_wire(payload.code, payload.message).with_method(method),
            Err(_) => Error::new(ErrorKind::PluginError)
                .with_method(method)
                .with_message("job failed with an unrecognised error payload"),
        },
        None => Error::new(ErrorKind::PluginError)
            .with_method(method)
            .with_message("job failed"),
    }
}
