//! Purpose: Declare and check the shapes values may take at the IPC boundary.
//! Exports: `ValueKind`, `ReturnShape`, `ArgShape`, `check_return`, `check_arg`.
//! Role: Explicit shape check applied to every decoded result and every bound argument.
//! Invariants: A return mismatch is `PluginBug`; an argument mismatch is `InvalidArgument`.
//! Invariants: Dual-result values carry exactly one of job id and item, never both or neither.
use crate::core::error::{Error, ErrorKind};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Int,
    Bool,
    Str,
    /// Any value, including null.
    Any,
    /// JSON object whose `class` field names the entity.
    Entity(&'static str),
}

impl ValueKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ValueKind::Int => value.is_i64() || value.is_u64(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Str => value.is_string(),
            ValueKind::Any => true,
            ValueKind::Entity(class) => value
                .as_object()
                .and_then(|object| object.get("class"))
                .and_then(Value::as_str)
                == Some(class),
        }
    }

    fn describe(self) -> String {
        match self {
            ValueKind::Int => "int".to_string(),
            ValueKind::Bool => "bool".to_string(),
            ValueKind::Str => "string".to_string(),
            ValueKind::Any => "any".to_string(),
            ValueKind::Entity(class) => class.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReturnShape {
    Void,
    Scalar(ValueKind),
    List(ValueKind),
    Tuple(&'static [ValueKind]),
    /// Job id while running, null once already complete.
    JobOrVoid,
    /// `[job_id, item]` pair with exactly one side set.
    JobOr(ValueKind),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArgShape {
    One(ValueKind),
    Many(ValueKind),
    Maybe(ValueKind),
    MaybeMany(ValueKind),
}

impl ArgShape {
    pub fn is_optional(self) -> bool {
        matches!(self, ArgShape::Maybe(_) | ArgShape::MaybeMany(_))
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ArgShape::One(kind) => !value.is_null() && kind.matches(value),
            ArgShape::Many(kind) => is_list_of(value, kind),
            ArgShape::Maybe(kind) => value.is_null() || kind.matches(value),
            ArgShape::MaybeMany(kind) => value.is_null() || is_list_of(value, kind),
        }
    }
}

fn is_list_of(value: &Value, kind: ValueKind) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(|item| kind.matches(item)))
}

pub fn check_arg(method: &'static str, name: &str, shape: ArgShape, value: &Value) -> Result<(), Error> {
    if shape.matches(value) {
        return Ok(());
    }
    Err(Error::new(ErrorKind::InvalidArgument)
        .with_method(method)
        .with_message(format!("argument '{name}' does not match {shape:?}")))
}

pub fn check_return(method: &'static str, shape: ReturnShape, value: &Value) -> Result<(), Error> {
    let problem = match shape {
        ReturnShape::Void => (!value.is_null()).then(|| "expected no result".to_string()),
        ReturnShape::Scalar(kind) => (value.is_null() || value.is_array() || !kind.matches(value))
            .then(|| format!("expected a single {}", kind.describe())),
        ReturnShape::List(kind) => match value.as_array() {
            None => Some(format!("expected a list of {}", kind.describe())),
            Some(items) => items
                .iter()
                .position(|item| !kind.matches(item))
                .map(|index| format!("list element {index} is not a {}", kind.describe())),
        },
        ReturnShape::Tuple(kinds) => match value.as_array() {
            Some(items) if items.len() == kinds.len() => kinds
                .iter()
                .zip(items)
                .position(|(kind, item)| !kind.matches(item))
                .map(|index| format!("tuple element {index} has the wrong type")),
            _ => Some(format!("expected a tuple of {} values", kinds.len())),
        },
        ReturnShape::JobOrVoid => (!value.is_null() && !value.is_string())
            .then(|| "expected a job id or no result".to_string()),
        ReturnShape::JobOr(kind) => dual_result_problem(kind, value),
    };
    match problem {
        None => Ok(()),
        Some(problem) => {
            tracing::warn!(method, %problem, "plugin response violates its declared shape");
            Err(Error::new(ErrorKind::PluginBug)
                .with_method(method)
                .with_message(problem))
        }
    }
}

fn dual_result_problem(kind: ValueKind, value: &Value) -> Option<String> {
    let Some(pair) = value.as_array().filter(|pair| pair.len() == 2) else {
        return Some("expected a [job_id, item] pair".to_string());
    };
    match (&pair[0], &pair[1]) {
        (Value::Null, Value::Null) => Some("neither job id nor item is set".to_string()),
        (Value::String(_), Value::Null) => None,
        (Value::Null, item) if kind.matches(item) => None,
        (Value::Null, _) => Some(format!("item is not a {}", kind.describe())),
        (Value::String(_), _) => Some("both job id and item are set".to_string()),
        _ => Some("job id is not a string".to_string()),
    }
}
