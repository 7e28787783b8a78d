use crate::errors::AutomockError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Method name used for the construction record of every instance.
pub const INIT_METHOD: &str = "__init__";
/// Method name used when the proxy itself is invoked.
pub const CALL_METHOD: &str = "__call__";

/// Positional and keyword arguments of one call.
///
/// Keyword arguments live in a sorted map so that argument-equal calls
/// always encode to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            args: values.into_iter().map(Into::into).collect(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// `[args, kwargs]`, the value handed to the codec for `request` bytes.
    pub(crate) fn to_request_value(&self) -> Value {
        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        Value::Array(vec![Value::Array(self.args.clone()), Value::Object(kwargs)])
    }

    pub(crate) fn from_request_value(value: Value) -> Result<Self, AutomockError> {
        let Value::Array(mut parts) = value else {
            return Err(AutomockError::Codec(
                "request is not an [args, kwargs] pair".to_string(),
            ));
        };
        if parts.len() != 2 {
            return Err(AutomockError::Codec(format!(
                "request has {} parts, expected 2",
                parts.len()
            )));
        }
        let kwargs = parts.pop().unwrap_or(Value::Null);
        let args = parts.pop().unwrap_or(Value::Null);
        let Value::Array(args) = args else {
            return Err(AutomockError::Codec("request args are not a list".to_string()));
        };
        let Value::Object(kwargs) = kwargs else {
            return Err(AutomockError::Codec(
                "request kwargs are not a mapping".to_string(),
            ));
        };
        Ok(Self {
            args,
            kwargs: kwargs.into_iter().collect(),
        })
    }
}

/// An error raised by the real target.
///
/// Stored as a type tag plus constructor arguments, which is all that is
/// needed to rebuild an equal error after a fixture round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}({})", render_args(.args))]
pub struct TargetError {
    pub kind: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl TargetError {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// How a call was resolved when it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallType {
    Sync,
    Async,
    /// Any tag read back from a fixture that is neither `sync` nor `async`.
    Unknown(String),
}

impl CallType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Unknown(tag) => tag.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "sync" => Self::Sync,
            "async" => Self::Async,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CallType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CallType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

/// `(instance_index, call_index)`; the construction record has no call index
/// and orders before every call of its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallKey {
    pub instance_index: u64,
    pub call_index: Option<u64>,
}

impl CallKey {
    pub fn init(instance_index: u64) -> Self {
        Self {
            instance_index,
            call_index: None,
        }
    }

    pub fn call(instance_index: u64, call_index: u64) -> Self {
        Self {
            instance_index,
            call_index: Some(call_index),
        }
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call_index {
            Some(index) => write!(f, "({}, {index})", self.instance_index),
            None => write!(f, "({}, {INIT_METHOD})", self.instance_index),
        }
    }
}

/// Which counter hands out instance indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterScope {
    /// Every `Automock` handle numbers its instances from 0.
    #[default]
    PerAutomock,
    /// All handles over one `SharedMemory` share a single numbering.
    PerMemory,
}

impl CounterScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerAutomock => "per_automock",
            Self::PerMemory => "per_memory",
        }
    }
}
