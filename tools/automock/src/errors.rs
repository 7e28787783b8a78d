use crate::types::TargetError;
use thiserror::Error;

/// Failures raised by the mocking layer itself, as opposed to errors produced
/// by the mocked target.
#[derive(Debug, Error)]
pub enum AutomockError {
    #[error("requested broken call:\nwanted: {wanted}\nsaved:  {saved}")]
    BrokenCall { wanted: String, saved: String },
    #[error("mock is locked, but {0} wanted, there is no such instance and call indexes pair in memory")]
    Locked(String),
    #[error("missed call {wanted} in mock sequence [{recorded}]")]
    MissedCall { wanted: String, recorded: String },
    #[error("unknown call type for {0}")]
    UnknownCallType(String),
    #[error("unsupported attribute {method}: {detail}")]
    UnsupportedAttribute { method: String, detail: String },
    #[error("encoding failed for {call}: {source}")]
    Encoding {
        call: String,
        #[source]
        source: Box<AutomockError>,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("call {0} resolved asynchronously and must be awaited")]
    AwaitRequired(String),
    #[error("mock with path {0} already exists")]
    DuplicateMock(String),
    #[error("fixture error: {0}")]
    Fixture(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
}

/// Outcome of a failed proxied call.
#[derive(Debug, Error)]
pub enum CallError {
    /// The real target failed (live or replayed from a fixture).
    #[error("target raised {0}")]
    Raised(TargetError),
    #[error(transparent)]
    Automock(#[from] AutomockError),
}

impl CallError {
    pub fn raised(&self) -> Option<&TargetError> {
        match self {
            Self::Raised(error) => Some(error),
            Self::Automock(_) => None,
        }
    }

    pub fn automock(&self) -> Option<&AutomockError> {
        match self {
            Self::Raised(_) => None,
            Self::Automock(error) => Some(error),
        }
    }
}

impl From<TargetError> for CallError {
    fn from(value: TargetError) -> Self {
        Self::Raised(value)
    }
}
