use crate::errors::{AutomockError, CallError};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::IntoFuture;

pub type CallResult = Result<Value, CallError>;

/// What a proxied call hands back to its caller.
///
/// Calls recorded as `sync` reply `Ready`; calls recorded as `async` reply
/// `Pending` and must be awaited. Every reply can be awaited, so call sites
/// written for an asynchronous target keep working against either shape.
pub enum Reply {
    Ready(CallResult),
    Pending {
        method: String,
        future: BoxFuture<'static, CallResult>,
    },
}

impl Reply {
    pub(crate) fn failed(error: impl Into<CallError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// The result of a ready reply. A pending reply fails with
    /// `AwaitRequired` and its resolution is dropped unrecorded.
    pub fn into_sync(self) -> CallResult {
        match self {
            Self::Ready(result) => result,
            Self::Pending { method, .. } => Err(AutomockError::AwaitRequired(method).into()),
        }
    }
}

impl IntoFuture for Reply {
    type Output = CallResult;
    type IntoFuture = BoxFuture<'static, CallResult>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(result) => futures::future::ready(result).boxed(),
            Self::Pending { future, .. } => future,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending { method, .. } => f
                .debug_struct("Pending")
                .field("method", method)
                .finish_non_exhaustive(),
        }
    }
}
