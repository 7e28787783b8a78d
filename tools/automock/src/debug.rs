//! Hooks run just before the proxy reports a divergence from its fixture.

use crate::codec::Codec;
use crate::logging::{JsonlLogger, LogEvent};
use crate::memory::Memory;
use crate::replay::call::Call;
use serde_json::{json, Value};
use std::sync::Arc;

/// Receives the whole memory, the wanted record and, when one exists at the
/// same key, the saved record. Never called on a successful resolution.
pub type DebugHook = Arc<dyn Fn(&Memory, &Call, Option<&Call>) + Send + Sync>;

/// A hook that writes a `debug.divergence` event to `logger`.
pub fn jsonl_hook(logger: JsonlLogger, codec: Arc<dyn Codec>) -> DebugHook {
    Arc::new(move |memory: &Memory, wanted: &Call, saved: Option<&Call>| {
        let payload = json!({
            "memory_len": memory.len(),
            "wanted": describe(wanted, codec.as_ref()),
            "saved": saved.map(|call| describe(call, codec.as_ref())),
        });
        let _ = logger.append(&LogEvent {
            level: "debug",
            event_type: "debug.divergence",
            payload,
        });
    })
}

fn describe(call: &Call, codec: &dyn Codec) -> Value {
    json!({
        "key": call.key().to_string(),
        "method": call.method,
        "request": call.describe(codec),
        "request_sha256": call.request_digest(),
    })
}
