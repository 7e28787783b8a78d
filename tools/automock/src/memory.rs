//! The call memory: the only channel between a recording run and its replays.

use crate::errors::AutomockError;
use crate::replay::call::Call;
use crate::types::CallKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const FIXTURE_VERSION: u32 = 1;

/// Call records keyed by `(instance_index, call_index)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Memory {
    calls: BTreeMap<CallKey, Call>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FixtureDocument {
    version: u32,
    calls: Vec<Call>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &CallKey) -> bool {
        self.calls.contains_key(key)
    }

    pub fn get(&self, key: &CallKey) -> Option<&Call> {
        self.calls.get(key)
    }

    /// Stores `call` under its own key, replacing any previous record.
    pub fn insert(&mut self, call: Call) -> Option<Call> {
        self.calls.insert(call.key(), call)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CallKey> {
        self.calls.keys()
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Call> {
        self.calls.values()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AutomockError> {
        let document = FixtureDocument {
            version: FIXTURE_VERSION,
            calls: self.calls.values().cloned().collect(),
        };
        serde_json::to_vec_pretty(&document).map_err(|e| AutomockError::Fixture(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AutomockError> {
        let document: FixtureDocument =
            serde_json::from_slice(bytes).map_err(|e| AutomockError::Fixture(e.to_string()))?;
        if document.version != FIXTURE_VERSION {
            return Err(AutomockError::Fixture(format!(
                "unsupported fixture version {} (expected {FIXTURE_VERSION})",
                document.version
            )));
        }
        let mut memory = Self::new();
        for call in document.calls {
            let key = call.key();
            if memory.insert(call).is_some() {
                return Err(AutomockError::Fixture(format!("duplicate call key {key}")));
            }
        }
        Ok(memory)
    }
}

/// A `Memory` shared by reference between every proxy built against it.
///
/// Also owns an instance counter, used when instance indices are scoped to
/// the memory rather than to a single `Automock` handle.
#[derive(Debug, Clone, Default)]
pub struct SharedMemory {
    inner: Arc<Mutex<Memory>>,
    instances: Arc<AtomicU64>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_memory(memory: Memory) -> Self {
        Self {
            inner: Arc::new(Mutex::new(memory)),
            instances: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Memory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_key(&self, key: &CallKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn get(&self, key: &CallKey) -> Option<Call> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> Memory {
        self.lock().clone()
    }

    pub(crate) fn instance_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.instances)
    }

    pub fn same_memory(&self, other: &SharedMemory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

pub(crate) fn next_index(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed)
}
