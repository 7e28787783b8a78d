//! Per-test bookkeeping: which targets are mocked, where their fixtures live
//! and whether they get written back.

use crate::config::AutomockConfig;
use crate::errors::{AutomockError, CallError};
use crate::logging::emit;
use crate::memory::SharedMemory;
use crate::replay::proxy::{automock_fn, Automock, AutomockOptions, Proxy};
use crate::runtime::FileSystem;
use crate::storage::FixtureStore;
use crate::target::{Factory, FunctionTarget};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

struct Registered {
    path: PathBuf,
    memory: SharedMemory,
}

pub struct MockSession {
    config: AutomockConfig,
    test_name: String,
    store: FixtureStore,
    options: AutomockOptions,
    mocks: Vec<Registered>,
}

impl MockSession {
    pub fn new(
        config: AutomockConfig,
        test_name: impl Into<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let store = FixtureStore::new(config.storage.root.clone(), fs);
        let options = config.options();
        Self {
            config,
            test_name: test_name.into(),
            store,
            options,
            mocks: Vec::new(),
        }
    }

    /// Replaces the proxy options derived from the configuration. The lock
    /// flag always follows `mode.unlocked`.
    pub fn with_options(mut self, options: AutomockOptions) -> Self {
        self.options = AutomockOptions {
            locked: !self.config.mode.unlocked,
            ..options
        };
        self
    }

    pub fn is_locked(&self) -> bool {
        !self.config.mode.unlocked
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn mock(
        &mut self,
        owner: &str,
        attr: &str,
        factory: impl Factory + 'static,
    ) -> Result<Automock, AutomockError> {
        let memory = self.register(owner, attr)?;
        Ok(Automock::new(factory, memory, self.options.clone()))
    }

    pub fn mock_fn(
        &mut self,
        owner: &str,
        attr: &str,
        function: FunctionTarget,
    ) -> Result<Proxy, CallError> {
        let memory = self.register(owner, attr)?;
        automock_fn(function, memory, self.options.clone())
    }

    pub fn memory(&self, owner: &str, attr: &str) -> Option<SharedMemory> {
        let path = self.store.path_for(&self.test_name, owner, attr).ok()?;
        self.mocks
            .iter()
            .find(|registered| registered.path == path)
            .map(|registered| registered.memory.clone())
    }

    fn register(&mut self, owner: &str, attr: &str) -> Result<SharedMemory, AutomockError> {
        let path = self.store.path_for(&self.test_name, owner, attr)?;
        if self.mocks.iter().any(|registered| registered.path == path) {
            return Err(AutomockError::DuplicateMock(format!("{owner}.{attr}")));
        }
        let memory = if self.config.mode.remove {
            SharedMemory::new()
        } else {
            SharedMemory::from_memory(self.store.load(&path)?)
        };
        emit(
            self.options.logger.as_ref(),
            "info",
            "automock.session.register",
            json!({
                "test": self.test_name,
                "path": path.display().to_string(),
                "records": memory.len(),
                "locked": self.is_locked(),
            }),
        );
        self.mocks.push(Registered {
            path,
            memory: memory.clone(),
        });
        Ok(memory)
    }

    /// Writes every memory back when recording; a locked session writes
    /// nothing. Returns the written paths.
    pub fn finish(self) -> Result<Vec<PathBuf>, AutomockError> {
        if self.is_locked() {
            return Ok(Vec::new());
        }
        let mut written = Vec::with_capacity(self.mocks.len());
        for registered in &self.mocks {
            self.store.save(&registered.path, &registered.memory.snapshot())?;
            emit(
                self.options.logger.as_ref(),
                "info",
                "automock.session.save",
                json!({
                    "path": registered.path.display().to_string(),
                    "records": registered.memory.len(),
                }),
            );
            written.push(registered.path.clone());
        }
        Ok(written)
    }
}
