//! Fixture files on disk, one per mocked target per test.

use crate::errors::AutomockError;
use crate::memory::Memory;
use crate::runtime::FileSystem;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct FixtureStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    /// `<root>/<test>/<owner>/<attr>`.
    pub fn path_for(&self, test: &str, owner: &str, attr: &str) -> Result<PathBuf, AutomockError> {
        let mut path = self.root.clone();
        for segment in [test, owner, attr] {
            check_segment(segment)?;
            path.push(segment);
        }
        Ok(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.fs.exists(path)
    }

    /// The stored memory, or an empty one when nothing was recorded yet.
    pub fn load(&self, path: &Path) -> Result<Memory, AutomockError> {
        if !self.fs.exists(path) {
            return Ok(Memory::new());
        }
        let text = self.fs.read_to_string(path)?;
        Memory::from_bytes(text.as_bytes())
            .map_err(|e| AutomockError::Fixture(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path, memory: &Memory) -> Result<(), AutomockError> {
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent)?;
        }
        let bytes = memory.to_bytes()?;
        let text =
            String::from_utf8(bytes).map_err(|e| AutomockError::Fixture(e.to_string()))?;
        self.fs.write_string(path, &text)
    }

    pub fn remove(&self, path: &Path) -> Result<(), AutomockError> {
        if self.fs.exists(path) {
            self.fs.remove_file(path)?;
        }
        Ok(())
    }
}

fn check_segment(segment: &str) -> Result<(), AutomockError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(AutomockError::InvalidConfig(format!(
            "fixture path segment {segment:?} must be a single plain name"
        ))),
    }
}
