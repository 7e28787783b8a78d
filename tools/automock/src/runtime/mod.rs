use crate::errors::AutomockError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, AutomockError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), AutomockError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), AutomockError>;
    fn remove_file(&self, path: &Path) -> Result<(), AutomockError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), AutomockError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, AutomockError> {
        std::fs::read_to_string(path)
            .map_err(|e| AutomockError::Io(format!("{}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), AutomockError> {
        std::fs::write(path, contents)
            .map_err(|e| AutomockError::Io(format!("{}: {e}", path.display())))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), AutomockError> {
        std::fs::create_dir_all(path)
            .map_err(|e| AutomockError::Io(format!("{}: {e}", path.display())))
    }

    fn remove_file(&self, path: &Path) -> Result<(), AutomockError> {
        std::fs::remove_file(path)
            .map_err(|e| AutomockError::Io(format!("{}: {e}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), AutomockError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| AutomockError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<AutomockError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        locked(&fs.files).insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: AutomockError) {
        *locked(&self.fail_next) = Some(error);
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        locked(&self.files).get(path).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        locked(&self.dirs).clone()
    }

    fn maybe_fail(&self) -> Result<(), AutomockError> {
        if let Some(err) = locked(&self.fail_next).take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, AutomockError> {
        self.maybe_fail()?;
        self.file(path)
            .ok_or_else(|| AutomockError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), AutomockError> {
        self.maybe_fail()?;
        locked(&self.files).insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), AutomockError> {
        self.maybe_fail()?;
        locked(&self.dirs).push(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), AutomockError> {
        self.maybe_fail()?;
        locked(&self.files).remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        locked(&self.files).contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        locked(&self.writes).clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), AutomockError> {
        locked(&self.writes).push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FakeFileSystem, FileSystem};
    use crate::errors::AutomockError;
    use std::path::Path;

    #[test]
    fn fake_file_system_fails_once_when_armed() {
        let fs = FakeFileSystem::with_file("a.json", "{}");
        fs.set_fail_next(AutomockError::Io("disk full".to_string()));
        assert!(fs.read_to_string(Path::new("a.json")).is_err());
        assert_eq!(fs.read_to_string(Path::new("a.json")).expect("read"), "{}");
    }
}
