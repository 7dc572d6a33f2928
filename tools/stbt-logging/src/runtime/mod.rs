use crate::errors::StbtError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_DEBUG_ROOT: &str = "stbt-debug";

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, StbtError>;
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StbtError>;
    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), StbtError>;
    /// Creates `path` and any missing parents. An existing directory is not an error.
    fn create_dir_all(&self, path: &Path) -> Result<(), StbtError>;
}

pub trait ErrorStream: Send + Sync {
    /// Writes one line. Never fails: there is nowhere left to report a broken error stream.
    fn write_line(&self, line: &str);
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, StbtError> {
        std::fs::read_to_string(path)
            .map_err(|e| StbtError::Io(format!("{}: {e}", path.display())))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StbtError> {
        std::fs::read(path).map_err(|e| StbtError::Io(format!("{}: {e}", path.display())))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), StbtError> {
        std::fs::write(path, contents)
            .map_err(|e| StbtError::Io(format!("{}: {e}", path.display())))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), StbtError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StbtError::Io(format!("{}: {e}", path.display())))
    }
}

pub struct ProductionErrorStream;

impl ErrorStream for ProductionErrorStream {
    fn write_line(&self, line: &str) {
        use std::io::Write;
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{line}");
    }
}

/// Collaborators an `ImageLogger` needs, bundled so tests can swap them.
#[derive(Clone)]
pub struct DebugRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub error_stream: Arc<dyn ErrorStream>,
    pub debug_root: PathBuf,
}

impl DebugRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            error_stream: Arc::new(ProductionErrorStream),
            debug_root: PathBuf::from(DEFAULT_DEBUG_ROOT),
        }
    }

    pub fn with_debug_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.debug_root = root.into();
        self
    }
}

impl Default for DebugRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    failing_dirs: Arc<Mutex<HashSet<PathBuf>>>,
    fail_next: Arc<Mutex<Option<StbtError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: StbtError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    /// Makes `create_dir_all` fail for `path` and everything below it, like a
    /// plain file squatting on that name.
    pub fn fail_create_dir(&self, path: impl Into<PathBuf>) {
        self.failing_dirs
            .lock()
            .expect("failing dirs lock")
            .insert(path.into());
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().expect("dirs lock").clone()
    }

    pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths = self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    fn maybe_fail(&self) -> Result<(), StbtError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, StbtError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|e| StbtError::Io(e.to_string()))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StbtError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| StbtError::Io(format!("missing file {}", path.display())))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), StbtError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), StbtError> {
        self.maybe_fail()?;
        if self
            .failing_dirs
            .lock()
            .expect("failing dirs lock")
            .iter()
            .any(|blocked| path.starts_with(blocked))
        {
            return Err(StbtError::Io(format!(
                "{}: Not a directory",
                path.display()
            )));
        }
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeErrorStream {
    lines: Arc<Mutex<Vec<String>>>,
}

impl FakeErrorStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lines lock").clone()
    }
}

impl ErrorStream for FakeErrorStream {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .expect("lines lock")
            .push(line.to_string());
    }
}
