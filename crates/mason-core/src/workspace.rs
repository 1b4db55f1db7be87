use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Root directory for one run.
///
/// An ephemeral workspace is a fresh temporary directory removed when the
/// guard drops, on success and on every error path. A workspace opened on a
/// caller-supplied directory is never removed.
pub struct Workspace {
    root: PathBuf,
    temp: Option<TempDir>,
}

impl Workspace {
    pub fn ephemeral() -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("mason").tempdir()?;
        debug!("created temp workspace {}", temp.path().display());
        Ok(Self {
            root: temp.path().to_path_buf(),
            temp: Some(temp),
        })
    }

    pub fn existing(path: impl Into<PathBuf>) -> io::Result<Self> {
        let root = path.into();
        fs::create_dir_all(&root)?;
        debug!("using workspace {}", root.display());
        Ok(Self { root, temp: None })
    }

    /// `existing(dir)` when a directory is given, else `ephemeral()`.
    pub fn open(dir: Option<&Path>) -> io::Result<Self> {
        match dir {
            Some(dir) => Self::existing(dir),
            None => Self::ephemeral(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_ephemeral(&self) -> bool {
        self.temp.is_some()
    }
}
