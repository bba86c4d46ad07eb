use crate::error::{Error, Result};
use crate::job::JobId;

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

/// A file produced or consumed by a stage, owned by one workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub local_path: PathBuf,
    pub byte_size: u64,
}

impl Artifact {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let local_path = path.into();
        let byte_size = fs::metadata(&local_path)?.len();
        Ok(Self { local_path, byte_size })
    }

    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_stem(&self) -> String {
        self.local_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// Job-exclusive directory tree. Dropping it removes the tree.
#[derive(Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub frames_in: PathBuf,
    pub frames_out: PathBuf,
    /// Final and intermediate encodes, kept apart from the fetched input.
    pub output: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn remove(&mut self) -> Result<()> {
        self.released = true;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn release(mut self) -> Result<()> {
        let result = self.remove();
        tracing::debug!(root = %self.root.display(), "workspace released");
        result
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.remove() {
                tracing::warn!(root = %self.root.display(), error = %e, "failed to remove workspace");
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    work_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self { work_root: work_root.into() }
    }

    pub fn root_for(&self, job_id: &JobId) -> PathBuf {
        self.work_root.join(format!("job-{}", job_id))
    }

    /// Creates a fresh tree for `job_id`, wiping whatever a previous run of
    /// the same id left behind.
    pub fn acquire(&self, job_id: &JobId) -> Result<Workspace> {
        let root = self.root_for(job_id);
        match fs::remove_dir_all(&root) {
            Ok(()) => tracing::warn!(root = %root.display(), "removed stale workspace"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let workspace = Workspace {
            frames_in: root.join("frames_in"),
            frames_out: root.join("frames_out"),
            output: root.join("output"),
            root,
            released: false,
        };
        fs::create_dir_all(&workspace.frames_in)?;
        fs::create_dir_all(&workspace.frames_out)?;
        fs::create_dir_all(&workspace.output)?;
        tracing::debug!(root = %workspace.root.display(), "workspace acquired");
        Ok(workspace)
    }
}
