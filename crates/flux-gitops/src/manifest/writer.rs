//! Filesystem writer rooted at the local working copy.

use std::path::{Path, PathBuf};

use crate::error::ManifestError;

/// Writes files below a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestWriter {
    dir: PathBuf,
}

impl ManifestWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of this writer.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns true when a repository-relative path exists below the root.
    pub fn exists(&self, relative: &str) -> bool {
        self.dir.join(relative).exists()
    }

    /// Returns a writer scoped to `sub`, creating the directory.
    pub fn with_dir(&self, sub: &str) -> Result<Self, ManifestError> {
        let dir = self.dir.join(sub);
        std::fs::create_dir_all(&dir).map_err(|e| ManifestError::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// Writes `content` to `name` below the root, replacing any existing file.
    pub fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf, ManifestError> {
        let path = self.dir.join(name);
        std::fs::write(&path, content).map_err(|e| ManifestError::WriteFile {
            description: name.to_string(),
            path: self.dir.clone(),
            source: e,
        })?;
        tracing::trace!(path = %path.display(), "wrote manifest");
        Ok(path)
    }
}
