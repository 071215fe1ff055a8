//! Rootfs registry.
//!
//! Materialized root filesystems live as plain directories under a single
//! base path, one per slug:
//!
//! ```text
//! /var/lib/isolator/rootfs/
//! ├── chainguard_wolfi-base/
//! ├── alpine_3.19/
//! └── alpine_3.19-built/
//! ```
//!
//! The store only manages the directories themselves. Mounts performed at
//! run time are private to the container's mount namespace and never touch
//! the on-disk trees.

use crate::constants::ROOTFS_BASE_DIR;
use crate::error::{Error, Result};
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Registry of materialized root filesystems under a base directory.
///
/// Cloning is cheap; clones refer to the same base path. No locking is
/// performed, so concurrent operations against the same slug race.
#[derive(Debug, Clone)]
pub struct RootfsStore {
    base: PathBuf,
}

impl RootfsStore {
    /// Creates a store over the default base directory.
    pub fn new() -> Self {
        Self::with_base(PathBuf::from(ROOTFS_BASE_DIR))
    }

    /// Creates a store over a custom base directory.
    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    /// Returns the base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Creates the base directory (mode 0755) if it does not exist yet.
    pub fn ensure_base(&self) -> Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&self.base)?;
        debug!(base = %self.base.display(), "rootfs base directory ready");
        Ok(())
    }

    /// Returns the on-disk path of a rootfs slug.
    pub fn rootfs_path(&self, slug: &str) -> PathBuf {
        self.base.join(slug)
    }

    /// Returns whether a rootfs directory exists for the slug.
    pub fn contains(&self, slug: &str) -> bool {
        self.rootfs_path(slug).is_dir()
    }

    /// Lists the names of all materialized rootfs directories.
    ///
    /// Non-directory entries under the base (stray tarballs, lockfiles)
    /// are ignored. A missing base directory yields an empty list.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Recursively deletes the rootfs directory for `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.rootfs_path(name);
        if !path.is_dir() {
            return Err(Error::RootfsNotFound(name.to_string()));
        }
        fs::remove_dir_all(&path)?;
        info!(rootfs = name, "removed rootfs");
        Ok(())
    }
}

impl Default for RootfsStore {
    fn default() -> Self {
        Self::new()
    }
}
