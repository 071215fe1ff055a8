//! Image materialization.
//!
//! Turns an OCI image reference into a populated rootfs directory by
//! driving the external image tool:
//!
//! ```text
//! podman pull <image>
//!   └─► podman create --name isolator-temp-<slug> <image>
//!         └─► podman export ... -o <base>/<slug>.tar
//!               └─► unpack into <base>/<slug>/
//! ```
//!
//! Registry protocol, authentication, and layer composition all belong to
//! the external tool; this module only orchestrates it and extracts the
//! flattened result. The temporary container and the exported tarball are
//! removed on every exit path via drop guards.

use crate::constants::{IMAGE_TOOL, TEMP_CONTAINER_PREFIX};
use crate::error::{Error, Result};
use crate::extract;
use crate::storage::RootfsStore;
use std::fs::{self, DirBuilder, File};
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info, warn};

/// Derives the filesystem-safe slug for an image reference.
///
/// Every `/` and then every `:` is replaced with `_`. The mapping is
/// stable and deterministic; slug collisions between distinct references
/// are the caller's problem.
pub fn sanitize_name(image: &str) -> String {
    image.replace('/', "_").replace(':', "_")
}

/// Materializes rootfs directories from image references.
pub struct Materializer {
    store: RootfsStore,
}

impl Materializer {
    /// Creates a materializer writing into the given store.
    pub fn new(store: RootfsStore) -> Self {
        Self { store }
    }

    /// Pulls `image` and extracts its flattened filesystem into
    /// `<base>/<slug>`, returning the slug.
    ///
    /// An existing rootfs for the same slug is removed first, so repeated
    /// pulls yield exactly the image contents with no stale files.
    pub fn materialize(&self, image: &str) -> Result<String> {
        let slug = sanitize_name(image);
        self.store.ensure_base()?;

        info!(image, "pulling image");
        run_image_tool(&["pull", image]).map_err(|e| {
            e.into_error(|reason| Error::ImagePullFailed {
                reference: image.to_string(),
                reason,
            })
        })?;

        let temp_name = format!("{TEMP_CONTAINER_PREFIX}{slug}");
        debug!(container = %temp_name, "creating temporary container");
        run_image_tool(&["create", "--name", &temp_name, image]).map_err(|e| {
            e.into_error(|reason| Error::ImageCreateFailed {
                reference: image.to_string(),
                reason,
            })
        })?;
        let _container = TempContainer(temp_name.clone());

        let tar_path = self.store.base().join(format!("{slug}.tar"));
        let _tarball = TempFile(tar_path.clone());
        debug!(tar = %tar_path.display(), "exporting container filesystem");
        run_image_tool(&["export", &temp_name, "-o", &tar_path.to_string_lossy()]).map_err(
            |e| {
                e.into_error(|reason| Error::ImageExportFailed {
                    reference: image.to_string(),
                    reason,
                })
            },
        )?;

        let dest = self.store.rootfs_path(&slug);
        if dest.exists() {
            debug!(rootfs = %slug, "replacing existing rootfs");
            fs::remove_dir_all(&dest)?;
        }
        DirBuilder::new().recursive(true).mode(0o755).create(&dest)?;

        info!(rootfs = %slug, dest = %dest.display(), "extracting rootfs");
        let tarball = File::open(&tar_path)?;
        extract::unpack(tarball, &dest)?;

        info!(rootfs = %slug, "pull complete");
        Ok(slug)
    }
}

/// Failure modes of an external tool invocation.
enum ToolError {
    /// The binary could not be spawned at all (missing or not executable).
    Unavailable(String),
    /// The tool ran and reported failure; carries its stderr.
    Failed(String),
}

impl ToolError {
    /// Maps a tool-reported failure through `failed`; a spawn failure
    /// always becomes [`Error::ImageToolUnavailable`].
    fn into_error(self, failed: impl FnOnce(String) -> Error) -> Error {
        match self {
            Self::Unavailable(reason) => Error::ImageToolUnavailable {
                tool: IMAGE_TOOL.to_string(),
                reason,
            },
            Self::Failed(reason) => failed(reason),
        }
    }

    fn reason(&self) -> &str {
        match self {
            Self::Unavailable(reason) | Self::Failed(reason) => reason,
        }
    }
}

/// Runs the external image tool with the given arguments, returning its
/// stderr as the error payload when it reports failure.
fn run_image_tool(args: &[&str]) -> std::result::Result<(), ToolError> {
    let output = Command::new(IMAGE_TOOL)
        .args(args)
        .output()
        .map_err(|e| ToolError::Unavailable(e.to_string()))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Err(ToolError::Failed(format!(
                "{IMAGE_TOOL} {} exited with {}",
                args[0], output.status
            )))
        } else {
            Err(ToolError::Failed(stderr.to_string()))
        }
    }
}

/// Removes the temporary flattened container when dropped.
struct TempContainer(String);

impl Drop for TempContainer {
    fn drop(&mut self) {
        if let Err(e) = run_image_tool(&["rm", "-f", &self.0]) {
            warn!(container = %self.0, reason = %e.reason(), "failed to remove temporary container");
        }
    }
}

/// Removes the exported tarball when dropped.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.0.display(), error = %e, "failed to remove exported tarball");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_slashes_and_colons() {
        assert_eq!(sanitize_name("chainguard/wolfi-base"), "chainguard_wolfi-base");
        assert_eq!(sanitize_name("alpine:3.19"), "alpine_3.19");
        assert_eq!(
            sanitize_name("registry.io/library/nginx:1.25"),
            "registry.io_library_nginx_1.25"
        );
    }

    #[test]
    fn sanitize_is_stable() {
        let reference = "ghcr.io/foo/bar:latest";
        assert_eq!(sanitize_name(reference), sanitize_name(reference));
    }

    #[test]
    fn sanitized_names_are_filesystem_safe() {
        for reference in ["a/b/c:d", "plain", "host:5000/img:tag"] {
            let slug = sanitize_name(reference);
            assert!(!slug.contains('/'));
            assert!(!slug.contains(':'));
        }
    }
}
