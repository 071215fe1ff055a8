//! Declarative build recipes.
//!
//! A recipe file (`Isofile`) describes a derived rootfs: a base image plus
//! an ordered list of commands to run inside it. The file body is enclosed
//! in literal `[` and `]` delimiters; the inner text is a YAML document
//! with the fields of [`Recipe`]. Unknown top-level keys are rejected to
//! catch typos.
//!
//! ```text
//! [
//! from: alpine:3.19
//! commands:
//!   - /sbin/apk add --no-cache curl
//! ]
//! ```
//!
//! Building materializes the base image, copies its rootfs to
//! `<slug>-built` on the host (the base is never mutated), and runs each
//! command in the derived rootfs through the regular container launcher.
//! A failing step aborts the build and leaves the partial derived rootfs
//! on disk for inspection.

use crate::constants::{BUILT_ROOTFS_SUFFIX, MAX_RECIPE_SIZE, RECIPE_FILE_NAME};
use crate::error::{Error, Result};
use crate::image::Materializer;
use crate::runtime::{Launcher, RunConfig};
use crate::storage::RootfsStore;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// A parsed build recipe.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Base image reference.
    pub from: String,

    /// Shell-style command lines run in order inside the derived rootfs.
    #[serde(default)]
    pub commands: Vec<String>,

    /// Recorded environment metadata. Informational only; not applied at
    /// run time in this version.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Recorded port metadata. Informational only.
    #[serde(default)]
    pub ports: Vec<String>,

    /// Recorded volume metadata. Informational only.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// Parses a recipe from its raw file contents.
///
/// The body must begin with `[` and end with `]` after trimming
/// whitespace; anything else is refused before a rootfs is created.
pub fn parse_recipe(text: &str) -> Result<Recipe> {
    if text.len() > MAX_RECIPE_SIZE {
        return Err(Error::RecipeInvalid(format!(
            "recipe exceeds maximum size of {MAX_RECIPE_SIZE} bytes"
        )));
    }

    let body = text.trim();
    let inner = body
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| {
            Error::RecipeInvalid("recipe body must be enclosed in '[' and ']'".to_string())
        })?;

    let recipe: Recipe =
        serde_yaml::from_str(inner).map_err(|e| Error::RecipeInvalid(e.to_string()))?;

    if recipe.from.trim().is_empty() {
        return Err(Error::RecipeInvalid(
            "'from' must name a base image".to_string(),
        ));
    }

    Ok(recipe)
}

/// Runs recipe builds against a rootfs store.
pub struct Builder {
    store: RootfsStore,
}

impl Builder {
    /// Creates a builder over the given store.
    pub fn new(store: RootfsStore) -> Self {
        Self { store }
    }

    /// Builds the recipe found in `dir`, returning the derived rootfs slug.
    pub fn build(&self, dir: &Path) -> Result<String> {
        let recipe_path = dir.join(RECIPE_FILE_NAME);
        let text = fs::read_to_string(&recipe_path)
            .map_err(|_| Error::RecipeNotFound(recipe_path.clone()))?;
        let recipe = parse_recipe(&text)?;

        info!(
            from = %recipe.from,
            steps = recipe.commands.len(),
            "building derived rootfs"
        );

        let base_slug = Materializer::new(self.store.clone()).materialize(&recipe.from)?;
        let built_slug = format!("{base_slug}{BUILT_ROOTFS_SUFFIX}");

        let src = self.store.rootfs_path(&base_slug);
        let dst = self.store.rootfs_path(&built_slug);
        if dst.exists() {
            debug!(rootfs = %built_slug, "replacing existing derived rootfs");
            fs::remove_dir_all(&dst)?;
        }
        info!(from = %src.display(), to = %dst.display(), "copying base rootfs");
        copy_dir_recursive(&src, &dst).map_err(|e| Error::RootfsCopyFailed {
            from: src.clone(),
            to: dst.clone(),
            reason: e.to_string(),
        })?;

        let launcher = Launcher::new(self.store.clone());
        for (index, line) in recipe.commands.iter().enumerate() {
            let step = index + 1;
            let command: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            if command.is_empty() {
                warn!(step, "skipping empty build command");
                continue;
            }

            info!(step, command = %line, "running build step");
            let code = launcher.launch(&RunConfig {
                rootfs: built_slug.clone(),
                command,
                gpu: false,
                gui: false,
            })?;
            if code != 0 {
                return Err(Error::BuildStepFailed {
                    step,
                    command: line.clone(),
                    code,
                });
            }
        }

        if !recipe.env.is_empty() {
            info!(env = ?recipe.env, "recorded environment metadata");
        }
        if !recipe.ports.is_empty() {
            info!(ports = ?recipe.ports, "recorded port metadata");
        }
        if !recipe.volumes.is_empty() {
            info!(volumes = ?recipe.volumes, "recorded volume metadata");
        }

        info!(rootfs = %built_slug, "build complete");
        Ok(built_slug)
    }
}

/// Copies a rootfs tree, preserving file modes and recreating symlinks
/// verbatim (never following them). Special files are skipped.
fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir(dst)?;
    fs::set_permissions(dst, fs::metadata(src)?.permissions())?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let to = dst.join(entry.file_name());

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(target, &to)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &to)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &to)?;
        } else {
            debug!(path = %entry.path().display(), "skipping special file during copy");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SAMPLE: &str = "[\nfrom: alpine:3.19\ncommands:\n  - /bin/true\n]";

    #[test]
    fn parses_framed_recipe() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        assert_eq!(recipe.from, "alpine:3.19");
        assert_eq!(recipe.commands, vec!["/bin/true".to_string()]);
        assert!(recipe.env.is_empty());
    }

    #[test]
    fn rejects_missing_framing() {
        let result = parse_recipe("from: alpine:3.19\n");
        assert!(matches!(result, Err(Error::RecipeInvalid(_))));
    }

    #[test]
    fn rejects_unknown_keys() {
        let result = parse_recipe("[\nfrom: alpine:3.19\ncomands:\n  - /bin/true\n]");
        assert!(matches!(result, Err(Error::RecipeInvalid(_))));
    }

    #[test]
    fn rejects_empty_from() {
        let result = parse_recipe("[\nfrom: \"\"\n]");
        assert!(matches!(result, Err(Error::RecipeInvalid(_))));
    }

    #[test]
    fn copy_preserves_modes_and_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/tool"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(src.join("bin/tool"), fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("bin/tool", src.join("tool")).unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        let mode = fs::metadata(dst.join("bin/tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        let link = fs::read_link(dst.join("tool")).unwrap();
        assert_eq!(link, PathBuf::from("bin/tool"));

        // The source tree is untouched.
        assert!(src.join("bin/tool").exists());
    }
}
