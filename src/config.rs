//! Global runtime configuration.
//!
//! An optional TOML document (`isolator.toml`) supplies defaults that fill
//! the fields of a run configuration the user left unspecified, plus a
//! set of named custom commands:
//!
//! ```toml
//! default_rootfs = "chainguard_wolfi-base"
//! auto_gpu = false
//! auto_gui = false
//!
//! [custom_commands.shell]
//! command = "/bin/sh"
//! args = ["-l"]
//! gui = false
//! ```
//!
//! The file is looked up in the working directory first, then under the
//! user's configuration directory. A missing file means defaults; a
//! present but unparsable file is an error.

use crate::constants::CONFIG_FILE_NAME;
use crate::error::{Error, Result};
use crate::runtime::RunConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Optional global configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Rootfs used by custom commands that do not name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rootfs: Option<String>,
    /// Enable GPU passthrough for every launch.
    pub auto_gpu: bool,
    /// Enable GUI passthrough for every launch.
    pub auto_gui: bool,
    /// Named commands runnable via `exec <name>`.
    pub custom_commands: BTreeMap<String, CustomCommand>,
}

/// A configured command for `exec <name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomCommand {
    /// Program to run inside the container.
    pub command: String,
    /// Arguments for the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Bind host GPU devices for this command.
    #[serde(default)]
    pub gpu: bool,
    /// Bind the host X11 socket for this command.
    #[serde(default)]
    pub gui: bool,
}

impl Config {
    /// Loads the configuration from the first search path that exists,
    /// or returns defaults when none does.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                debug!(path = %path.display(), "loading configuration");
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Loads and parses a configuration document from `path`.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Search order: working directory, then the user config directory.
    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("isolator").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Fills the unspecified fields of a run configuration.
    pub fn apply(&self, cfg: &mut RunConfig) {
        cfg.gpu = cfg.gpu || self.auto_gpu;
        cfg.gui = cfg.gui || self.auto_gui;
    }

    /// Resolves a named custom command into a run configuration, using
    /// `default_rootfs` as the target rootfs.
    pub fn resolve_custom(&self, name: &str) -> Result<RunConfig> {
        let custom = self
            .custom_commands
            .get(name)
            .ok_or_else(|| Error::CustomCommandNotFound(name.to_string()))?;
        let rootfs = self
            .default_rootfs
            .clone()
            .ok_or_else(|| Error::NoDefaultRootfs(name.to_string()))?;

        let mut command = vec![custom.command.clone()];
        command.extend(custom.args.iter().cloned());

        Ok(RunConfig {
            rootfs,
            command,
            gpu: custom.gpu || self.auto_gpu,
            gui: custom.gui || self.auto_gui,
        })
    }

    /// Renders the effective configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigInvalid {
            path: PathBuf::from(CONFIG_FILE_NAME),
            reason: e.to_string(),
        })
    }
}
