//! Error types for the container runtime.

use std::path::PathBuf;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the container runtime.
///
/// Nothing is retried; every error propagates to the top level and is
/// reported with a non-zero exit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Precondition Failures
    // =========================================================================
    /// Rootfs directory does not exist under the base path.
    #[error("rootfs not found: {0} (pull an image first)")]
    RootfsNotFound(String),

    /// Named custom command is not present in the configuration.
    #[error("custom command not found in configuration: {0}")]
    CustomCommandNotFound(String),

    /// A custom command was requested but no default rootfs is configured.
    #[error("custom command '{0}' needs `default_rootfs` in the configuration")]
    NoDefaultRootfs(String),

    /// Command argv contained a byte sequence that cannot be exec'd.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    // =========================================================================
    // External Tool Failures
    // =========================================================================
    /// The external image tool could not be spawned at all.
    #[error("failed to invoke '{tool}': {reason}")]
    ImageToolUnavailable { tool: String, reason: String },

    /// `pull` reported failure.
    #[error("image pull failed for '{reference}': {reason}")]
    ImagePullFailed { reference: String, reason: String },

    /// Creating the temporary flattened container failed.
    #[error("temporary container creation failed for '{reference}': {reason}")]
    ImageCreateFailed { reference: String, reason: String },

    /// Exporting the temporary container's filesystem failed.
    #[error("image export failed for '{reference}': {reason}")]
    ImageExportFailed { reference: String, reason: String },

    /// Host-side recursive rootfs copy failed.
    #[error("failed to copy rootfs {from} to {to}: {reason}")]
    RootfsCopyFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    // =========================================================================
    // Archive Extraction
    // =========================================================================
    /// Malformed archive entry or filesystem failure during unpack.
    /// The partial rootfs is left on disk for inspection.
    #[error("archive extraction failed at {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    // =========================================================================
    // Recipes and Builds
    // =========================================================================
    /// No recipe file in the build directory.
    #[error("recipe file not found: {0}")]
    RecipeNotFound(PathBuf),

    /// Recipe failed framing, size, or schema validation.
    #[error("invalid recipe: {0}")]
    RecipeInvalid(String),

    /// A build command exited non-zero. The partial derived rootfs is
    /// left on disk for inspection.
    #[error("build step {step} ('{command}') exited with code {code}")]
    BuildStepFailed {
        step: usize,
        command: String,
        code: i32,
    },

    // =========================================================================
    // Container Bootstrap
    // =========================================================================
    /// fork/unshare/waitpid failure while setting up namespaces.
    #[error("{op} failed: {errno}")]
    NamespaceSetup { op: &'static str, errno: nix::Error },

    /// Writing the uid/gid maps of a fresh user namespace failed.
    #[error("failed to write {path}: {reason}")]
    IdMapWrite { path: &'static str, reason: String },

    /// A mount inside the child namespaces failed.
    #[error("mount of {target} failed: {errno}")]
    MountFailed { target: PathBuf, errno: nix::Error },

    /// `pivot_root` into the new rootfs failed.
    #[error("pivot_root into {rootfs} failed: {errno}")]
    PivotRootFailed { rootfs: PathBuf, errno: nix::Error },

    /// Exec of the user command failed; nothing was run.
    #[error("exec of '{command}' failed: {errno}")]
    ExecFailed { command: String, errno: nix::Error },

    // =========================================================================
    // Configuration
    // =========================================================================
    /// The global configuration document exists but cannot be parsed.
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // =========================================================================
    // I/O
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
