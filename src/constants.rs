//! Constants for the container runtime.
//!
//! All fixed paths, tool names, and limits are defined here to keep
//! magic values out of the rest of the codebase.

// =============================================================================
// Host Paths
// =============================================================================

/// Base directory under which materialized root filesystems live.
/// One subdirectory per rootfs slug.
pub const ROOTFS_BASE_DIR: &str = "/var/lib/isolator/rootfs";

/// The path a process uses to re-execute its own binary.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Directory name inside a rootfs where the old root is parked during
/// `pivot_root`, before being detached and removed.
pub const OLD_ROOT_DIR: &str = "oldrootfs";

// =============================================================================
// External Image Tool
// =============================================================================

/// External tool used to pull images and export flattened containers.
pub const IMAGE_TOOL: &str = "podman";

/// Name prefix for the throwaway container created only to be exported.
pub const TEMP_CONTAINER_PREFIX: &str = "isolator-temp-";

/// Image pulled when `pull` is invoked without an argument.
pub const DEFAULT_IMAGE: &str = "chainguard/wolfi-base";

// =============================================================================
// Recipes
// =============================================================================

/// File name of the build recipe looked up in a build directory.
pub const RECIPE_FILE_NAME: &str = "Isofile";

/// Suffix appended to a base slug to name the derived rootfs of a build.
pub const BUILT_ROOTFS_SUFFIX: &str = "-built";

/// Maximum size of a recipe file in bytes (64 KiB).
pub const MAX_RECIPE_SIZE: usize = 64 * 1024;

// =============================================================================
// Configuration
// =============================================================================

/// File name of the optional global configuration document.
pub const CONFIG_FILE_NAME: &str = "isolator.toml";

// =============================================================================
// Device Passthrough
// =============================================================================

/// Host device paths bound into the container when GPU support is requested.
/// Checked for existence on the host before the mount tree is replaced.
pub const GPU_DEVICE_PATHS: &[&str] = &[
    "/dev/nvidiactl",
    "/dev/nvidia-uvm",
    "/dev/nvidia0",
    "/dev/nvidia1",
    "/dev/dri",
];

/// Host X11 socket directory bound into the container for GUI support.
pub const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// Fallback X display when the host environment does not provide one.
pub const DEFAULT_DISPLAY: &str = ":0";
