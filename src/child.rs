//! Container init (child side).
//!
//! This code runs as pid 1 of a freshly created pid namespace, re-executed
//! via `/proc/self/exe child …` by the launcher. It knows it is inside the
//! container because of the subcommand, not by inspecting namespaces. It
//! rebuilds `/` from the rootfs directory and then replaces itself with
//! the user command.
//!
//! The sequence is strict and ordering is load-bearing:
//!
//! 1. Remount `/` with `MS_PRIVATE | MS_REC`. Without this, every later
//!    bind mount propagates back to the host.
//! 2. Bind-mount the rootfs onto itself. `pivot_root` requires the new
//!    root to be a mount point distinct from the old one.
//! 3. Create `<rootfs>/oldrootfs` (0700).
//! 4. `pivot_root(rootfs, <rootfs>/oldrootfs)`, then `chdir("/")`.
//! 5. Detach `/oldrootfs` (`MNT_DETACH`) and remove the directory.
//!    Skipping this leaves a live handle to the host filesystem inside
//!    the container.
//! 6. Mount `/proc`, `/sys`, `/dev` (tmpfs), `/dev/pts`, `/run`.
//! 7. Bring up loopback (`ip link set lo up`); failure is only a warning.
//! 8. Bind requested GPU devices and the X11 socket.
//! 9. `sync`, then `execvpe` the user command. The exec replaces this
//!    process, so the user command itself becomes pid 1.
//!
//! GPU and GUI host paths are captured at entry, while the mount tree is
//! still the host's: each existing path is opened with `O_PATH` and later
//! bind-mounted via its `/proc/self/fd/N` alias, which stays valid after
//! the pivot has made the original host paths unreachable.
//!
//! Any failure aborts the child with a diagnostic; the parent surfaces the
//! non-zero exit.

use crate::constants::{DEFAULT_DISPLAY, GPU_DEVICE_PATHS, OLD_ROOT_DIR, X11_SOCKET_DIR};
use crate::error::{Error, Result};
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::unistd::{chdir, execvpe, pivot_root, sync};
use std::convert::Infallible;
use std::env;
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Inputs for the child init, decoded from the hidden `child` subcommand.
#[derive(Debug, Clone)]
pub struct ChildConfig {
    /// Absolute path of the rootfs directory on the host.
    pub rootfs: PathBuf,
    /// Bind host GPU devices into the container.
    pub gpu: bool,
    /// Bind the host X11 socket and set `DISPLAY`.
    pub gui: bool,
    /// User command and arguments.
    pub command: Vec<String>,
}

/// A host path captured before the pivot, kept reachable through an open
/// `O_PATH` descriptor.
struct HostMount {
    path: PathBuf,
    is_dir: bool,
    file: File,
}

/// Runs the container init sequence and execs the user command.
///
/// Only returns on error; on success the process image is replaced.
pub fn run(cfg: &ChildConfig) -> Result<Infallible> {
    if cfg.command.is_empty() {
        return Err(Error::InvalidCommand("empty command".to_string()));
    }

    // Must happen first: once the pivot is done the host tree is gone.
    let host_mounts = capture_host_mounts(cfg);

    make_root_private()?;
    enter_rootfs(&cfg.rootfs)?;
    mount_pseudo_filesystems()?;
    bring_up_loopback();
    bind_host_mounts(&host_mounts)?;

    let env = compose_env(cfg.gui);
    exec_user_command(&cfg.command, &env)
}

/// Opens the host-side GPU/GUI paths that exist, before any mount call
/// alters the view of `/`.
fn capture_host_mounts(cfg: &ChildConfig) -> Vec<HostMount> {
    let mut wanted: Vec<&str> = Vec::new();
    if cfg.gpu {
        wanted.extend(GPU_DEVICE_PATHS);
    }
    if cfg.gui {
        wanted.push(X11_SOCKET_DIR);
    }

    let mut captured = Vec::new();
    for path in wanted {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => {
                debug!(path, "host path absent, skipping");
                continue;
            }
        };
        match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_PATH)
            .open(path)
        {
            Ok(file) => {
                debug!(path, "captured host path for container bind");
                captured.push(HostMount {
                    path: PathBuf::from(path),
                    is_dir: meta.is_dir(),
                    file,
                });
            }
            Err(e) => warn!(path, error = %e, "could not capture host path"),
        }
    }
    captured
}

/// Stops mount events from propagating out of this namespace.
fn make_root_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|errno| Error::MountFailed {
        target: PathBuf::from("/"),
        errno,
    })?;
    debug!("mount namespace made private");
    Ok(())
}

/// Self-binds the rootfs, pivots into it, and drops the old root.
fn enter_rootfs(rootfs: &Path) -> Result<()> {
    mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|errno| Error::MountFailed {
        target: rootfs.to_path_buf(),
        errno,
    })?;

    let put_old = rootfs.join(OLD_ROOT_DIR);
    if !put_old.is_dir() {
        fs::DirBuilder::new().mode(0o700).create(&put_old)?;
    }

    pivot_root(rootfs, &put_old).map_err(|errno| Error::PivotRootFailed {
        rootfs: rootfs.to_path_buf(),
        errno,
    })?;
    chdir("/").map_err(|errno| Error::NamespaceSetup { op: "chdir", errno })?;

    let old_root = Path::new("/").join(OLD_ROOT_DIR);
    umount2(&old_root, MntFlags::MNT_DETACH).map_err(|errno| Error::MountFailed {
        target: old_root.clone(),
        errno,
    })?;
    fs::remove_dir(&old_root)?;
    debug!(rootfs = %rootfs.display(), "pivoted into rootfs, old root detached");
    Ok(())
}

/// Mounts the standard pseudo-filesystems of a Linux root.
fn mount_pseudo_filesystems() -> Result<()> {
    mount_fs("proc", "/proc", "proc", MsFlags::empty(), None)?;
    mount_fs("sysfs", "/sys", "sysfs", MsFlags::empty(), None)?;
    mount_fs(
        "tmpfs",
        "/dev",
        "tmpfs",
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )?;
    mount_fs("devpts", "/dev/pts", "devpts", MsFlags::empty(), None)?;
    mount_fs(
        "tmpfs",
        "/run",
        "tmpfs",
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )?;
    Ok(())
}

fn mount_fs(
    source: &str,
    target: &str,
    fstype: &str,
    flags: MsFlags,
    data: Option<&str>,
) -> Result<()> {
    // Minimal images may ship without the mountpoint directory.
    fs::create_dir_all(target)?;
    mount(Some(source), target, Some(fstype), flags, data).map_err(|errno| {
        Error::MountFailed {
            target: PathBuf::from(target),
            errno,
        }
    })?;
    debug!(target, fstype, "mounted");
    Ok(())
}

/// Brings the loopback interface up. The container image must ship an
/// `ip` binary; a failure here is reported but not fatal.
fn bring_up_loopback() {
    match Command::new("ip").args(["link", "set", "lo", "up"]).status() {
        Ok(status) if status.success() => debug!("loopback interface up"),
        Ok(status) => warn!(%status, "could not bring up loopback interface"),
        Err(e) => warn!(error = %e, "could not bring up loopback interface"),
    }
}

/// Binds the captured host paths to the same paths inside the container,
/// using their `/proc/self/fd/N` aliases as mount sources.
fn bind_host_mounts(mounts: &[HostMount]) -> Result<()> {
    for host_mount in mounts {
        if host_mount.is_dir {
            fs::create_dir_all(&host_mount.path)?;
        } else {
            if let Some(parent) = host_mount.path.parent() {
                fs::create_dir_all(parent)?;
            }
            if fs::symlink_metadata(&host_mount.path).is_err() {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .open(&host_mount.path)?;
            }
        }

        let source = format!("/proc/self/fd/{}", host_mount.file.as_raw_fd());
        mount(
            Some(source.as_str()),
            &host_mount.path,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
        .map_err(|errno| Error::MountFailed {
            target: host_mount.path.clone(),
            errno,
        })?;
        debug!(path = %host_mount.path.display(), "bound host path");
    }
    Ok(())
}

/// Builds the environment for the user command: the inherited host
/// environment, with `DISPLAY` pinned when GUI support is requested.
fn compose_env(gui: bool) -> Vec<CString> {
    let mut out = Vec::new();
    for (key, value) in env::vars() {
        if gui && key == "DISPLAY" {
            continue;
        }
        if let Ok(pair) = CString::new(format!("{key}={value}")) {
            out.push(pair);
        }
    }
    if gui {
        let display = effective_display(env::var("DISPLAY").ok().as_deref());
        if let Ok(pair) = CString::new(format!("DISPLAY={display}")) {
            out.push(pair);
        }
    }
    out
}

/// Display forwarded to GUI containers: the inherited value, or `:0`.
fn effective_display(current: Option<&str>) -> String {
    match current {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DEFAULT_DISPLAY.to_string(),
    }
}

/// Flushes filesystem buffers and replaces this process with the user
/// command, which becomes pid 1 of the container.
fn exec_user_command(command: &[String], env: &[CString]) -> Result<Infallible> {
    let to_cstring = |arg: &String| {
        CString::new(arg.as_str()).map_err(|_| Error::InvalidCommand(arg.clone()))
    };
    let program = to_cstring(&command[0])?;
    let args = command
        .iter()
        .map(to_cstring)
        .collect::<Result<Vec<CString>>>()?;

    sync();
    execvpe(&program, &args, env).map_err(|errno| Error::ExecFailed {
        command: command[0].clone(),
        errno,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_falls_back_when_unset() {
        assert_eq!(effective_display(None), ":0");
        assert_eq!(effective_display(Some("")), ":0");
    }

    #[test]
    fn display_keeps_inherited_value() {
        assert_eq!(effective_display(Some(":1")), ":1");
    }

    #[test]
    fn run_refuses_empty_command() {
        let cfg = ChildConfig {
            rootfs: PathBuf::from("/nonexistent"),
            gpu: false,
            gui: false,
            command: Vec::new(),
        };
        assert!(matches!(run(&cfg), Err(Error::InvalidCommand(_))));
    }
}
