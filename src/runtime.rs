//! Container launcher (parent side).
//!
//! Launching a container is a two-phase handoff: the parent re-executes
//! its own binary with the hidden `child` subcommand inside a fresh set of
//! namespaces, and the child performs the rootfs pivot before exec'ing the
//! user command (see [`crate::child`]).
//!
//! ```text
//! launch()
//!   └─ fork ──► supervisor
//!                 ├─ unshare(USER | PID), write single-entry uid/gid maps
//!                 └─ spawn /proc/self/exe child <rootfs> [--gpu] [--gui] <argv…>
//!                      │   (mount/uts/ipc/net unshared between fork and exec,
//!                      │    so the spawned child owns them exclusively and is
//!                      │    pid 1 of the new pid namespace)
//!                      └─► child init ──► execvpe(user command)
//! ```
//!
//! ## Privilege model
//!
//! Fully rootless: the user namespace maps container uid 0 to the invoking
//! host uid with a single-entry map (and the same for gid), written by the
//! supervisor itself after `unshare`. No setuid helpers, capabilities, or
//! subuid ranges are required. The recipe-build path uses the identical
//! mapping.
//!
//! The supervisor fork exists so that the main process never enters the
//! new namespaces; consecutive launches (recipe build steps) each get a
//! fresh, non-nested set.
//!
//! Standard I/O is inherited all the way down, and the user command's exit
//! status is propagated back up unchanged.

use crate::constants::SELF_EXE;
use crate::error::{Error, Result};
use crate::storage::RootfsStore;
use nix::sched::{CloneFlags, unshare};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Gid, Uid, fork};
use std::ffi::OsString;
use std::fs;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Inputs for a single container launch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Rootfs slug under the base directory.
    pub rootfs: String,
    /// User command and arguments; `command[0]` is resolved via `PATH`
    /// inside the container.
    pub command: Vec<String>,
    /// Bind host GPU devices into the container.
    pub gpu: bool,
    /// Bind the host X11 socket and set `DISPLAY`.
    pub gui: bool,
}

/// Launches containers from materialized rootfs directories.
pub struct Launcher {
    store: RootfsStore,
}

impl Launcher {
    /// Creates a launcher over the given store.
    pub fn new(store: RootfsStore) -> Self {
        Self { store }
    }

    /// Runs `cfg.command` inside the rootfs and returns its exit code.
    ///
    /// Refuses with a precondition error when the rootfs directory does
    /// not exist. A command killed by a signal reports `128 + signal`.
    pub fn launch(&self, cfg: &RunConfig) -> Result<i32> {
        let rootfs_dir = self.store.rootfs_path(&cfg.rootfs);
        if !rootfs_dir.is_dir() {
            return Err(Error::RootfsNotFound(cfg.rootfs.clone()));
        }

        let argv = child_argv(&rootfs_dir, cfg);
        info!(rootfs = %cfg.rootfs, command = ?cfg.command, "starting container");

        // SAFETY: the process is single-threaded at this point; the child
        // branch only calls exec-or-exit code paths.
        match unsafe { fork() }.map_err(|errno| Error::NamespaceSetup { op: "fork", errno })? {
            ForkResult::Parent { child } => {
                let code = match waitpid(child, None)
                    .map_err(|errno| Error::NamespaceSetup { op: "waitpid", errno })?
                {
                    WaitStatus::Exited(_, code) => code,
                    WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
                    other => {
                        debug!(status = ?other, "unexpected wait status");
                        1
                    }
                };
                debug!(code, "container exited");
                Ok(code)
            }
            ForkResult::Child => {
                let code = match supervise(&argv) {
                    Ok(code) => code,
                    Err(e) => {
                        eprintln!("isolator: container launch failed: {e}");
                        1
                    }
                };
                std::process::exit(code);
            }
        }
    }
}

/// Builds the re-execution argv handed to the child init.
fn child_argv(rootfs_dir: &Path, cfg: &RunConfig) -> Vec<OsString> {
    let mut argv = vec![
        OsString::from(SELF_EXE),
        OsString::from("child"),
        rootfs_dir.as_os_str().to_os_string(),
    ];
    if cfg.gpu {
        argv.push(OsString::from("--gpu"));
    }
    if cfg.gui {
        argv.push(OsString::from("--gui"));
    }
    argv.extend(cfg.command.iter().map(OsString::from));
    argv
}

/// Supervisor body: enters fresh user and pid namespaces, installs the
/// rootless id maps, spawns the child init, and waits for it.
///
/// Runs in the forked supervisor process; returns the child's exit code
/// for the supervisor to exit with.
fn supervise(argv: &[OsString]) -> Result<i32> {
    let uid = Uid::current();
    let gid = Gid::current();

    unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWPID)
        .map_err(|errno| Error::NamespaceSetup { op: "unshare", errno })?;
    write_id_maps(uid, gid)?;

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    // SAFETY: the hook only calls unshare, which is fine between fork and
    // exec. Mount, UTS, IPC, and net namespaces are created here so they
    // belong to the spawned child alone, and the child (the first process
    // forked after unsharing the pid namespace) becomes pid 1.
    unsafe {
        command.pre_exec(|| {
            unshare(
                CloneFlags::CLONE_NEWNS
                    | CloneFlags::CLONE_NEWUTS
                    | CloneFlags::CLONE_NEWIPC
                    | CloneFlags::CLONE_NEWNET,
            )
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
        });
    }

    let status = command.status()?;
    Ok(status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)))
}

/// Installs the single-entry uid/gid maps of a freshly unshared user
/// namespace, mapping container root to the invoking host user.
///
/// `setgroups` must be denied before an unprivileged process may write
/// its gid map.
fn write_id_maps(uid: Uid, gid: Gid) -> Result<()> {
    let write = |path: &'static str, contents: String| {
        fs::write(path, contents).map_err(|e| Error::IdMapWrite {
            path,
            reason: e.to_string(),
        })
    };

    write("/proc/self/setgroups", "deny\n".to_string())?;
    write("/proc/self/uid_map", format!("0 {uid} 1\n"))?;
    write("/proc/self/gid_map", format!("0 {gid} 1\n"))?;
    debug!(%uid, %gid, "installed rootless id maps");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(gpu: bool, gui: bool) -> RunConfig {
        RunConfig {
            rootfs: "alpine_3.19".to_string(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()],
            gpu,
            gui,
        }
    }

    #[test]
    fn child_argv_layout() {
        let argv = child_argv(Path::new("/var/lib/isolator/rootfs/alpine_3.19"), &config(false, false));
        assert_eq!(argv[0], OsString::from("/proc/self/exe"));
        assert_eq!(argv[1], OsString::from("child"));
        assert_eq!(
            argv[2],
            OsString::from("/var/lib/isolator/rootfs/alpine_3.19")
        );
        assert_eq!(argv[3], OsString::from("/bin/sh"));
        assert_eq!(argv.len(), 6);
    }

    #[test]
    fn child_argv_flags_precede_command() {
        let argv = child_argv(Path::new("/r"), &config(true, true));
        assert_eq!(argv[3], OsString::from("--gpu"));
        assert_eq!(argv[4], OsString::from("--gui"));
        assert_eq!(argv[5], OsString::from("/bin/sh"));
    }

    #[test]
    fn launch_refuses_missing_rootfs() {
        let temp = tempfile::TempDir::new().unwrap();
        let launcher = Launcher::new(RootfsStore::with_base(temp.path().to_path_buf()));
        let err = launcher.launch(&config(false, false)).unwrap_err();
        assert!(matches!(err, Error::RootfsNotFound(_)));
        assert!(err.to_string().contains("rootfs not found"));
    }
}
