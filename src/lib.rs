//! # isolator
//!
//! **Unprivileged single-binary container runtime for Linux.**
//!
//! Materializes root filesystems from OCI images by delegating pull and
//! export to an external image tool, and runs commands inside them under a
//! fresh set of Linux namespaces, optionally passing GPU and GUI devices
//! through from the host.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          isolator                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  pull ──► Materializer ──► podman pull / create / export     │
//! │                 │                                            │
//! │                 └──► extract::unpack ──► <base>/<slug>/      │
//! │                                                              │
//! │  build ──► recipe::Builder ──► Materializer + copy + steps   │
//! │                                                              │
//! │  run ───► runtime::Launcher                                  │
//! │             └─ fork ─► unshare(user,pid) + id maps           │
//! │                  └─ /proc/self/exe child … (mount,uts,       │
//! │                       ipc,net) ──► child init ──► execvpe    │
//! │                                                              │
//! │  list/rm ──► storage::RootfsStore                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Isolation Model
//!
//! Containers get new user, pid, mount, uts, ipc, and net namespaces.
//! Everything is rootless: container uid 0 maps to the invoking host uid
//! with a single-entry map. There is no cgroup, seccomp, or capability
//! handling, and networking stops at bringing up loopback; this trades
//! isolation depth for zero required privileges.
//!
//! # Trust Model
//!
//! The exported archive is produced by the local image tool from a locally
//! pulled image, so extraction does not defend against hostile archives.
//! Pull images you trust.
//!
//! # Example
//!
//! ```rust,ignore
//! use isolator::{Launcher, Materializer, RootfsStore, RunConfig};
//!
//! fn main() -> isolator::Result<()> {
//!     let store = RootfsStore::new();
//!     let slug = Materializer::new(store.clone()).materialize("alpine:3.19")?;
//!
//!     let code = Launcher::new(store).launch(&RunConfig {
//!         rootfs: slug,
//!         command: vec!["/bin/echo".into(), "hi".into()],
//!         gpu: false,
//!         gui: false,
//!     })?;
//!     std::process::exit(code);
//! }
//! ```

pub mod child;
pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod image;
pub mod recipe;
pub mod runtime;
pub mod storage;

pub use child::ChildConfig;
pub use config::{Config, CustomCommand};
pub use error::{Error, Result};
pub use image::{Materializer, sanitize_name};
pub use recipe::{Builder, Recipe, parse_recipe};
pub use runtime::{Launcher, RunConfig};
pub use storage::RootfsStore;
