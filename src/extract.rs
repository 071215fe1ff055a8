//! Streaming tar extraction into a rootfs directory.
//!
//! Unpacks the flattened archive produced by the external image tool's
//! `export`. Only directories, regular files, and symlinks are
//! materialized; other entry types (hard links, devices, fifos) are
//! skipped. Directories and regular files are recreated with the header's
//! mode and modification time, so re-extracting the same archive yields
//! identical timestamps. Symlinks are recreated verbatim; their own
//! timestamps are not restored. Entry paths are joined onto the
//! destination without traversal checks: the archive comes from our own
//! export of a locally pulled image, not from an untrusted source.
//!
//! The function takes any [`Read`], so a caller that wants byte-level
//! progress can wrap the underlying stream before handing it over.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt, symlink};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tar::{Archive, EntryType};
use tracing::{debug, trace};

/// Unpacks a POSIX tar stream into `dest`, honoring entry modes and
/// modification times.
///
/// On error the partially extracted tree is left in place for inspection.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);

    let entries = archive.entries().map_err(|e| Error::ExtractionFailed {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ExtractionFailed {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;

        let rel = entry
            .path()
            .map_err(|e| Error::ExtractionFailed {
                path: dest.to_path_buf(),
                reason: e.to_string(),
            })?
            .into_owned();
        let target = dest.join(&rel);
        let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;
        let mtime = entry.header().mtime().unwrap_or(0);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|e| fail(&target, &e))?;
                fs::set_permissions(&target, Permissions::from_mode(mode))
                    .map_err(|e| fail(&target, &e))?;
                set_modified(&target, mtime).map_err(|e| fail(&target, &e))?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| fail(&target, &e))?;
                }
                let mut out = OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .mode(mode)
                    .open(&target)
                    .map_err(|e| fail(&target, &e))?;
                io::copy(&mut entry, &mut out).map_err(|e| fail(&target, &e))?;
                // The creation mode is subject to the umask; fix it up.
                fs::set_permissions(&target, Permissions::from_mode(mode))
                    .map_err(|e| fail(&target, &e))?;
                set_modified(&target, mtime).map_err(|e| fail(&target, &e))?;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(|e| fail(&target, &e))?
                    .ok_or_else(|| Error::ExtractionFailed {
                        path: target.clone(),
                        reason: "symlink entry without a target".to_string(),
                    })?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| fail(&target, &e))?;
                }
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| fail(&target, &e))?;
                }
                symlink(&*link, &target).map_err(|e| fail(&target, &e))?;
            }
            other => {
                trace!(path = %rel.display(), kind = ?other, "skipping unsupported tar entry");
            }
        }
        count += 1;
    }

    debug!(dest = %dest.display(), entries = count, "archive unpacked");
    Ok(())
}

/// Applies the archive's recorded modification time to an extracted
/// directory or file.
fn set_modified(target: &Path, mtime: u64) -> io::Result<()> {
    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(mtime);
    File::open(target)?.set_modified(modified)
}

fn fail(target: &Path, e: &dyn std::fmt::Display) -> Error {
    Error::ExtractionFailed {
        path: target.to_path_buf(),
        reason: e.to_string(),
    }
}
