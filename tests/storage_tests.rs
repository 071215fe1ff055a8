//! Tests for the rootfs registry.

use isolator::{Error, RootfsStore};
use std::fs;
use tempfile::TempDir;

#[test]
fn ensure_base_creates_the_directory() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("var/lib/isolator/rootfs");
    let store = RootfsStore::with_base(base.clone());

    store.ensure_base().unwrap();
    assert!(base.is_dir());

    // Idempotent.
    store.ensure_base().unwrap();
}

#[test]
fn list_returns_only_directories() {
    let temp = TempDir::new().unwrap();
    let store = RootfsStore::with_base(temp.path().to_path_buf());

    fs::create_dir(temp.path().join("alpine_3.19")).unwrap();
    fs::create_dir(temp.path().join("chainguard_wolfi-base")).unwrap();
    fs::write(temp.path().join("alpine_3.19.tar"), b"stray tarball").unwrap();
    fs::write(temp.path().join(".lock"), b"").unwrap();

    let names = store.list().unwrap();
    assert_eq!(names, vec!["alpine_3.19", "chainguard_wolfi-base"]);
}

#[test]
fn contains_reflects_directory_presence() {
    let temp = TempDir::new().unwrap();
    let store = RootfsStore::with_base(temp.path().to_path_buf());

    assert!(!store.contains("alpine_3.19"));
    fs::create_dir(temp.path().join("alpine_3.19")).unwrap();
    assert!(store.contains("alpine_3.19"));
}

#[test]
fn remove_deletes_recursively() {
    let temp = TempDir::new().unwrap();
    let store = RootfsStore::with_base(temp.path().to_path_buf());

    let rootfs = temp.path().join("alpine_3.19");
    fs::create_dir_all(rootfs.join("etc")).unwrap();
    fs::write(rootfs.join("etc/hostname"), b"container\n").unwrap();

    store.remove("alpine_3.19").unwrap();
    assert!(!rootfs.exists());
}

#[test]
fn remove_then_list_roundtrip() {
    let temp = TempDir::new().unwrap();
    let store = RootfsStore::with_base(temp.path().to_path_buf());

    fs::create_dir(temp.path().join("alpine_3.19")).unwrap();
    assert!(store.list().unwrap().contains(&"alpine_3.19".to_string()));

    store.remove("alpine_3.19").unwrap();
    assert!(!store.list().unwrap().contains(&"alpine_3.19".to_string()));
}

#[test]
fn remove_surfaces_missing_rootfs() {
    let temp = TempDir::new().unwrap();
    let store = RootfsStore::with_base(temp.path().to_path_buf());

    assert!(matches!(
        store.remove("ghost"),
        Err(Error::RootfsNotFound(_))
    ));
}
