//! Tests for recipe parsing and build preconditions.

use isolator::constants::{MAX_RECIPE_SIZE, RECIPE_FILE_NAME};
use isolator::{Builder, Error, RootfsStore, parse_recipe};
use tempfile::TempDir;

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn parses_full_recipe() {
    let text = r#"[
from: alpine:3.19
commands:
  - /sbin/apk add --no-cache curl
  - /bin/true
env:
  LANG: C.UTF-8
ports:
  - "8080"
volumes:
  - /data
]"#;

    let recipe = parse_recipe(text).unwrap();
    assert_eq!(recipe.from, "alpine:3.19");
    assert_eq!(recipe.commands.len(), 2);
    assert_eq!(recipe.env["LANG"], "C.UTF-8");
    assert_eq!(recipe.ports, vec!["8080"]);
    assert_eq!(recipe.volumes, vec!["/data"]);
}

#[test]
fn accepts_surrounding_whitespace() {
    let recipe = parse_recipe("\n  [\nfrom: alpine:3.19\n]\n  ").unwrap();
    assert_eq!(recipe.from, "alpine:3.19");
}

#[test]
fn refuses_unframed_body() {
    for text in ["from: alpine:3.19", "[from: alpine:3.19", "from: alpine:3.19]"] {
        let result = parse_recipe(text);
        assert!(
            matches!(result, Err(Error::RecipeInvalid(_))),
            "expected framing rejection for {text:?}"
        );
    }
}

#[test]
fn refuses_unknown_top_level_keys() {
    let result = parse_recipe("[\nfrom: alpine:3.19\nportss:\n  - \"80\"\n]");
    assert!(matches!(result, Err(Error::RecipeInvalid(_))));
}

#[test]
fn refuses_missing_base_image() {
    let result = parse_recipe("[\ncommands:\n  - /bin/true\n]");
    assert!(matches!(result, Err(Error::RecipeInvalid(_))));
}

#[test]
fn refuses_oversized_recipe() {
    let mut text = String::from("[\nfrom: alpine:3.19\ncommands:\n");
    while text.len() <= MAX_RECIPE_SIZE {
        text.push_str("  - /bin/true\n");
    }
    text.push(']');

    let result = parse_recipe(&text);
    assert!(matches!(result, Err(Error::RecipeInvalid(_))));
}

// =============================================================================
// Build Precondition Tests
// =============================================================================

#[test]
fn build_refuses_missing_recipe_file() {
    let temp = TempDir::new().unwrap();
    let store = RootfsStore::with_base(temp.path().join("rootfs"));

    let result = Builder::new(store).build(temp.path());
    assert!(matches!(result, Err(Error::RecipeNotFound(_))));
}

#[test]
fn build_refuses_unframed_recipe_before_touching_the_store() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("rootfs");
    let store = RootfsStore::with_base(base.clone());
    std::fs::write(temp.path().join(RECIPE_FILE_NAME), "from: alpine:3.19\n").unwrap();

    let result = Builder::new(store).build(temp.path());
    assert!(matches!(result, Err(Error::RecipeInvalid(_))));
    // No rootfs directory was created by the refused build.
    assert!(!base.exists());
}
