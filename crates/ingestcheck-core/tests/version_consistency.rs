//! Every workspace member inherits the workspace version, and the internal
//! path dependency pins that same version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn root_manifest() -> toml::Value {
    let raw = std::fs::read_to_string(workspace_root().join("Cargo.toml")).unwrap();
    raw.parse().unwrap()
}

fn workspace_version() -> String {
    root_manifest()["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn members_inherit_workspace_version() {
    let root = root_manifest();
    let members = root["workspace"]["members"].as_array().unwrap();
    assert!(!members.is_empty());

    for member in members {
        let member = member.as_str().unwrap();
        let raw = std::fs::read_to_string(workspace_root().join(member).join("Cargo.toml"))
            .unwrap_or_else(|e| panic!("{member}: {e}"));
        let manifest: toml::Value = raw.parse().unwrap();
        let inherits = manifest["package"]["version"]
            .get("workspace")
            .and_then(toml::Value::as_bool)
            == Some(true);
        assert!(inherits, "{member} should use version.workspace = true");
    }
}

#[test]
fn internal_dependency_pins_workspace_version() {
    let root = root_manifest();
    let pinned = root["workspace"]["dependencies"]["ingestcheck-core"]["version"]
        .as_str()
        .unwrap();
    assert_eq!(pinned, workspace_version());
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    assert_eq!(workspace_version(), env!("CARGO_PKG_VERSION"));
    assert_eq!(ingestcheck_core::VERSION, env!("CARGO_PKG_VERSION"));
}
