//! Path utilities for locating configuration used in tests.

use std::path::PathBuf;

/// Returns the workspace root directory.
///
/// This is determined by walking up from the test-utils manifest directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Returns the shipped `config/` directory.
///
/// Honors `CONFIG_DIR` when set.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    workspace_root().join("config")
}

/// Returns `config/boundaries/`.
pub fn boundaries_dir() -> PathBuf {
    config_dir().join("boundaries")
}

/// Returns `config/aliases.yaml`.
pub fn aliases_path() -> PathBuf {
    config_dir().join("aliases.yaml")
}

/// Returns `config/profiles.yaml`.
pub fn profiles_path() -> PathBuf {
    config_dir().join("profiles.yaml")
}
