use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const QPROFILE_DIR: &str = ".qprofile";

pub const CONFIG_FILE: &str = ".qprofile/config.yaml";
pub const CATALOG_FILE: &str = ".qprofile/catalog.yaml";
pub const PROFILES_FILE: &str = ".qprofile/profiles.yaml";
pub const STORE_FILE: &str = ".qprofile/active_rules.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn qprofile_dir(root: &Path) -> PathBuf {
    root.join(QPROFILE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn catalog_path(root: &Path) -> PathBuf {
    root.join(CATALOG_FILE)
}

pub fn profiles_path(root: &Path) -> PathBuf {
    root.join(PROFILES_FILE)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}
