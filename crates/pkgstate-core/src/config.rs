//! Conventional locations of the persisted stores and environment overrides.

use std::path::{Path, PathBuf};

/// Overrides the shared (user-level) configuration directory.
pub const SHARED_DIR_ENV: &str = "PKGSTATE_SHARED_DIR";
/// Overrides the default user netrc path.
pub const NETRC_ENV: &str = "PKGSTATE_NETRC";
/// Disables the OS secret store provider when falsy.
pub const SECRET_STORE_ENV: &str = "PKGSTATE_SECRET_STORE";
/// Controls whether emptied mirror files are removed.
pub const MIRRORS_DELETE_WHEN_EMPTY_ENV: &str = "PKGSTATE_MIRRORS_DELETE_WHEN_EMPTY";

pub const PINS_FILENAME: &str = "Package.resolved";
pub const MIRRORS_FILENAME: &str = "mirrors.json";
pub const STATE_FILENAME: &str = "workspace-state.json";
pub const WORKSPACE_DATA_DIR: &str = ".pkgstate";

// ---------------------------------------------------------------------------
// Helper: tilde expansion
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

/// Interpret an environment flag. Unset means `default`; `0`, `false`, `no`
/// and `off` (any case) mean false; anything else means true.
pub fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => parse_flag(&val),
        Err(_) => default,
    }
}

fn parse_flag(val: &str) -> bool {
    let v = val.trim().to_lowercase();
    !matches!(v.as_str(), "0" | "false" | "no" | "off")
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| expand_tilde(v.trim()))
}

// ---------------------------------------------------------------------------
// StoreLocations
// ---------------------------------------------------------------------------

/// Where each store of one workspace lives on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLocations {
    pub workspace_root: PathBuf,
    pub pins_file: PathBuf,
    pub local_mirrors_file: PathBuf,
    pub shared_mirrors_file: Option<PathBuf>,
    pub state_file: PathBuf,
    pub user_netrc: Option<PathBuf>,
    pub mirrors_delete_when_empty: bool,
}

impl StoreLocations {
    /// Conventional layout for `workspace_root`, with the shared directory and
    /// netrc path taken from the environment or the home directory.
    pub fn for_workspace(workspace_root: impl AsRef<Path>) -> Self {
        let shared_dir = env_path(SHARED_DIR_ENV).or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(WORKSPACE_DATA_DIR))
        });
        let user_netrc = env_path(NETRC_ENV).or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".netrc"))
        });
        Self::with_dirs(workspace_root, shared_dir.as_deref(), user_netrc)
            .delete_when_empty(env_flag(MIRRORS_DELETE_WHEN_EMPTY_ENV, true))
    }

    /// Layout with explicit shared directory and netrc path; no environment
    /// lookups.
    pub fn with_dirs(
        workspace_root: impl AsRef<Path>,
        shared_dir: Option<&Path>,
        user_netrc: Option<PathBuf>,
    ) -> Self {
        let root = workspace_root.as_ref().to_path_buf();
        let data_dir = root.join(WORKSPACE_DATA_DIR);
        Self {
            pins_file: root.join(PINS_FILENAME),
            local_mirrors_file: data_dir.join("configuration").join(MIRRORS_FILENAME),
            shared_mirrors_file: shared_dir
                .map(|dir| dir.join("configuration").join(MIRRORS_FILENAME)),
            state_file: data_dir.join(STATE_FILENAME),
            user_netrc,
            mirrors_delete_when_empty: true,
            workspace_root: root,
        }
    }

    pub fn delete_when_empty(mut self, value: bool) -> Self {
        self.mirrors_delete_when_empty = value;
        self
    }
}
