//! Path resolution for the config file and session state.
//!
//! Uses env vars when set, otherwise XDG defaults.

use std::path::{Path, PathBuf};

use crate::storage::FileStore;

/// Resolved locations for palctl's files.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_file: PathBuf,
    pub state_dir: PathBuf,
}

impl Paths {
    /// Resolve paths from environment, falling back to XDG/defaults.
    pub fn resolve() -> Self {
        let config_file = resolve_path(
            "PALCTL_CONFIG",
            dirs::config_dir().map(|p| p.join("palctl/config.json")),
            "~/.config/palctl/config.json",
        );
        let state_dir = resolve_path(
            "PALCTL_STATE_DIR",
            dirs::data_local_dir().map(|p| p.join("palctl")),
            "~/.local/share/palctl/",
        );

        Self {
            config_file,
            state_dir,
        }
    }

    /// Config file (`config.json`).
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Directory holding the persisted active server.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// File store for the active server inside the state directory.
    pub fn active_server_store(&self) -> FileStore {
        FileStore::in_dir(&self.state_dir)
    }
}

fn resolve_path(
    env_var: &str,
    xdg_default: Option<PathBuf>,
    fallback: &str,
) -> PathBuf {
    if let Ok(val) = std::env::var(env_var) {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }
    xdg_default.unwrap_or_else(|| expand_tilde(fallback))
}

fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_lives_in_state_dir() {
        let paths = Paths {
            config_file: PathBuf::from("/tmp/palctl/config.json"),
            state_dir: PathBuf::from("/tmp/palctl-state"),
        };
        assert_eq!(
            paths.active_server_store().path(),
            Path::new("/tmp/palctl-state/server-store.json")
        );
    }
}
