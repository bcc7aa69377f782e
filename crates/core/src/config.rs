//! Process-wide configuration, loaded once at entry and reloaded from an
//! on-disk overlay under a short critical section.
//!
//! The original system treats configuration as a mutable process-global
//! (`teuth_config`); here it is an explicit, owned value plus a
//! [`ConfigReloader`] handle that re-reads the overlay file and swaps it in,
//! so every dispatcher-loop iteration sees a consistent snapshot.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

/// Overlay fields that may be supplied on disk instead of (or in addition
/// to) the command line. CLI flags always win when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub archive_base: Option<PathBuf>,
    pub teuthology_path: Option<PathBuf>,
    pub lock_server_url: Option<String>,
}

impl ConfigOverlay {
    /// Read `<state_dir>/dispatcher.toml`, or `$TEUTHD_CONFIG` if set.
    /// Missing files are not an error — they simply produce an empty
    /// overlay, matching the original's tolerance for an unconfigured
    /// `teuth_config`.
    pub fn load(default_path: &std::path::Path) -> Result<Self, ConfigError> {
        let path = std::env::var_os("TEUTHD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_path.to_path_buf());

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigOverlay::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config overlay {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config overlay {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Reloads the configuration overlay under a short critical section each
/// loop iteration, swapping the owned value in place. Readers always see a
/// fully-formed overlay, never a partial parse.
#[derive(Clone)]
pub struct ConfigReloader {
    path: PathBuf,
    current: Arc<Mutex<ConfigOverlay>>,
}

impl ConfigReloader {
    pub fn new(path: PathBuf) -> Self {
        Self { path, current: Arc::new(Mutex::new(ConfigOverlay::default())) }
    }

    /// Re-read the overlay from disk. On parse failure the previous overlay
    /// is kept and the error is returned to the caller to log; this mirrors
    /// the "never crash the loop over configuration" policy.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let fresh = ConfigOverlay::load(&self.path)?;
        *self.current.lock() = fresh;
        Ok(())
    }

    pub fn current(&self) -> ConfigOverlay {
        self.current.lock().clone()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
