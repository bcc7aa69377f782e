//! The dispatcher's resolved configuration: CLI flags layered over the
//! on-disk overlay and environment fallbacks, following the precedence the
//! teacher uses in `oj-daemon::lifecycle::Config` (explicit flag, then env,
//! then a sensible default) — unlike the original's mutable process-global
//! `teuth_config`, this value is rebuilt from a fresh [`ConfigOverlay`] read
//! each loop iteration by [`teuthd_core::ConfigReloader`].

use std::path::PathBuf;

use teuthd_core::{ConfigOverlay, MachineClass};

use crate::env;

#[derive(Debug, Clone)]
pub enum QueueBackendKind {
    Beanstalk,
    ReportHttp,
}

/// Fallback binary directory when neither `--bin-path` nor a
/// `teuthology_path` overlay entry names one.
pub const DEFAULT_TEUTHOLOGY_PATH: &str = "/opt/teuthology/bin";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub machine_type: MachineClass,
    pub log_dir: PathBuf,
    pub archive_base: PathBuf,
    pub teuthology_path: PathBuf,
    pub exit_on_empty_queue: bool,
    pub queue_backend: QueueBackendKind,
    pub queue_addr: String,
    pub lock_server_url: String,
    pub report_base_url: String,
    pub verbose: bool,
}

impl DispatcherConfig {
    /// Applies a freshly-reloaded [`ConfigOverlay`] on top of whatever this
    /// config currently holds. Fields the overlay leaves unset are
    /// untouched; fields it does set win, since `archive_base`,
    /// `teuthology_path`, and `lock_server_url` are exactly the three the
    /// operator expects to be able to hot-reload without restarting the
    /// dispatcher.
    pub fn apply_overlay(&mut self, overlay: &ConfigOverlay) {
        if let Some(archive_base) = &overlay.archive_base {
            self.archive_base = archive_base.clone();
        }
        if let Some(teuthology_path) = &overlay.teuthology_path {
            self.teuthology_path = teuthology_path.clone();
        }
        if let Some(lock_server_url) = &overlay.lock_server_url {
            self.lock_server_url = lock_server_url.clone();
        }
    }

    pub fn config_overlay_path() -> PathBuf {
        env::config_path_override().unwrap_or_else(env::default_config_path)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
