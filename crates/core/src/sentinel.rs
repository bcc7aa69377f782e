//! Filesystem sentinel classification.
//!
//! Operators "arm" a dispatcher by touching a marker file; only files whose
//! mtime is strictly after the dispatcher's own start time have any effect,
//! so a dispatcher that starts after an armed sentinel does not immediately
//! self-terminate. Restart takes precedence over stop — both may be armed
//! simultaneously during operator upgrades.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_RESTART_PATH: &str = "/tmp/teuthology-restart-dispatcher";
pub const DEFAULT_STOP_PATH: &str = "/tmp/teuthology-stop-dispatcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelAction {
    Restart,
    Stop,
    None,
}

pub struct SentinelWatcher {
    restart_path: PathBuf,
    stop_path: PathBuf,
    start_time: SystemTime,
}

impl SentinelWatcher {
    pub fn new(start_time: SystemTime) -> Self {
        Self::with_paths(DEFAULT_RESTART_PATH.into(), DEFAULT_STOP_PATH.into(), start_time)
    }

    pub fn with_paths(restart_path: PathBuf, stop_path: PathBuf, start_time: SystemTime) -> Self {
        Self { restart_path, stop_path, start_time }
    }

    pub fn classify(&self) -> SentinelAction {
        if Self::armed(&self.restart_path, self.start_time) {
            SentinelAction::Restart
        } else if Self::armed(&self.stop_path, self.start_time) {
            SentinelAction::Stop
        } else {
            SentinelAction::None
        }
    }

    fn armed(path: &Path, start_time: SystemTime) -> bool {
        match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(mtime) => mtime > start_time,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "sentinel_tests.rs"]
mod tests;
