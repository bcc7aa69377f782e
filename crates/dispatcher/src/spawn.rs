//! C6: build the supervisor command line, spawn it, and track the child.
//! Spawn failure triggers the nuke-then-fail-report path described in
//! spec.md §7; the nuke (machine teardown) subsystem itself is an external
//! collaborator behind [`NukeClient`].

use std::path::{Path, PathBuf};

use teuthd_core::JobConfig;

use crate::error::SpawnError;

pub const SUPERVISOR_BINARY_NAME: &str = "teuthology-dispatcher";

#[async_trait::async_trait]
pub trait NukeClient: Send + Sync {
    /// Best-effort release of a job's leased targets. Failures are logged
    /// by the caller, never propagated — a failed nuke must not block the
    /// `fail` report that follows it.
    async fn nuke(&self, config: &JobConfig);

    /// Called once per loop tick with the freshly-reloaded lock server URL,
    /// so a long-lived client can keep talking to the right host across a
    /// config overlay change without the dispatcher loop restarting it.
    /// Collaborators with nothing to update (fakes, anything stateless)
    /// keep the default no-op.
    fn update_base_url(&self, _url: &str) {}
}

/// Tracks one spawned supervisor child for PID-based reaping.
pub struct SupervisorHandle {
    pub job_id: teuthd_core::JobId,
    child: tokio::process::Child,
    pub pid: u32,
}

impl SupervisorHandle {
    /// `Some(code)` once the child has exited (never blocks); `None` while
    /// still running.
    pub fn poll_exit_code(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(1)),
            Ok(None) => None,
            Err(_) => Some(1),
        }
    }
}

pub struct SupervisorSpawner;

impl SupervisorSpawner {
    /// `archive_dir` is the dispatcher-wide archive base (not the per-job
    /// archive path) — it matches the original's `--archive-dir` flag,
    /// which is always the top-level directory.
    pub fn spawn(
        bin_path: &Path,
        archive_dir: &Path,
        job_config_path: &Path,
        config: &JobConfig,
    ) -> Result<SupervisorHandle, SpawnError> {
        let binary = bin_path.join(SUPERVISOR_BINARY_NAME);
        let child = tokio::process::Command::new(&binary)
            .arg("--supervisor")
            .arg("-v")
            .arg("--bin-path")
            .arg(bin_path)
            .arg("--archive-dir")
            .arg(archive_dir)
            .arg("--job-config")
            .arg(job_config_path)
            .kill_on_drop(false)
            .spawn()?;

        let pid = child.id().unwrap_or(0);
        Ok(SupervisorHandle { job_id: config.job_id.clone(), child, pid })
    }

    /// The exact argument vector `spawn` would launch, for logging and
    /// tests without actually spawning a process.
    pub fn argv(bin_path: &Path, archive_dir: &Path, job_config_path: &Path) -> Vec<PathBuf> {
        vec![
            bin_path.join(SUPERVISOR_BINARY_NAME),
            "--supervisor".into(),
            "-v".into(),
            "--bin-path".into(),
            bin_path.to_path_buf(),
            "--archive-dir".into(),
            archive_dir.to_path_buf(),
            "--job-config".into(),
            job_config_path.to_path_buf(),
        ]
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
