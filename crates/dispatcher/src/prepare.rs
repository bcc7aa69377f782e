//! C3: turn a raw [`JobDescriptor`] into a validated, normalized
//! [`JobConfig`] plus the supervisor bin-path directory to invoke it from.
//! Computing where that checkout lives (a fetched auxiliary package, or a
//! configured override) is delegated to a [`SupervisorBinaryResolver`] — the
//! fetch itself is an external collaborator this crate never touches.

use std::path::{Path, PathBuf};

use teuthd_core::{ArchivePaths, JobConfig, JobDescriptor};

use crate::error::PrepareError;

pub trait SupervisorBinaryResolver: Send + Sync {
    /// Returns the directory a `teuthology-dispatcher` binary can be found
    /// in (joined with the binary name by the spawner, and also passed
    /// through as `--bin-path`), or a human-readable reason it could not be
    /// resolved.
    fn resolve(&self) -> Result<PathBuf, String>;

    /// Called once per loop tick with the freshly-reloaded `teuthology_path`
    /// overlay value. Only [`FixedSupervisorBinaryResolver`] has anything to
    /// update; a resolver backed by a fetched checkout ignores this.
    fn update_override_path(&self, _path: &Path) {}
}

/// Resolver returning a fixed, configured path — the "configured override"
/// branch of the original's binary resolution; used whenever an operator
/// sets `teuthology_path` rather than relying on a fetched checkout.
pub struct FixedSupervisorBinaryResolver {
    path: parking_lot::Mutex<PathBuf>,
}

impl FixedSupervisorBinaryResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: parking_lot::Mutex::new(path.into()) }
    }
}

impl SupervisorBinaryResolver for FixedSupervisorBinaryResolver {
    fn resolve(&self) -> Result<PathBuf, String> {
        Ok(self.path.lock().clone())
    }

    fn update_override_path(&self, path: &Path) {
        *self.path.lock() = path.to_path_buf();
    }
}

pub struct JobPreparer {
    resolver: std::sync::Arc<dyn SupervisorBinaryResolver>,
    archive_base: PathBuf,
}

impl JobPreparer {
    pub fn new(resolver: std::sync::Arc<dyn SupervisorBinaryResolver>, archive_base: impl Into<PathBuf>) -> Self {
        Self { resolver, archive_base: archive_base.into() }
    }

    /// Folds the freshly-reloaded `archive_base`/`teuthology_path` overlay
    /// values in before the next `prepare` call, so a hot-reload actually
    /// reaches the paths this computes rather than only the flag passed to
    /// the spawned supervisor.
    pub fn apply_live_config(&mut self, archive_base: impl Into<PathBuf>, teuthology_path: &Path) {
        self.archive_base = archive_base.into();
        self.resolver.update_override_path(teuthology_path);
    }

    /// Normalizes keys (strips `status`, drops nil-valued extras).
    fn normalize(mut descriptor: JobDescriptor) -> JobDescriptor {
        descriptor.status = None;
        descriptor.extra.retain(|_, v| !v.is_null());
        descriptor
    }

    pub fn prepare(&self, descriptor: JobDescriptor) -> Result<(JobConfig, PathBuf), PrepareError> {
        let descriptor = Self::normalize(descriptor);

        if descriptor.name.trim().is_empty() {
            return Err(PrepareError::SkipJob("job has no name".to_string()));
        }
        let machine_type = descriptor
            .machine_type
            .clone()
            .ok_or_else(|| PrepareError::SkipJob("job has no machine_type".to_string()))?;

        let bin_path = self
            .resolver
            .resolve()
            .map_err(|reason| PrepareError::SkipJob(format!("could not resolve supervisor binary: {reason}")))?;

        let paths = ArchivePaths::new(&self.archive_base, &descriptor.name, &descriptor.job_id);

        let config = JobConfig {
            job_id: descriptor.job_id,
            name: descriptor.name,
            machine_type,
            archive_path: paths.job_dir,
            roles: descriptor.roles,
            targets: descriptor.targets,
            extra: descriptor.extra,
        };

        Ok((config, bin_path))
    }
}

#[cfg(test)]
#[path = "prepare_tests.rs"]
mod tests;
