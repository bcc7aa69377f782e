//! C5: create the run and job archive directories and persist
//! `orig.config.yaml` — the exact [`JobConfig`] used to build the
//! supervisor's command line.

use teuthd_core::{ArchivePaths, JobConfig, JobId};

use crate::error::ArchiveError;

pub const ORIG_CONFIG_FILENAME: &str = "orig.config.yaml";

pub struct ArchiveWriter {
    archive_base: std::path::PathBuf,
}

impl ArchiveWriter {
    pub fn new(archive_base: impl Into<std::path::PathBuf>) -> Self {
        Self { archive_base: archive_base.into() }
    }

    /// Folds a freshly-reloaded `archive_base` overlay value in before the
    /// next `write`, so `orig.config.yaml` lands under the current base
    /// rather than the one this was constructed with.
    pub fn set_archive_base(&mut self, archive_base: impl Into<std::path::PathBuf>) {
        self.archive_base = archive_base.into();
    }

    /// Creates `<archive_base>/<munge(name)>/` and `<archive_path>/`
    /// (idempotent — both are created with `create_dir_all`), then writes
    /// `orig.config.yaml` into the job archive.
    pub fn write(&self, run_name: &str, job_id: &JobId, config: &JobConfig) -> Result<(), ArchiveError> {
        let paths = ArchivePaths::new(&self.archive_base, run_name, job_id);

        std::fs::create_dir_all(&paths.run_dir)
            .map_err(|source| ArchiveError::CreateDir { path: paths.run_dir.clone(), source })?;
        std::fs::create_dir_all(&paths.job_dir)
            .map_err(|source| ArchiveError::CreateDir { path: paths.job_dir.clone(), source })?;

        let yaml = serde_yaml::to_string(config)?;
        let config_path = paths.job_dir.join(ORIG_CONFIG_FILENAME);
        std::fs::write(&config_path, yaml)
            .map_err(|source| ArchiveError::WriteFile { path: config_path, source })?;
        Ok(())
    }

    pub fn orig_config_path(&self, run_name: &str, job_id: &JobId) -> std::path::PathBuf {
        ArchivePaths::new(&self.archive_base, run_name, job_id).job_dir.join(ORIG_CONFIG_FILENAME)
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
