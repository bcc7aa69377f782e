#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// The descriptor is malformed or not runnable here. The caller drops
    /// it without machine leasing, archiving, or reporting.
    #[error("skipping job: {0}")]
    SkipJob(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to create archive directory {path}: {source}")]
    CreateDir { path: std::path::PathBuf, source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    WriteFile { path: std::path::PathBuf, source: std::io::Error },

    #[error("failed to serialize job config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn supervisor process: {0}")]
    Spawn(#[from] std::io::Error),
}
