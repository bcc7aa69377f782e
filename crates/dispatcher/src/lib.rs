//! The dispatcher core: C1 (sentinels, via `teuthd_core`), C3 (job
//! preparation), C5 (archive writer), C6 (supervisor spawner), and C7 (the
//! main loop tying them together).

pub mod archive;
pub mod config;
pub mod env;
pub mod error;
pub mod loop_;
pub mod prepare;
pub mod restart;
pub mod spawn;

pub use archive::ArchiveWriter;
pub use config::{DispatcherConfig, QueueBackendKind, DEFAULT_TEUTHOLOGY_PATH};
pub use error::{ArchiveError, PrepareError, SpawnError};
pub use loop_::{DispatcherLoop, TickOutcome};
pub use prepare::{FixedSupervisorBinaryResolver, JobPreparer, SupervisorBinaryResolver};
pub use restart::exec_self;
pub use spawn::{NukeClient, SupervisorHandle, SupervisorSpawner, SUPERVISOR_BINARY_NAME};
