//! Small plain-data types shared across dispatcher, queue, lease and fleet
//! crates that don't warrant their own module.

use serde::{Deserialize, Serialize};

/// Queue length and pause state for one machine class, as returned by
/// `QueueBackend::stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub count: u64,
    pub paused: bool,
}
