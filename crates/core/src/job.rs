//! Job identifiers and the raw/prepared job data model.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque job identifier, as reserved from the queue. The original system
/// mixes integer and string job ids across backends; we normalize to a
/// string at the boundary and keep it opaque everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Label identifying a pool of interchangeable target hosts. One dispatcher
/// instance serves exactly one machine class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineClass(pub String);

impl MachineClass {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MachineClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MachineClass {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MachineClass {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single target role, e.g. `mon.0` or `client.1`. Jobs group roles into
/// sub-lists (one sub-list per leased machine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSpec(pub String);

impl RoleSpec {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleSpec {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleSpec {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The unit reserved from the queue: a raw job descriptor, not yet validated
/// or normalized. `extra` carries every key the queue body contained that
/// this dispatcher doesn't interpret directly; it is preserved verbatim so
/// the supervisor still receives the full original payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<MachineClass>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Vec<RoleSpec>>,
    #[serde(default)]
    pub stop_worker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub targets: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobDescriptor {
    /// Whether this descriptor carries leased-machine targets already
    /// (used to decide whether a spawn failure needs a nuke).
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// The prepared, normalized form of a [`JobDescriptor`]: computed
/// `archive_path`, a fully resolved machine class, and (after leasing)
/// concrete machine identifiers filled into `roles`.
///
/// Invariant: `archive_path` is inside the configured archive base and its
/// final path component is `name` filtered through [`crate::archive::munge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_id: JobId,
    pub name: String,
    pub machine_type: MachineClass,
    pub archive_path: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Vec<RoleSpec>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub targets: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobConfig {
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
