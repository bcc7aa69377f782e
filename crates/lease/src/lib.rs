//! Machine leasing: turn a [`JobConfig`] with unresolved `roles` into one
//! whose `targets` map names a concrete machine for every role. The lock
//! service itself — and reimaging — are external collaborators; this crate
//! only specifies the request/response contract the dispatcher loop needs.
//!
//! Pushing `status=running` before blocking on a lease is the caller's job
//! (`QueueClient::ack`, issued by the dispatcher loop), not this crate's —
//! see DESIGN.md for why that push isn't threaded through here.

mod error;

pub use error::LeaseError;

use serde::Deserialize;
use serde_json::json;

use teuthd_core::JobConfig;

#[async_trait::async_trait]
pub trait MachineLeaser: Send + Sync {
    /// Block until every role sub-list in `config.roles` has a leased
    /// machine, or a non-retryable error occurs, filling `config.targets`
    /// in place. Reimaging is always disabled. Mutating in place (rather
    /// than consuming and returning `config`) means a caller still has the
    /// full config to report a failure against even when this returns
    /// `Err`. A `config` with empty `roles` is left untouched.
    async fn lease(&self, config: &mut JobConfig) -> Result<(), LeaseError>;

    /// Called once per loop tick with the freshly-reloaded lock server URL.
    /// Collaborators with nothing to update (fakes) keep the default no-op.
    fn update_base_url(&self, _url: &str) {}
}

pub struct HttpMachineLeaser {
    client: reqwest::Client,
    base_url: parking_lot::Mutex<String>,
}

impl HttpMachineLeaser {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: parking_lot::Mutex::new(base_url.into()) }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.lock().trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[derive(Deserialize)]
struct LockManyResponse {
    machines: Vec<String>,
}

#[async_trait::async_trait]
impl MachineLeaser for HttpMachineLeaser {
    async fn lease(&self, config: &mut JobConfig) -> Result<(), LeaseError> {
        let wanted = config.roles.len();
        if wanted == 0 {
            return Ok(());
        }

        let resp = self
            .client
            .post(self.url("nodes/lock_many"))
            .json(&json!({
                "count": wanted,
                "machine_type": config.machine_type.as_str(),
                "reimage": false,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LeaseError::HttpStatus {
                status: resp.status(),
                machine_class: config.machine_type.clone(),
            });
        }

        let body: LockManyResponse = resp.json().await?;
        if body.machines.len() < wanted {
            return Err(LeaseError::NotEnoughMachines { requested: wanted, leased: body.machines.len() });
        }

        for (sub_list, machine) in config.roles.iter().zip(body.machines.iter()) {
            let role_names: Vec<&str> = sub_list.iter().map(|r| r.as_str()).collect();
            config.targets.insert(machine.clone(), role_names.join(","));
        }

        Ok(())
    }

    fn update_base_url(&self, url: &str) {
        *self.base_url.lock() = url.to_string();
    }
}

/// Fixed-response leaser for tests: either a machine pool cycled through
/// round-robin, or a fixed error.
pub struct FakeMachineLeaser {
    outcome: FakeOutcome,
}

enum FakeOutcome {
    Machines(Vec<String>),
    AlwaysFails,
}

impl FakeMachineLeaser {
    pub fn with_machines(machines: Vec<String>) -> Self {
        Self { outcome: FakeOutcome::Machines(machines) }
    }

    pub fn always_fails() -> Self {
        Self { outcome: FakeOutcome::AlwaysFails }
    }
}

#[async_trait::async_trait]
impl MachineLeaser for FakeMachineLeaser {
    async fn lease(&self, config: &mut JobConfig) -> Result<(), LeaseError> {
        let wanted = config.roles.len();
        if wanted == 0 {
            return Ok(());
        }
        match &self.outcome {
            FakeOutcome::AlwaysFails => Err(LeaseError::NotEnoughMachines { requested: wanted, leased: 0 }),
            FakeOutcome::Machines(pool) => {
                if pool.len() < wanted {
                    return Err(LeaseError::NotEnoughMachines { requested: wanted, leased: pool.len() });
                }
                for (sub_list, machine) in config.roles.iter().zip(pool.iter()) {
                    let role_names: Vec<&str> = sub_list.iter().map(|r| r.as_str()).collect();
                    config.targets.insert(machine.clone(), role_names.join(","));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
