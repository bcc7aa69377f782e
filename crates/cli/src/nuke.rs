//! Thin HTTP collaborator for [`NukeClient`](teuthd_dispatcher::NukeClient):
//! release a job's leased targets back to the lock server. The actual
//! teardown (SSH into each target, reset state, possibly reimage) lives
//! entirely on the lock server side — this crate only ever makes the one
//! HTTP call, the same way [`teuthd_lease::HttpMachineLeaser`] only ever
//! makes the `lock_many` call.

use teuthd_core::JobConfig;
use teuthd_dispatcher::NukeClient;

pub struct HttpNukeClient {
    client: reqwest::Client,
    base_url: parking_lot::Mutex<String>,
}

impl HttpNukeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: parking_lot::Mutex::new(base_url.into()) }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.lock().trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl NukeClient for HttpNukeClient {
    /// Best-effort by contract: every failure is logged here and swallowed,
    /// never propagated, so a nuke problem never blocks the `fail` report
    /// that always follows it in the dispatcher loop.
    async fn nuke(&self, config: &JobConfig) {
        let machines: Vec<&str> = config.targets.keys().map(String::as_str).collect();
        if machines.is_empty() {
            return;
        }
        let result = self
            .client
            .post(self.url("nodes/unlock_many"))
            .json(&serde_json::json!({ "machines": machines }))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), job_id = %config.job_id, "nuke request rejected by lock server");
            }
            Err(error) => {
                tracing::warn!(%error, job_id = %config.job_id, "nuke request failed");
            }
        }
    }

    fn update_base_url(&self, url: &str) {
        *self.base_url.lock() = url.to_string();
    }
}
