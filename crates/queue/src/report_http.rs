//! Stateless HTTP backend talking to the reporting service: one call per
//! operation, no persistent connection. Mirrors the original's
//! `teuthology.report` module (a thin `requests` wrapper) using `reqwest`.

use serde::Serialize;

use teuthd_core::{JobDescriptor, MachineClass, QueueStats};

use crate::error::QueueError;
use crate::reporting::ReportingClient;
use crate::QueueBackend;

pub struct ReportHttpBackend {
    client: reqwest::Client,
    base_url: String,
    machine_class: MachineClass,
    reporting: ReportingClient,
}

impl ReportHttpBackend {
    pub fn new(base_url: impl Into<String>, machine_class: MachineClass) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            reporting: ReportingClient::new(base_url.clone()),
            base_url,
            machine_class,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// The original's `clean_config`: drop the `status` key unconditionally and
/// any key whose value is null, before the descriptor goes anywhere else
/// (including back into the `extra` map it will eventually be re-serialized
/// from).
pub fn clean_config(mut descriptor: JobDescriptor) -> JobDescriptor {
    descriptor.status = None;
    descriptor.extra.retain(|_, v| !v.is_null());
    descriptor
}

#[async_trait::async_trait]
impl QueueBackend for ReportHttpBackend {
    async fn reserve(
        &self,
        _timeout: std::time::Duration,
    ) -> Result<Option<JobDescriptor>, QueueError> {
        let resp = self
            .client
            .get(self.url(&format!("nodes/{}/next_queued_job", self.machine_class.as_str())))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(QueueError::HttpStatus {
                status: resp.status(),
                machine_class: self.machine_class.clone(),
            });
        }
        let body = resp.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        let descriptor: JobDescriptor = serde_json::from_slice(&body)
            .map_err(|e| QueueError::Protocol(format!("bad job payload: {e}")))?;
        let descriptor = clean_config(descriptor);
        self.reporting.mark_running(descriptor.job_id.as_str(), &self.machine_class).await?;
        Ok(Some(descriptor))
    }

    async fn ack(&self, _descriptor: &JobDescriptor) -> Result<(), QueueError> {
        // No report call on a successful handoff: the reporting service
        // already saw `running` (once at reserve, once more from
        // `mark_running` if the job leased machines) and nothing further is
        // expected until the supervisor itself reports a terminal status.
        Ok(())
    }

    async fn fail(&self, descriptor: &JobDescriptor, reason: &str) -> Result<(), QueueError> {
        self.reporting.fail(descriptor.job_id.as_str(), reason, &self.machine_class).await
    }

    async fn mark_running(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        self.reporting.mark_running(descriptor.job_id.as_str(), &self.machine_class).await
    }

    async fn stats(&self, machine_class: &MachineClass) -> Result<QueueStats, QueueError> {
        let resp = self
            .client
            .get(self.url(&format!("nodes/{}/stats", machine_class.as_str())))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(QueueError::HttpStatus {
                status: resp.status(),
                machine_class: machine_class.clone(),
            });
        }
        Ok(resp.json::<QueueStatsBody>().await?.into())
    }

    async fn pause(&self, machine_class: &MachineClass, paused: bool, by: &str) -> Result<(), QueueError> {
        #[derive(Serialize)]
        struct PauseBody<'a> {
            paused: bool,
            paused_by: &'a str,
        }
        let resp = self
            .client
            .post(self.url(&format!("nodes/{}/pause_queue", machine_class.as_str())))
            .json(&PauseBody { paused, paused_by: by })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(QueueError::HttpStatus {
                status: resp.status(),
                machine_class: machine_class.clone(),
            });
        }
        Ok(())
    }
}

#[derive(serde::Deserialize)]
struct QueueStatsBody {
    count: u64,
    paused: bool,
}

impl From<QueueStatsBody> for QueueStats {
    fn from(body: QueueStatsBody) -> Self {
        QueueStats { count: body.count, paused: body.paused }
    }
}
