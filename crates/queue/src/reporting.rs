//! The reporting service: a collaborator both backends push job status to,
//! independent of which one actually owns reserve/ack. The original calls
//! `report.try_push_job_info` unconditionally regardless of which queue
//! backend is configured — see
//! `examples/original_source/teuthology/dispatcher/__init__.py:186-190,207-213`,
//! where the push happens right after `get_queued_job` and again inside
//! `lock_machines`, with no branch on backend at all. Splitting this out of
//! [`crate::report_http::ReportHttpBackend`] is what lets the beanstalk
//! backend (whose `reserve`/`ack` never touch HTTP at all) still report
//! `fail`/`running` the same way.

use serde_json::json;

use teuthd_core::MachineClass;

use crate::error::QueueError;

pub struct ReportingClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReportingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn push_job_info(
        &self,
        job_id: &str,
        fields: &serde_json::Value,
        machine_class: &MachineClass,
    ) -> Result<(), QueueError> {
        let resp = self.client.post(self.url(&format!("jobs/{job_id}"))).json(fields).send().await?;
        if !resp.status().is_success() {
            return Err(QueueError::HttpStatus { status: resp.status(), machine_class: machine_class.clone() });
        }
        Ok(())
    }

    pub async fn mark_running(&self, job_id: &str, machine_class: &MachineClass) -> Result<(), QueueError> {
        self.push_job_info(job_id, &json!({ "status": "running" }), machine_class).await
    }

    pub async fn fail(&self, job_id: &str, reason: &str, machine_class: &MachineClass) -> Result<(), QueueError> {
        self.push_job_info(job_id, &json!({ "status": "fail", "failure_reason": reason }), machine_class).await
    }
}
