//! Shared startup plumbing for both binaries: resolve the on-disk config
//! overlay and stand up a concrete [`QueueBackend`] for whichever
//! `--queue-backend` the operator picked.

use std::sync::Arc;

use teuthd_core::{ConfigOverlay, MachineClass};
use teuthd_dispatcher::{env, QueueBackendKind};
use teuthd_queue::{BeanstalkBackend, QueueBackend, QueueClient, ReportHttpBackend};

pub fn load_overlay() -> ConfigOverlay {
    let path = teuthd_dispatcher::DispatcherConfig::config_overlay_path();
    match ConfigOverlay::load(&path) {
        Ok(overlay) => overlay,
        Err(error) => {
            tracing::warn!(%error, "failed to load config overlay, proceeding with defaults");
            ConfigOverlay::default()
        }
    }
}

/// Connects the queue backend named by `kind`, watching `machine_class`'s
/// tube when that's meaningful (beanstalk) or simply scoping HTTP calls to
/// it (report-http).
pub async fn connect_queue(
    kind: &QueueBackendKind,
    queue_addr: &str,
    report_base_url: &str,
    machine_class: MachineClass,
) -> anyhow::Result<Arc<dyn QueueBackend>> {
    let client = match kind {
        QueueBackendKind::Beanstalk => {
            QueueClient::Beanstalk(BeanstalkBackend::connect(queue_addr, machine_class, report_base_url).await?)
        }
        QueueBackendKind::ReportHttp => {
            QueueClient::ReportHttp(ReportHttpBackend::new(report_base_url, machine_class))
        }
    };
    Ok(client.into_backend())
}

pub fn lock_server_url(flag: &Option<String>) -> String {
    flag.clone()
        .or_else(env::lock_server_url_override)
        .unwrap_or_else(|| "http://localhost:8080".to_string())
}

pub fn queue_addr(flag: &Option<String>) -> String {
    flag.clone().or_else(env::queue_addr_override).unwrap_or_else(|| "localhost:11300".to_string())
}
