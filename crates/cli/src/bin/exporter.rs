//! `teuthology-exporter`: samples fleet (C8) and queue state on an interval
//! and serves them as Prometheus gauges (C9).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use teuthd_cli::wiring;
use teuthd_core::{MachineClass, SystemClock};
use teuthd_dispatcher::{QueueBackendKind, SUPERVISOR_BINARY_NAME};
use teuthd_fleet::FleetObserver;
use teuthd_metrics::{ExporterLoop, TeuthologyMetrics, EXPORTER_PORT};

#[derive(Debug, Parser)]
#[command(name = "teuthology-exporter")]
#[command(about = "Publish fleet and queue Prometheus gauges on an interval", long_about = None)]
struct Args {
    /// Seconds between publications; delivered at period boundaries, not
    /// slept between updates.
    #[arg(long, default_value_t = 60)]
    interval: u64,

    #[arg(long, default_value = "beanstalk")]
    queue_backend: String,

    #[arg(long)]
    queue_addr: Option<String>,

    #[arg(long)]
    report_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let args = Args::parse();

    let backend_kind = match args.queue_backend.as_str() {
        "beanstalk" => QueueBackendKind::Beanstalk,
        "report-http" => QueueBackendKind::ReportHttp,
        other => anyhow::bail!("unknown --queue-backend {other:?}, expected beanstalk or report-http"),
    };
    let queue_addr = wiring::queue_addr(&args.queue_addr);
    let report_base_url = wiring::lock_server_url(&args.report_base_url);

    // The exporter samples stats across every machine type the fleet scan
    // observes, not one fixed class; beanstalk's `stats-tube` takes the
    // class as a plain argument, so the tube this connection happens to
    // watch is irrelevant — "exporter" is a placeholder, never published.
    let queue = wiring::connect_queue(&backend_kind, &queue_addr, &report_base_url, MachineClass::from("exporter")).await?;

    let metrics = Arc::new(TeuthologyMetrics::new()?);
    let fleet = FleetObserver::new(SUPERVISOR_BINARY_NAME);
    let interval = Duration::from_secs(args.interval);
    let mut exporter_loop = ExporterLoop::new(metrics.clone(), fleet, queue, interval, SystemClock);

    // Either collaborator ending the process is terminal: a bind failure on
    // the server side, or ctrl-c observed by the publish loop.
    tokio::select! {
        result = teuthd_metrics::serve(metrics, EXPORTER_PORT) => result.map_err(anyhow::Error::from),
        _ = exporter_loop.run() => Ok(()),
    }
}
