//! `teuthology-dispatcher`: the fleet's C7 loop entry point. The same
//! binary name the loop itself launches per job with `--supervisor`, but
//! that branch is a documented stub here — supervisor task execution is a
//! separate, out-of-scope binary's job; this one only needs to recognize
//! the flag well enough to fail loudly rather than silently misbehave if
//! something ever launches this particular build that way.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use clap::{Parser, ValueEnum};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use teuthd_cli::{wiring, HttpNukeClient};
use teuthd_core::{ConfigReloader, MachineClass, SentinelWatcher};
use teuthd_dispatcher::{
    ArchiveWriter, DispatcherConfig, DispatcherLoop, FixedSupervisorBinaryResolver, JobPreparer,
    QueueBackendKind as DispatcherQueueBackendKind, DEFAULT_TEUTHOLOGY_PATH,
};
use teuthd_lease::HttpMachineLeaser;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueueBackendArg {
    Beanstalk,
    ReportHttp,
}

impl From<QueueBackendArg> for DispatcherQueueBackendKind {
    fn from(arg: QueueBackendArg) -> Self {
        match arg {
            QueueBackendArg::Beanstalk => DispatcherQueueBackendKind::Beanstalk,
            QueueBackendArg::ReportHttp => DispatcherQueueBackendKind::ReportHttp,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "teuthology-dispatcher")]
#[command(about = "Watch a machine class's queue and spawn supervisors for its jobs", long_about = None)]
struct Args {
    /// Run as a per-job supervisor instead of the fleet dispatcher loop.
    /// Not implemented by this binary — supervisor task execution is a
    /// separate program's responsibility.
    #[arg(long)]
    supervisor: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    machine_type: Option<String>,

    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long)]
    archive_dir: Option<PathBuf>,

    #[arg(long)]
    exit_on_empty_queue: bool,

    #[arg(long, value_enum, default_value_t = QueueBackendArg::Beanstalk)]
    queue_backend: QueueBackendArg,

    #[arg(long)]
    queue_addr: Option<String>,

    #[arg(long)]
    lock_server_url: Option<String>,

    #[arg(long)]
    report_base_url: Option<String>,

    /// Accepted so argv parses when this binary is invoked the way
    /// `SupervisorSpawner` invokes a real supervisor; unused outside
    /// `--supervisor`.
    #[arg(long)]
    bin_path: Option<PathBuf>,

    #[arg(long)]
    job_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.supervisor {
        eprintln!(
            "--supervisor is not implemented by teuthology-dispatcher; \
             the supervisor's inner task execution is a separate program."
        );
        std::process::exit(2);
    }

    let machine_type = args
        .machine_type
        .clone()
        .map(MachineClass::from)
        .ok_or_else(|| anyhow::anyhow!("--machine-type is required"))?;
    let log_dir = args.log_dir.clone().unwrap_or_else(std::env::temp_dir);

    // One fixed-name file per (machine_type, pid), no rotation — an
    // operator's log shipper is expected to own rotation/retention.
    let log_path = log_dir.join(format!("dispatcher.{}.{}", machine_type.as_str(), std::process::id()));
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(std::sync::Mutex::new(log_file)))
        .with_env_filter(filter)
        .init();

    let _span = tracing::info_span!("dispatcher", machine_type = %machine_type).entered();

    let overlay = wiring::load_overlay();
    let archive_base = args
        .archive_dir
        .or_else(|| overlay.archive_base.clone())
        .ok_or_else(|| anyhow::anyhow!("--archive-dir is required (or set archive_base in the config overlay)"))?;
    let lock_server_url = wiring::lock_server_url(&args.lock_server_url);
    let report_base_url = args.report_base_url.unwrap_or_else(|| lock_server_url.clone());
    let queue_addr = wiring::queue_addr(&args.queue_addr);

    let mut config = DispatcherConfig {
        machine_type: machine_type.clone(),
        log_dir: args.log_dir.unwrap_or_else(std::env::temp_dir),
        archive_base: archive_base.clone(),
        teuthology_path: overlay.teuthology_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_TEUTHOLOGY_PATH)),
        exit_on_empty_queue: args.exit_on_empty_queue,
        queue_backend: args.queue_backend.into(),
        queue_addr,
        lock_server_url,
        report_base_url,
        verbose: args.verbose,
    };
    config.apply_overlay(&overlay);

    let queue =
        wiring::connect_queue(&config.queue_backend, &config.queue_addr, &config.report_base_url, machine_type)
            .await?;
    let leaser = Arc::new(HttpMachineLeaser::new(config.lock_server_url.clone()));
    let preparer = JobPreparer::new(
        Arc::new(FixedSupervisorBinaryResolver::new(config.teuthology_path.clone())),
        config.archive_base.clone(),
    );
    let archive_writer = ArchiveWriter::new(config.archive_base.clone());
    let nuke = Arc::new(HttpNukeClient::new(config.lock_server_url.clone()));
    let sentinel = SentinelWatcher::new(SystemTime::now());
    let reloader = ConfigReloader::new(DispatcherConfig::config_overlay_path());

    let mut dispatcher_loop =
        DispatcherLoop::new(config, queue, leaser, preparer, archive_writer, nuke, sentinel, reloader);

    match dispatcher_loop.run().await {
        Some(code) => std::process::exit(code),
        None => {
            tracing::info!("restart sentinel observed, re-executing");
            teuthd_dispatcher::exec_self()?;
            unreachable!("exec_self only returns on error");
        }
    }
}
