//! C7: the dispatcher's main loop — the ten-step iteration of spec.md §4.7.
//! Mirrors the teacher's separation between a fatal pre-loop phase
//! (`oj-daemon::lifecycle`) and a per-job swallow-and-continue loop body
//! (`oj-daemon::engine::executor`): nothing inside `tick` can abort `run`.

use std::sync::Arc;
use std::time::Duration;

use teuthd_core::{ConfigReloader, JobDescriptor, SentinelAction, SentinelWatcher};
use teuthd_lease::MachineLeaser;
use teuthd_queue::QueueBackend;

use crate::archive::ArchiveWriter;
use crate::config::DispatcherConfig;
use crate::error::PrepareError;
use crate::prepare::JobPreparer;
use crate::spawn::{NukeClient, SupervisorHandle, SupervisorSpawner};

const RESERVE_TIMEOUT: Duration = Duration::from_secs(60);

pub enum TickOutcome {
    Continue,
    Restart,
    Stop,
}

pub struct DispatcherLoop {
    config: DispatcherConfig,
    queue: Arc<dyn QueueBackend>,
    leaser: Arc<dyn MachineLeaser>,
    preparer: JobPreparer,
    archive_writer: ArchiveWriter,
    nuke: Arc<dyn NukeClient>,
    sentinel: SentinelWatcher,
    reloader: ConfigReloader,
    job_procs: Vec<SupervisorHandle>,
    result_proc: Option<tokio::process::Child>,
    keep_running: bool,
}

impl DispatcherLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatcherConfig,
        queue: Arc<dyn QueueBackend>,
        leaser: Arc<dyn MachineLeaser>,
        preparer: JobPreparer,
        archive_writer: ArchiveWriter,
        nuke: Arc<dyn NukeClient>,
        sentinel: SentinelWatcher,
        reloader: ConfigReloader,
    ) -> Self {
        Self {
            config,
            queue,
            leaser,
            preparer,
            archive_writer,
            nuke,
            sentinel,
            reloader,
            job_procs: Vec::new(),
            result_proc: None,
            keep_running: true,
        }
    }

    /// Runs until a stop sentinel, `stop_worker`, or `--exit-on-empty-queue`
    /// ends the loop, or a restart sentinel is observed. Returns the exit
    /// code: `max` over already-exited supervisor return codes, or `None`
    /// when a restart should happen (the caller execs and never returns).
    pub async fn run(&mut self) -> Option<i32> {
        loop {
            match self.tick().await {
                TickOutcome::Continue => continue,
                TickOutcome::Stop => return Some(self.exit_code()),
                TickOutcome::Restart => return None,
            }
        }
    }

    fn exit_code(&mut self) -> i32 {
        self.job_procs
            .iter_mut()
            .filter_map(|h| h.poll_exit_code())
            .fold(0, i32::max)
    }

    /// One iteration of the ten-step loop. `Continue` means "loop again
    /// immediately"; callers that only want a single step (e.g. tests) can
    /// call this directly instead of `run`.
    pub async fn tick(&mut self) -> TickOutcome {
        // Step 1: reap result_proc.
        if let Some(proc) = self.result_proc.as_mut() {
            if let Ok(Some(status)) = proc.try_wait() {
                tracing::debug!(code = status.code(), "teuthology-results exited");
                self.result_proc = None;
            }
        }

        // Step 2: sentinels, restart before stop.
        match self.sentinel.classify() {
            SentinelAction::Restart => return TickOutcome::Restart,
            SentinelAction::Stop => return TickOutcome::Stop,
            SentinelAction::None => {}
        }
        if !self.keep_running {
            return TickOutcome::Stop;
        }

        // Step 3: reload the on-disk overlay and fold it over the config
        // this loop started with. A parse failure keeps the last-known-good
        // overlay and only logs; it never aborts the tick. The fresh values
        // are then pushed into every collaborator that captured its own
        // copy at construction — folding them only into `self.config`
        // would leave `preparer`/`archive_writer`/`leaser`/`nuke` reading
        // stale paths and URLs forever.
        if let Err(err) = self.reloader.reload() {
            tracing::warn!(error = %err, "config overlay reload failed, keeping previous values");
        }
        self.config.apply_overlay(&self.reloader.current());
        self.preparer.apply_live_config(self.config.archive_base.clone(), &self.config.teuthology_path);
        self.archive_writer.set_archive_base(self.config.archive_base.clone());
        self.leaser.update_base_url(&self.config.lock_server_url);
        self.nuke.update_base_url(&self.config.lock_server_url);

        // Step 4: reap job_procs.
        self.job_procs.retain_mut(|h| h.poll_exit_code().is_none());

        // Step 5: reserve.
        let descriptor = match self.queue.reserve(RESERVE_TIMEOUT).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                if self.config.exit_on_empty_queue {
                    return TickOutcome::Stop;
                }
                return TickOutcome::Continue;
            }
            Err(err) => {
                tracing::warn!(error = %err, "queue reserve failed, retrying");
                return TickOutcome::Continue;
            }
        };

        self.handle_descriptor(descriptor).await;

        if !self.keep_running {
            return TickOutcome::Stop;
        }
        TickOutcome::Continue
    }

    async fn handle_descriptor(&mut self, descriptor: JobDescriptor) {
        // Step 6.
        if descriptor.stop_worker {
            self.keep_running = false;
        }

        // Step 7.
        let (mut config, bin_path) = match self.preparer.prepare(descriptor) {
            Ok(pair) => pair,
            Err(PrepareError::SkipJob(reason)) => {
                tracing::info!(reason = %reason, "skipping job");
                return;
            }
        };

        // Step 8.
        if !config.roles.is_empty() {
            if let Err(err) = self.queue.mark_running(&descriptor_from(&config)).await {
                tracing::warn!(error = %err, "failed to push running status before leasing");
            }
            if let Err(err) = self.leaser.lease(&mut config).await {
                tracing::warn!(error = %err, job_id = %config.job_id, "machine lease failed");
                self.report_fail(&config, &err.to_string()).await;
                return;
            }
        }

        // Step 9: C5, C6, ack.
        if let Err(err) = self.archive_writer.write(&config.name, &config.job_id, &config) {
            tracing::warn!(error = %err, job_id = %config.job_id, "archive creation failed");
            self.report_fail(&config, &err.to_string()).await;
            return;
        }

        let job_config_path = self.archive_writer.orig_config_path(&config.name, &config.job_id);
        match SupervisorSpawner::spawn(&bin_path, &self.config.archive_base, &job_config_path, &config) {
            Ok(handle) => {
                tracing::info!(pid = handle.pid, job_id = %config.job_id, "spawned supervisor");
                self.job_procs.push(handle);
                if let Err(err) = self.queue.ack(&descriptor_from(&config)).await {
                    tracing::warn!(error = %err, job_id = %config.job_id, "failed to ack job");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, job_id = %config.job_id, "failed to spawn supervisor");
                if config.has_targets() {
                    self.nuke.nuke(&config).await;
                }
                self.report_fail(&config, "Saw error while trying to spawn supervisor.").await;
            }
        }
    }

    async fn report_fail(&self, config: &teuthd_core::JobConfig, reason: &str) {
        if let Err(err) = self.queue.fail(&descriptor_from(config), reason).await {
            tracing::warn!(error = %err, job_id = %config.job_id, "failed to report job failure");
        }
    }
}

/// `QueueClient::ack`/`fail` address a [`JobDescriptor`], but by the time we
/// know whether a job needs leasing or archiving we only hold its prepared
/// [`JobConfig`] — round-trip the fields the queue backends actually use.
fn descriptor_from(config: &teuthd_core::JobConfig) -> JobDescriptor {
    JobDescriptor {
        job_id: config.job_id.clone(),
        name: config.name.clone(),
        machine_type: Some(config.machine_type.clone()),
        roles: config.roles.clone(),
        stop_worker: false,
        status: None,
        targets: config.targets.clone(),
        extra: config.extra.clone(),
    }
}

#[cfg(test)]
#[path = "loop_tests.rs"]
mod tests;
