#![allow(clippy::unwrap_used, clippy::expect_used)]
use super::*;
use std::sync::Mutex as StdMutex;

use teuthd_core::{ConfigReloader, JobId, MachineClass, SentinelWatcher};
use teuthd_lease::FakeMachineLeaser;
use teuthd_queue::QueueError;

use crate::config::QueueBackendKind;
use crate::prepare::FixedSupervisorBinaryResolver;

struct FakeQueue {
    descriptors: StdMutex<std::collections::VecDeque<Option<JobDescriptor>>>,
    acked: StdMutex<Vec<JobId>>,
    failed: StdMutex<Vec<(JobId, String)>>,
    marked_running: StdMutex<Vec<JobId>>,
}

impl FakeQueue {
    fn new(descriptors: Vec<Option<JobDescriptor>>) -> Self {
        Self {
            descriptors: StdMutex::new(descriptors.into()),
            acked: StdMutex::new(Vec::new()),
            failed: StdMutex::new(Vec::new()),
            marked_running: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl QueueBackend for FakeQueue {
    async fn reserve(&self, _timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        Ok(self.descriptors.lock().unwrap().pop_front().flatten())
    }
    async fn ack(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        self.acked.lock().unwrap().push(descriptor.job_id.clone());
        Ok(())
    }
    async fn fail(&self, descriptor: &JobDescriptor, reason: &str) -> Result<(), QueueError> {
        self.failed.lock().unwrap().push((descriptor.job_id.clone(), reason.to_string()));
        Ok(())
    }
    async fn stats(&self, _machine_class: &MachineClass) -> Result<teuthd_core::QueueStats, QueueError> {
        Ok(teuthd_core::QueueStats { count: 0, paused: false })
    }
    async fn pause(&self, _machine_class: &MachineClass, _paused: bool, _by: &str) -> Result<(), QueueError> {
        Ok(())
    }
    async fn mark_running(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        self.marked_running.lock().unwrap().push(descriptor.job_id.clone());
        Ok(())
    }
}

struct FakeNuke {
    nuked: StdMutex<Vec<JobId>>,
}

impl FakeNuke {
    fn new() -> Self {
        Self { nuked: StdMutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl NukeClient for FakeNuke {
    async fn nuke(&self, config: &teuthd_core::JobConfig) {
        self.nuked.lock().unwrap().push(config.job_id.clone());
    }
}

fn descriptor(job_id: &str, name: &str, roles: Vec<Vec<&str>>, stop_worker: bool) -> JobDescriptor {
    JobDescriptor {
        job_id: JobId::from(job_id),
        name: name.to_string(),
        machine_type: Some(MachineClass::from("smithi")),
        roles: roles.into_iter().map(|s| s.into_iter().map(Into::into).collect()).collect(),
        stop_worker,
        status: Some("queued".to_string()),
        targets: Default::default(),
        extra: serde_json::Map::new(),
    }
}

struct Harness {
    tmp: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self { tmp: tempfile::tempdir().unwrap() }
    }

    fn bin_dir(&self) -> std::path::PathBuf {
        let dir = self.tmp.path().join("bin");
        std::fs::create_dir_all(&dir).unwrap();
        let bin = dir.join(crate::spawn::SUPERVISOR_BINARY_NAME);
        std::fs::write(&bin, "#!/bin/sh\nexit 0\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&bin).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&bin, perms).unwrap();
        dir
    }

    fn archive_base(&self) -> std::path::PathBuf {
        self.tmp.path().join("archive")
    }

    fn build(
        &self,
        queue: Arc<dyn QueueBackend>,
        leaser: Arc<dyn MachineLeaser>,
        nuke: Arc<dyn NukeClient>,
        exit_on_empty_queue: bool,
    ) -> DispatcherLoop {
        let preparer =
            JobPreparer::new(Arc::new(FixedSupervisorBinaryResolver::new(self.bin_dir())), self.archive_base());
        let archive_writer = ArchiveWriter::new(self.archive_base());
        let sentinel = SentinelWatcher::with_paths(
            self.tmp.path().join("restart"),
            self.tmp.path().join("stop"),
            std::time::SystemTime::now(),
        );
        let config = DispatcherConfig {
            machine_type: MachineClass::from("smithi"),
            log_dir: self.tmp.path().join("logs"),
            archive_base: self.archive_base(),
            teuthology_path: self.bin_dir(),
            exit_on_empty_queue,
            queue_backend: QueueBackendKind::Beanstalk,
            queue_addr: "127.0.0.1:0".to_string(),
            lock_server_url: "http://lock.example/".to_string(),
            report_base_url: "http://report.example/".to_string(),
            verbose: false,
        };
        let reloader = ConfigReloader::new(self.tmp.path().join("dispatcher.toml"));
        DispatcherLoop::new(config, queue, leaser, preparer, archive_writer, nuke, sentinel, reloader)
    }

    /// Same as `build`, but the resolved supervisor binary path is an empty
    /// directory — `prep_job` still succeeds (resolution is unconditional),
    /// so the failure surfaces later, from `SupervisorSpawner::spawn` itself.
    fn build_with_missing_supervisor(
        &self,
        queue: Arc<dyn QueueBackend>,
        leaser: Arc<dyn MachineLeaser>,
        nuke: Arc<dyn NukeClient>,
    ) -> DispatcherLoop {
        let empty_bin_dir = self.tmp.path().join("no-bin-here");
        std::fs::create_dir_all(&empty_bin_dir).unwrap();
        let preparer = JobPreparer::new(
            Arc::new(FixedSupervisorBinaryResolver::new(empty_bin_dir.clone())),
            self.archive_base(),
        );
        let archive_writer = ArchiveWriter::new(self.archive_base());
        let sentinel = SentinelWatcher::with_paths(
            self.tmp.path().join("restart"),
            self.tmp.path().join("stop"),
            std::time::SystemTime::now(),
        );
        let config = DispatcherConfig {
            machine_type: MachineClass::from("smithi"),
            log_dir: self.tmp.path().join("logs"),
            archive_base: self.archive_base(),
            teuthology_path: empty_bin_dir,
            exit_on_empty_queue: false,
            queue_backend: QueueBackendKind::Beanstalk,
            queue_addr: "127.0.0.1:0".to_string(),
            lock_server_url: "http://lock.example/".to_string(),
            report_base_url: "http://report.example/".to_string(),
            verbose: false,
        };
        let reloader = ConfigReloader::new(self.tmp.path().join("dispatcher.toml"));
        DispatcherLoop::new(config, queue, leaser, preparer, archive_writer, nuke, sentinel, reloader)
    }
}

#[tokio::test]
async fn happy_path_spawns_supervisor_and_acks() {
    let harness = Harness::new();
    let queue = Arc::new(FakeQueue::new(vec![Some(descriptor("42", "run-a", vec![vec!["mon.0"]], false))]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec!["host1".to_string()]));
    let nuke = Arc::new(FakeNuke::new());

    let mut dispatcher =
        harness.build(queue.clone(), leaser, nuke, false);
    let outcome = dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Continue));

    assert_eq!(dispatcher.job_procs.len(), 1);
    assert!(harness.archive_base().join("run-a/42/orig.config.yaml").is_file());
    assert!(queue.marked_running.lock().unwrap().contains(&JobId::from("42")));
}

#[tokio::test]
async fn stop_worker_flag_stops_loop_after_handling_job() {
    let harness = Harness::new();
    let queue = Arc::new(FakeQueue::new(vec![Some(descriptor("1", "run-a", vec![], true))]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec![]));
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build(queue, leaser, nuke, false);

    let outcome = dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Stop));
}

#[tokio::test]
async fn exit_on_empty_queue_stops_when_reserve_yields_nothing() {
    let harness = Harness::new();
    let queue = Arc::new(FakeQueue::new(vec![None]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec![]));
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build(queue, leaser, nuke, true);

    let outcome = dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Stop));
}

#[tokio::test]
async fn empty_queue_without_exit_flag_keeps_looping() {
    let harness = Harness::new();
    let queue = Arc::new(FakeQueue::new(vec![None]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec![]));
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build(queue, leaser, nuke, false);

    let outcome = dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Continue));
}

#[tokio::test]
async fn missing_machine_type_skips_job_without_report() {
    let harness = Harness::new();
    let mut bad = descriptor("1", "run-a", vec![], false);
    bad.machine_type = None;
    let queue = Arc::new(FakeQueue::new(vec![Some(bad)]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec![]));
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build(queue.clone(), leaser, nuke, false);

    dispatcher.tick().await;
    assert!(queue.failed.lock().unwrap().is_empty());
    assert!(dispatcher.job_procs.is_empty());
}

#[tokio::test]
async fn lease_failure_reports_fail_and_does_not_spawn() {
    let harness = Harness::new();
    let queue = Arc::new(FakeQueue::new(vec![Some(descriptor("7", "run-b", vec![vec!["mon.0"]], false))]));
    let leaser = Arc::new(FakeMachineLeaser::always_fails());
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build(queue.clone(), leaser, nuke, false);

    dispatcher.tick().await;
    let failed = queue.failed.lock().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, JobId::from("7"));
    assert!(dispatcher.job_procs.is_empty());
}

#[tokio::test]
async fn spawn_failure_with_targets_nukes_and_reports_fail() {
    let harness = Harness::new();
    let queue = Arc::new(FakeQueue::new(vec![Some(descriptor("9", "run-c", vec![vec!["mon.0"]], false))]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec!["h1".to_string()]));
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build_with_missing_supervisor(queue.clone(), leaser, nuke.clone());

    dispatcher.tick().await;

    assert_eq!(nuke.nuked.lock().unwrap().as_slice(), &[JobId::from("9")]);
    let failed = queue.failed.lock().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0], (JobId::from("9"), "Saw error while trying to spawn supervisor.".to_string()));
    assert!(dispatcher.job_procs.is_empty());
}

#[tokio::test]
async fn reloaded_archive_base_overlay_reaches_the_archive_writer_not_just_the_spawn_flag() {
    let harness = Harness::new();
    let new_archive_base = harness.tmp.path().join("reloaded-archive");
    std::fs::write(
        harness.tmp.path().join("dispatcher.toml"),
        format!("archive_base = {:?}\n", new_archive_base.to_string_lossy()),
    )
    .unwrap();

    let queue = Arc::new(FakeQueue::new(vec![Some(descriptor("13", "run-d", vec![], false))]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec![]));
    let nuke = Arc::new(FakeNuke::new());
    let mut dispatcher = harness.build(queue, leaser, nuke, false);

    dispatcher.tick().await;

    assert_eq!(dispatcher.config.archive_base, new_archive_base);
    assert!(new_archive_base.join("run-d/13/orig.config.yaml").is_file());
    assert!(!harness.archive_base().join("run-d/13/orig.config.yaml").is_file());
}

#[tokio::test]
async fn restart_sentinel_takes_precedence_and_short_circuits_the_tick() {
    let harness = Harness::new();
    std::fs::write(harness.tmp.path().join("restart"), b"x").unwrap();
    let queue = Arc::new(FakeQueue::new(vec![Some(descriptor("1", "run-a", vec![], false))]));
    let leaser = Arc::new(FakeMachineLeaser::with_machines(vec![]));
    let nuke = Arc::new(FakeNuke::new());
    let sentinel = SentinelWatcher::with_paths(
        harness.tmp.path().join("restart"),
        harness.tmp.path().join("stop"),
        std::time::SystemTime::UNIX_EPOCH,
    );
    let preparer = JobPreparer::new(
        Arc::new(FixedSupervisorBinaryResolver::new(harness.bin_dir())),
        harness.archive_base(),
    );
    let archive_writer = ArchiveWriter::new(harness.archive_base());
    let config = DispatcherConfig {
        machine_type: MachineClass::from("smithi"),
        log_dir: harness.tmp.path().join("logs"),
        archive_base: harness.archive_base(),
        teuthology_path: harness.bin_dir(),
        exit_on_empty_queue: false,
        queue_backend: QueueBackendKind::Beanstalk,
        queue_addr: "127.0.0.1:0".to_string(),
        lock_server_url: "http://lock.example/".to_string(),
        report_base_url: "http://report.example/".to_string(),
        verbose: false,
    };
    let reloader = ConfigReloader::new(harness.tmp.path().join("dispatcher.toml"));
    let mut dispatcher =
        DispatcherLoop::new(config, queue, leaser, preparer, archive_writer, nuke, sentinel, reloader);

    let outcome = dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Restart));
}
