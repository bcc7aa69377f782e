//! Uniform façade over the two queue backend variants (`beanstalk`,
//! `report-http`), exposing reserve/ack/fail/stats/pause.

mod beanstalk;
mod error;
mod report_http;
mod reporting;

use std::sync::Arc;
use std::time::Duration;

pub use beanstalk::BeanstalkBackend;
pub use error::QueueError;
pub use report_http::{clean_config, ReportHttpBackend};

use teuthd_core::{JobDescriptor, MachineClass, QueueStats};

/// The capability set both backends implement. `pause` deliberately has no
/// `duration` parameter — the duration-then-clear contract lives one layer
/// up, in [`QueueClient::pause`], so it applies uniformly to both backends
/// instead of being reimplemented (and possibly drifting) in each.
#[async_trait::async_trait]
pub trait QueueBackend: Send + Sync {
    async fn reserve(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError>;
    async fn ack(&self, descriptor: &JobDescriptor) -> Result<(), QueueError>;
    async fn fail(&self, descriptor: &JobDescriptor, reason: &str) -> Result<(), QueueError>;
    async fn stats(&self, machine_class: &MachineClass) -> Result<QueueStats, QueueError>;
    async fn pause(&self, machine_class: &MachineClass, paused: bool, by: &str) -> Result<(), QueueError>;

    /// Push `status=running` ahead of a (potentially long) machine lease,
    /// distinct from `ack`: `ack` means "the job finished handoff to a
    /// supervisor" (a delete, for beanstalk), while this means "still being
    /// worked on, don't consider it abandoned". Both backends push this to
    /// the reporting service regardless of which one owns reserve/ack — see
    /// `ReportingClient`.
    async fn mark_running(&self, descriptor: &JobDescriptor) -> Result<(), QueueError>;
}

/// Which backend variant to select at startup, from `--queue-backend`. The
/// `Fake` variant only exists under `#[cfg(test)]`, so it can never be
/// constructed or matched outside tests — it exists so tests can drive
/// `QueueClient::pause`'s actual duration-then-clear logic against a
/// `FakeBackend`, instead of asserting against the backend's raw `pause`
/// calls directly and risking the facade's own sleep/second-call logic going
/// unexercised.
pub enum QueueClient {
    Beanstalk(BeanstalkBackend),
    ReportHttp(ReportHttpBackend),
    #[cfg(test)]
    Fake(Arc<dyn QueueBackend>),
}

impl QueueClient {
    fn backend(&self) -> &dyn QueueBackend {
        match self {
            QueueClient::Beanstalk(b) => b,
            QueueClient::ReportHttp(b) => b,
            #[cfg(test)]
            QueueClient::Fake(b) => b.as_ref(),
        }
    }

    /// Unwraps into the plain [`QueueBackend`] trait object the dispatcher
    /// loop actually consumes (reserve/ack/fail/mark_running) — the
    /// duration-then-clear `pause` facade above is only relevant to
    /// whatever invokes a pause, not to the loop itself.
    pub fn into_backend(self) -> Arc<dyn QueueBackend> {
        match self {
            QueueClient::Beanstalk(b) => Arc::new(b),
            QueueClient::ReportHttp(b) => Arc::new(b),
            #[cfg(test)]
            QueueClient::Fake(b) => b,
        }
    }

    /// Block up to `timeout` for a job on this dispatcher's machine class.
    /// `Ok(None)` means "timed out, try again" — not an error.
    pub async fn reserve(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        self.backend().reserve(timeout).await
    }

    /// Acknowledge a successfully-spawned job. I/O errors here are the
    /// caller's to log-and-swallow: the job has already been handed off to
    /// a supervisor.
    pub async fn ack(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        self.backend().ack(descriptor).await
    }

    pub async fn mark_running(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        self.backend().mark_running(descriptor).await
    }

    pub async fn fail(&self, descriptor: &JobDescriptor, reason: &str) -> Result<(), QueueError> {
        self.backend().fail(descriptor, reason).await
    }

    pub async fn stats(&self, machine_class: &MachineClass) -> Result<QueueStats, QueueError> {
        self.backend().stats(machine_class).await
    }

    /// Set or clear the pause flag. If `duration` is given and `paused` is
    /// true, sleeps that long and then clears the flag with a second call.
    pub async fn pause(
        &self,
        machine_class: &MachineClass,
        paused: bool,
        by: &str,
        duration: Option<Duration>,
    ) -> Result<(), QueueError> {
        self.backend().pause(machine_class, paused, by).await?;
        if paused {
            if let Some(duration) = duration {
                tokio::time::sleep(duration).await;
                self.backend().pause(machine_class, false, by).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        pause_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl QueueBackend for FakeBackend {
        async fn reserve(&self, _timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
            Ok(None)
        }
        async fn ack(&self, _descriptor: &JobDescriptor) -> Result<(), QueueError> {
            Ok(())
        }
        async fn fail(&self, _descriptor: &JobDescriptor, _reason: &str) -> Result<(), QueueError> {
            Ok(())
        }
        async fn stats(&self, _machine_class: &MachineClass) -> Result<QueueStats, QueueError> {
            Ok(QueueStats { count: 0, paused: false })
        }
        async fn pause(
            &self,
            _machine_class: &MachineClass,
            _paused: bool,
            _by: &str,
        ) -> Result<(), QueueError> {
            self.pause_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn mark_running(&self, _descriptor: &JobDescriptor) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_with_duration_issues_exactly_two_backend_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueueClient::Fake(Arc::new(FakeBackend { pause_calls: calls.clone() }));

        let machine_class = MachineClass::from("smithi");
        client
            .pause(&machine_class, true, "alice", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pause_without_duration_issues_one_backend_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueueClient::Fake(Arc::new(FakeBackend { pause_calls: calls.clone() }));
        let machine_class = MachineClass::from("smithi");
        client.pause(&machine_class, false, "alice", None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_true_without_duration_issues_one_backend_call_and_stays_paused() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueueClient::Fake(Arc::new(FakeBackend { pause_calls: calls.clone() }));
        let machine_class = MachineClass::from("smithi");
        client.pause(&machine_class, true, "alice", None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
