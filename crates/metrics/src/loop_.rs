//! C9's scheduling loop: publish gauges at period boundaries rather than
//! sleeping for the full period between updates, so a slow `update` doesn't
//! compound into ever-later samples. Wall-clock time is used for the
//! elapsed measurement (not a monotonic clock) because an exporter running
//! across a suspend/resume or an NTP step can observe the clock move
//! backward between two `wall_now()` reads; when that happens the next
//! sleep is doubled rather than clamped to zero, the same defensive move
//! the original exporter makes around its (monotonic, but still
//! defensively checked) timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use teuthd_core::{Clock, MachineClass};
use teuthd_fleet::FleetObserver;
use teuthd_queue::QueueBackend;

use crate::gauges::TeuthologyMetrics;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Given the configured interval and the (possibly negative) elapsed time
/// of the last update, compute how long to sleep before the next one.
/// `elapsed_ms < 0` means the clock moved backward during the update.
pub fn next_sleep(interval: Duration, elapsed_ms: i64) -> Duration {
    let mut interval_ms = interval.as_millis() as i64;
    if elapsed_ms < 0 {
        interval_ms *= 2;
    }
    let sleep_ms = (interval_ms - elapsed_ms).max(0);
    Duration::from_millis(sleep_ms as u64)
}

pub struct ExporterLoop<C: Clock> {
    metrics: Arc<TeuthologyMetrics>,
    fleet: FleetObserver,
    queue: Arc<dyn QueueBackend>,
    interval: Duration,
    clock: C,
}

impl<C: Clock> ExporterLoop<C> {
    pub fn new(
        metrics: Arc<TeuthologyMetrics>,
        fleet: FleetObserver,
        queue: Arc<dyn QueueBackend>,
        interval: Duration,
        clock: C,
    ) -> Self {
        Self { metrics, fleet, queue, interval, clock }
    }

    /// One update: scan the fleet, publish `dispatcher_count`, then sample
    /// and publish queue stats for every machine type currently observed.
    /// Failures are logged and swallowed, never propagated — a single bad
    /// sample must not stop subsequent ticks.
    pub async fn tick(&mut self) {
        let counts: HashMap<MachineClass, Vec<u32>> = self.fleet.scan();
        for (machine_type, pids) in &counts {
            self.metrics.set_dispatcher_count(machine_type, pids.len());
        }
        for machine_type in counts.keys() {
            match self.queue.stats(machine_type).await {
                Ok(stats) => self.metrics.set_queue_stats(machine_type, &stats),
                Err(error) => {
                    tracing::error!(%machine_type, %error, "failed to update metrics");
                }
            }
        }
    }

    /// Runs until ctrl-c, publishing at period boundaries. Never returns an
    /// error: a `tick` failure is already swallowed by `tick` itself.
    pub async fn run(&mut self) {
        tracing::info!("Starting teuthology-exporter...");
        loop {
            let before = self.clock.wall_now();
            self.tick().await;
            let elapsed_ms = match self.clock.wall_now().duration_since(before) {
                Ok(elapsed) => elapsed.as_millis() as i64,
                Err(went_backward) => -(went_backward.duration().as_millis() as i64),
            };
            let sleep_for = next_sleep(self.interval, elapsed_ms);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Stopping.");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "loop_tests.rs"]
mod tests;
