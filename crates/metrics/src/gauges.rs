//! C9's gauge set. `dispatcher_count` mirrors the original exporter;
//! `beanstalk_queue_length`/`beanstalk_queue_paused` are sampled from
//! whichever [`QueueBackend`](teuthd_queue::QueueBackend) the exporter was
//! wired to, one `stats` call per machine type currently observed on the
//! fleet.

use prometheus::{GaugeVec, Opts, Registry};

use teuthd_core::{MachineClass, QueueStats};

/// `int(''.join([str((ord(c) - 100) % 10) for c in "teuth"]))` — kept as a
/// named constant rather than re-deriving the joke every time it's read.
pub const EXPORTER_PORT: u16 = 61764;

pub struct TeuthologyMetrics {
    registry: Registry,
    dispatcher_count: GaugeVec,
    beanstalk_queue_length: GaugeVec,
    beanstalk_queue_paused: GaugeVec,
}

impl TeuthologyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let dispatcher_count =
            GaugeVec::new(Opts::new("dispatcher_count", "Dispatcher Count"), &["machine_type"])?;
        let beanstalk_queue_length = GaugeVec::new(
            Opts::new("beanstalk_queue_length", "Beanstalk Queue Length"),
            &["machine_type"],
        )?;
        let beanstalk_queue_paused = GaugeVec::new(
            Opts::new("beanstalk_queue_paused", "Beanstalk Queue Paused"),
            &["machine_type"],
        )?;

        registry.register(Box::new(dispatcher_count.clone()))?;
        registry.register(Box::new(beanstalk_queue_length.clone()))?;
        registry.register(Box::new(beanstalk_queue_paused.clone()))?;

        Ok(Self { registry, dispatcher_count, beanstalk_queue_length, beanstalk_queue_paused })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_dispatcher_count(&self, machine_type: &MachineClass, count: usize) {
        self.dispatcher_count.with_label_values(&[machine_type.as_str()]).set(count as f64);
    }

    pub fn set_queue_stats(&self, machine_type: &MachineClass, stats: &QueueStats) {
        self.beanstalk_queue_length.with_label_values(&[machine_type.as_str()]).set(stats.count as f64);
        self.beanstalk_queue_paused
            .with_label_values(&[machine_type.as_str()])
            .set(if stats.paused { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
#[path = "gauges_tests.rs"]
mod tests;
