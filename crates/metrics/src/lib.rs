//! C9: the teuthology-exporter process. Samples the fleet (C8) and queue
//! state on an interval and publishes them as Prometheus gauges over HTTP.

pub mod gauges;
pub mod loop_;
pub mod server;

pub use gauges::{TeuthologyMetrics, EXPORTER_PORT};
pub use loop_::{next_sleep, ExporterLoop, DEFAULT_INTERVAL};
pub use server::{router, serve};
