//! Binary-edge plumbing for `teuthology-dispatcher` and
//! `teuthology-exporter`: argument parsing is owned by each `src/bin/`
//! entry point, everything reusable between them lives here.

pub mod nuke;
pub mod wiring;

pub use nuke::HttpNukeClient;
