//! C8: enumerate host processes and identify dispatcher peers. The
//! classification rule itself (`classify`) is pure and free of any process
//! API so it can be table-tested directly; [`FleetObserver`] is the thin
//! `sysinfo`-backed layer on top.

use std::collections::HashMap;

use sysinfo::{PidExt, ProcessExt, System, SystemExt};

use teuthd_core::MachineClass;

/// A process is a dispatcher instance iff its command line (a) invokes
/// `entry_point`, (b) carries `--machine-type <class>`, and (c) does not
/// carry `--supervisor` (those are supervisors, not dispatchers).
pub fn classify(cmd: &[String], entry_point: &str) -> Option<MachineClass> {
    let invokes_entry_point = cmd.first().map(|arg0| arg0.ends_with(entry_point)).unwrap_or(false);
    if !invokes_entry_point {
        return None;
    }
    if cmd.iter().any(|a| a == "--supervisor") {
        return None;
    }
    let machine_type_idx = cmd.iter().position(|a| a == "--machine-type")?;
    cmd.get(machine_type_idx + 1).map(|s| MachineClass::from(s.as_str()))
}

pub struct FleetObserver {
    system: System,
    entry_point: String,
}

impl FleetObserver {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self { system: System::new(), entry_point: entry_point.into() }
    }

    /// Returns machine class → sorted PID list for every process on this
    /// host that `classify` recognizes as a dispatcher.
    pub fn scan(&mut self) -> HashMap<MachineClass, Vec<u32>> {
        self.system.refresh_processes();

        let mut result: HashMap<MachineClass, Vec<u32>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            let fallback;
            let cmd: &[String] = if process.cmd().is_empty() {
                fallback = vec![process.name().to_string()];
                &fallback
            } else {
                process.cmd()
            };
            if let Some(machine_type) = classify(cmd, &self.entry_point) {
                result.entry(machine_type).or_default().push(pid.as_u32());
            }
        }
        for pids in result.values_mut() {
            pids.sort_unstable();
        }
        result
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
