use super::{MetricsSource, Probe};
use crate::model::{ExtraMetrics, ProcessSample, SystemSample};
use serde_json::json;
use std::process::Command;

pub struct MacCollector {
    probe: Probe,
}

impl MacCollector {
    pub fn new() -> Self {
        Self { probe: Probe::new() }
    }

    /// Open descriptor count via `lsof -p`. macOS has no /proc, and sysinfo
    /// does not expose descriptor counts there.
    fn count_open_files(pid: u32) -> Option<u64> {
        let output = Command::new("lsof")
            .args(["-n", "-P", "-p", &pid.to_string()])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        // First line is the column header.
        Some(text.lines().skip(1).filter(|l| !l.trim().is_empty()).count() as u64)
    }

    fn platform_extras(pid: u32) -> ExtraMetrics {
        let mut extras = ExtraMetrics::new();
        if let Some(fds) = Self::count_open_files(pid) {
            extras.insert("num_fds".into(), json!(fds));
        }
        extras
    }

    fn collect(&self, pids: &[u32]) -> Vec<ProcessSample> {
        pids.iter()
            .filter_map(|&pid| self.probe.sample(pid, Self::platform_extras(pid)))
            .collect()
    }
}

impl Default for MacCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for MacCollector {
    fn list_processes_fast(&mut self) -> Vec<ProcessSample> {
        self.probe.refresh_list();
        let now = crate::model::now_secs();
        self.probe
            .names()
            .into_iter()
            .map(|(pid, name)| ProcessSample::bare(now, pid, name))
            .collect()
    }

    /// Skips `lsof` for the full scan; one subprocess per process would make
    /// this call take seconds.
    fn list_processes_full(&mut self) -> Vec<ProcessSample> {
        self.probe.refresh_all();
        self.probe
            .all_pids()
            .into_iter()
            .filter_map(|pid| self.probe.sample(pid, ExtraMetrics::new()))
            .collect()
    }

    fn get_by_pid(&mut self, pid: u32) -> Option<ProcessSample> {
        if self.probe.refresh_pids(&[pid]) == 0 {
            return None;
        }
        self.probe.sample(pid, Self::platform_extras(pid))
    }

    fn get_by_name(&mut self, name: &str) -> Vec<ProcessSample> {
        self.probe.refresh_list();
        let pids = self.probe.pids_named(name);
        if pids.is_empty() {
            return Vec::new();
        }
        self.probe.refresh_pids(&pids);
        self.collect(&pids)
    }

    fn get_system_info(&mut self) -> SystemSample {
        self.probe.system_sample()
    }
}
