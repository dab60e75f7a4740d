use super::{MetricsSource, Probe};
use crate::model::{ExtraMetrics, ProcessSample, SystemSample};
use serde_json::json;
use std::fs;
use std::path::Path;

pub struct LinuxCollector {
    probe: Probe,
}

impl LinuxCollector {
    pub fn new() -> Self {
        Self { probe: Probe::new() }
    }

    // ── helpers ──────────────────────────────────────────────────────────

    /// Number of entries in a /proc directory, `None` if it cannot be read
    /// (process gone or owned by another user).
    fn count_entries(path: &Path) -> Option<u64> {
        fs::read_dir(path).ok().map(|entries| entries.flatten().count() as u64)
    }

    /// Thread count from /proc/[pid]/task and descriptor count from
    /// /proc/[pid]/fd. Keys are omitted when the directory is unreadable.
    fn proc_extras(pid: u32) -> ExtraMetrics {
        let base = Path::new("/proc").join(pid.to_string());
        let mut extras = ExtraMetrics::new();
        if let Some(threads) = Self::count_entries(&base.join("task")) {
            extras.insert("num_threads".into(), json!(threads));
        }
        if let Some(fds) = Self::count_entries(&base.join("fd")) {
            extras.insert("num_fds".into(), json!(fds));
        }
        extras
    }

    fn collect(&self, pids: &[u32]) -> Vec<ProcessSample> {
        pids.iter()
            .filter_map(|&pid| self.probe.sample(pid, Self::proc_extras(pid)))
            .collect()
    }
}

impl Default for LinuxCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ── trait implementation ────────────────────────────────────────────────

impl MetricsSource for LinuxCollector {
    fn list_processes_fast(&mut self) -> Vec<ProcessSample> {
        self.probe.refresh_list();
        let now = crate::model::now_secs();
        self.probe
            .names()
            .into_iter()
            .map(|(pid, name)| ProcessSample::bare(now, pid, name))
            .collect()
    }

    fn list_processes_full(&mut self) -> Vec<ProcessSample> {
        self.probe.refresh_all();
        let pids = self.probe.all_pids();
        self.collect(&pids)
    }

    fn get_by_pid(&mut self, pid: u32) -> Option<ProcessSample> {
        if self.probe.refresh_pids(&[pid]) == 0 {
            return None;
        }
        self.probe.sample(pid, Self::proc_extras(pid))
    }

    /// Resolves the name against a fresh process list first so processes
    /// started since the last call are picked up.
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

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::process::{Child, Command};
    use std::thread;
    use std::time::Duration;

    /// Spinning shell, killed on drop.
    struct Busy(Child);

    impl Busy {
        fn spawn() -> Self {
            Busy(Command::new("sh").args(["-c", "while :; do :; done"]).spawn().unwrap())
        }

        fn pid(&self) -> u32 {
            self.0.id()
        }
    }

    impl Drop for Busy {
        fn drop(&mut self) {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }

    fn cpu_of(samples: &[ProcessSample], pid: u32) -> f64 {
        samples.iter().find(|s| s.pid == pid).map(|s| s.cpu_percent).unwrap()
    }

    #[test]
    fn proc_extras_for_self() {
        let extras = LinuxCollector::proc_extras(std::process::id());
        assert!(extras["num_threads"].as_u64().unwrap() >= 1);
        assert!(extras["num_fds"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn proc_extras_for_missing_pid_is_empty() {
        assert!(LinuxCollector::proc_extras(u32::MAX).is_empty());
    }

    #[test]
    fn get_by_pid_missing_returns_none() {
        let mut c = LinuxCollector::new();
        assert!(c.get_by_pid(u32::MAX).is_none());
    }

    #[test]
    fn get_by_name_finds_self() {
        let mut c = LinuxCollector::new();
        let me = std::process::id();
        let own = c.get_by_pid(me).unwrap();
        let found = c.get_by_name(&own.name.to_uppercase());
        assert!(found.iter().any(|s| s.pid == me));
        assert!(c.get_by_name("no-such-process-name-xyz").is_empty());
    }

    #[test]
    fn cpu_by_name_covers_the_whole_interval() {
        let busy = Busy::spawn();
        let mut c = LinuxCollector::new();
        // Let the child exec and show up under its own name.
        thread::sleep(Duration::from_millis(100));

        c.get_system_info();
        let baseline = c.get_by_name("sh");
        assert!(baseline.iter().any(|s| s.pid == busy.pid()));

        for _ in 0..2 {
            thread::sleep(Duration::from_millis(500));
            // Lookups of other names and fast listings in between must not
            // move the baseline of the busy process.
            c.get_by_name("no-such-process-name-xyz");
            c.list_processes_fast();
            c.get_system_info();
            let cpu = cpu_of(&c.get_by_name("SH"), busy.pid());
            assert!(cpu > 20.0, "busy child reported {cpu}% cpu");
        }
    }

    #[test]
    fn fast_list_is_bare() {
        let mut c = LinuxCollector::new();
        let list = c.list_processes_fast();
        let me = list.iter().find(|s| s.pid == std::process::id()).unwrap();
        assert_eq!(me.cpu_percent, 0.0);
        assert!(me.extra_metrics.is_empty());
    }
}
