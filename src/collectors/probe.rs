//! sysinfo-backed process table shared by the platform collectors.

use std::path::Path;

use serde_json::json;
use sysinfo::{
    Disks, Networks, Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind,
    Users,
};

use crate::model::{now_secs, ExtraMetrics, ProcessSample, SystemSample, UNKNOWN_USER};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Sampling and discovery use separate process tables. sysinfo moves a
/// process's CPU baseline on every refresh of it, whatever the refresh kind,
/// so name lookups must never touch the table the samples are read from.
pub struct Probe {
    /// Refreshed only for the pids being sampled, once per sample.
    sys: System,
    /// Refreshed for name and pid discovery.
    lister: System,
    users: Users,
    disks: Disks,
    networks: Networks,
}

impl Probe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        Self {
            sys,
            lister: System::new(),
            users: Users::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn full_refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_disk_usage()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_user(UpdateKind::OnlyIfNotSet)
    }

    // ── process table ────────────────────────────────────────────────────

    /// Refresh the discovery table. CPU baselines of sampled processes are untouched.
    pub fn refresh_list(&mut self) {
        self.lister.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
    }

    /// Refresh every process with the metrics a full sample needs.
    pub fn refresh_all(&mut self) {
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, Self::full_refresh_kind());
    }

    /// Refresh the given pids. Returns how many were still alive.
    pub fn refresh_pids(&mut self, pids: &[u32]) -> usize {
        let pids: Vec<Pid> = pids.iter().map(|&p| Pid::from_u32(p)).collect();
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            Self::full_refresh_kind(),
        )
    }

    /// (pid, name) for every process seen by the last `refresh_list`.
    pub fn names(&self) -> Vec<(u32, String)> {
        processes(&self.lister)
            .map(|p| (p.pid().as_u32(), p.name().to_string_lossy().into_owned()))
            .collect()
    }

    /// Pids whose name matches case-insensitively, from the last `refresh_list`.
    pub fn pids_named(&self, name: &str) -> Vec<u32> {
        let key = name.to_lowercase();
        let mut pids: Vec<u32> = processes(&self.lister)
            .filter(|p| p.name().to_string_lossy().to_lowercase() == key)
            .map(|p| p.pid().as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Pids in the sampling table, as of the last `refresh_all`.
    pub fn all_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = processes(&self.sys).map(|p| p.pid().as_u32()).collect();
        pids.sort_unstable();
        pids
    }

    /// Build a full sample from the last refresh. Platform-specific extras are
    /// merged over the IO counters sysinfo provides everywhere.
    pub fn sample(&self, pid: u32, platform_extras: ExtraMetrics) -> Option<ProcessSample> {
        let p = self.sys.process(Pid::from_u32(pid))?;
        let cmd: Vec<String> = p.cmd().iter().map(|s| s.to_string_lossy().into_owned()).collect();
        let user = p
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|u| u.name().to_string())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        let disk = p.disk_usage();
        let mut extra_metrics = ExtraMetrics::new();
        extra_metrics.insert("io_read_bytes".into(), json!(disk.total_read_bytes));
        extra_metrics.insert("io_write_bytes".into(), json!(disk.total_written_bytes));
        extra_metrics.extend(platform_extras);

        Some(ProcessSample {
            timestamp: now_secs(),
            pid,
            name: p.name().to_string_lossy().into_owned(),
            command_line: cmd.join(" "),
            user,
            cpu_percent: f64::from(p.cpu_usage()).max(0.0),
            memory_mb: p.memory() as f64 / BYTES_PER_MB,
            extra_metrics,
        })
    }

    // ── system ───────────────────────────────────────────────────────────

    pub fn system_sample(&mut self) -> SystemSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_cpu_frequency();
        self.sys.refresh_memory();
        self.disks.refresh(true);
        self.networks.refresh(true);

        let mut sample = SystemSample::new(
            now_secs(),
            f64::from(self.sys.global_cpu_usage()),
            self.sys.total_memory() as f64 / BYTES_PER_MB,
            self.sys.used_memory() as f64 / BYTES_PER_MB,
        );

        let load = System::load_average();
        let freq = self.sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);
        let (bytes_recv, bytes_sent) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });

        let extra = &mut sample.extra_metrics;
        extra.insert("cpu_count".into(), json!(self.sys.cpus().len()));
        extra.insert("cpu_freq".into(), json!(freq));
        extra.insert("load_avg".into(), json!([load.one, load.five, load.fifteen]));
        if let Some(usage) = self.root_disk_usage() {
            extra.insert("disk_usage".into(), usage);
        }
        extra.insert(
            "network_io".into(),
            json!({ "bytes_sent": bytes_sent, "bytes_recv": bytes_recv }),
        );
        sample
    }

    /// Total/used/free in GB for the disk mounted at `/`.
    fn root_disk_usage(&self) -> Option<serde_json::Value> {
        let disk = self
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))?;
        let total = disk.total_space() as f64;
        let free = disk.available_space() as f64;
        Some(json!({
            "total": total / BYTES_PER_GB,
            "used": (total - free) / BYTES_PER_GB,
            "free": free / BYTES_PER_GB,
        }))
    }
}

/// Processes proper, excluding the per-thread entries some platforms list.
fn processes(sys: &System) -> impl Iterator<Item = &Process> {
    sys.processes().values().filter(|p| p.thread_kind().is_none())
}

impl Default for Probe {
    fn default() -> Self {
        Self::new()
    }
}
