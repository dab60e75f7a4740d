use std::fmt;

use crate::error::CollectorError;
use crate::model::{ProcessSample, SystemSample};

pub mod linux;
pub mod mac;
mod probe;

pub use probe::Probe;

/// Trait for OS-specific process and system metrics collection.
/// Implementations (LinuxCollector, MacCollector) handle the low-level details.
///
/// CPU percentages are measured since the previous refresh of the same
/// process (or of the system), so the first call after a process is first
/// seen returns a baseline of 0. Callers that need meaningful values issue
/// one throwaway call first.
///
/// Processes that exit or deny access mid-scan are skipped, never reported
/// as errors.
pub trait MetricsSource: Send {
    /// Enumerate live processes with pid and name only.
    fn list_processes_fast(&mut self) -> Vec<ProcessSample>;

    /// Full samples for every accessible process.
    fn list_processes_full(&mut self) -> Vec<ProcessSample>;

    /// Full sample for one pid, `None` if it has exited or is inaccessible.
    fn get_by_pid(&mut self, pid: u32) -> Option<ProcessSample>;

    /// Full samples for every process whose name matches case-insensitively.
    fn get_by_name(&mut self, name: &str) -> Vec<ProcessSample>;

    /// Whole-machine sample for the current instant.
    fn get_system_info(&mut self) -> SystemSample;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    /// Map an OS identifier (as in `std::env::consts::OS`) to a supported platform.
    pub fn from_os(os: &str) -> Result<Self, CollectorError> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            other => Err(CollectorError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn current() -> Result<Self, CollectorError> {
        Self::from_os(std::env::consts::OS)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
        }
    }
}

pub fn collector_for(platform: Platform) -> Box<dyn MetricsSource> {
    match platform {
        Platform::Linux => Box::new(linux::LinuxCollector::new()),
        Platform::MacOs => Box::new(mac::MacCollector::new()),
    }
}

/// Create the collector for the host OS. An unsupported OS is a startup error.
pub fn create_collector() -> Result<Box<dyn MetricsSource>, CollectorError> {
    let platform = Platform::current()?;
    tracing::debug!(%platform, "creating metrics collector");
    Ok(collector_for(platform))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_mapping_is_pure() {
        assert_eq!(Platform::from_os("linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = Platform::from_os("plan9").unwrap_err();
        assert!(matches!(err, CollectorError::UnsupportedPlatform(ref os) if os == "plan9"));
    }
}
