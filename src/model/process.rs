use chrono::NaiveDateTime;

use super::ExtraMetrics;

/// Placeholder user name when the owner of a process cannot be resolved.
pub const UNKNOWN_USER: &str = "N/A";

/// One observation of one OS process at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSample {
    pub timestamp: NaiveDateTime,
    pub pid: u32,
    pub name: String,
    pub command_line: String,
    pub user: String,
    /// Usage since the previous refresh of this process, not cumulative.
    pub cpu_percent: f64,
    /// Resident set size.
    pub memory_mb: f64,
    pub extra_metrics: ExtraMetrics,
}

impl ProcessSample {
    /// Minimal sample used for discovery: pid and name only.
    pub fn bare(timestamp: NaiveDateTime, pid: u32, name: impl Into<String>) -> Self {
        Self {
            timestamp,
            pid,
            name: name.into(),
            command_line: String::new(),
            user: UNKNOWN_USER.to_string(),
            cpu_percent: 0.0,
            memory_mb: 0.0,
            extra_metrics: ExtraMetrics::new(),
        }
    }

    /// Case-insensitive name match.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// Numeric extra metric, 0 when absent or not a number.
    pub fn metric(&self, key: &str) -> f64 {
        self.extra_metrics.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::now_secs;

    #[test]
    fn bare_sample_has_placeholder_fields() {
        let s = ProcessSample::bare(now_secs(), 42, "sshd");
        assert_eq!(s.user, UNKNOWN_USER);
        assert!(s.command_line.is_empty());
        assert!(s.extra_metrics.is_empty());
    }

    #[test]
    fn name_matches_ignores_case() {
        let s = ProcessSample::bare(now_secs(), 1, "Chrome");
        assert!(s.name_matches("chrome"));
        assert!(s.name_matches("CHROME"));
        assert!(!s.name_matches("chromium"));
    }

    #[test]
    fn metric_defaults_to_zero() {
        let mut s = ProcessSample::bare(now_secs(), 1, "x");
        s.extra_metrics.insert("num_threads".into(), 7.into());
        s.extra_metrics.insert("label".into(), "abc".into());
        assert_eq!(s.metric("num_threads"), 7.0);
        assert_eq!(s.metric("label"), 0.0);
        assert_eq!(s.metric("missing"), 0.0);
    }
}
