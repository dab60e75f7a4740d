use chrono::NaiveDateTime;

use super::ExtraMetrics;

/// One observation of whole-machine state at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemSample {
    pub timestamp: NaiveDateTime,
    pub cpu_percent: f64,
    pub memory_total_mb: f64,
    pub memory_used_mb: f64,
    pub memory_percent: f64,
    pub extra_metrics: ExtraMetrics,
}

impl SystemSample {
    pub fn new(timestamp: NaiveDateTime, cpu_percent: f64, total_mb: f64, used_mb: f64) -> Self {
        let memory_percent = if total_mb > 0.0 {
            used_mb / total_mb * 100.0
        } else {
            0.0
        };
        Self {
            timestamp,
            cpu_percent,
            memory_total_mb: total_mb,
            memory_used_mb: used_mb,
            memory_percent,
            extra_metrics: ExtraMetrics::new(),
        }
    }
}
