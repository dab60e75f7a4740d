//! Read-side helpers for a finished (or running) session store: load the
//! series for one pid, decimate for plotting, and summarise.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::StoreError;
use crate::model::{ProcessSample, SystemSample};
use crate::store::{MetricsStore, ProcessQuery};

/// Default point budget for a plotted series.
pub const DEFAULT_MAX_POINTS: usize = 1000;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Indices kept when reducing `len` points to at most `max_points`.
///
/// Picks `floor(i * len / max_points)` for `i` in `0..max_points`, a fixed
/// stride with no averaging. A budget of 0 or one at least `len` keeps all.
pub fn downsample_indices(len: usize, max_points: usize) -> Vec<usize> {
    if max_points == 0 || len <= max_points {
        return (0..len).collect();
    }
    let stride = len as f64 / max_points as f64;
    (0..max_points)
        .map(|i| ((i as f64 * stride).floor() as usize).min(len - 1))
        .collect()
}

pub fn downsample<T: Clone>(series: &[T], max_points: usize) -> Vec<T> {
    downsample_indices(series.len(), max_points)
        .into_iter()
        .map(|i| series[i].clone())
        .collect()
}

/// Seconds elapsed since the first timestamp of the slice.
pub fn relative_seconds(timestamps: &[NaiveDateTime]) -> Vec<f64> {
    let Some(first) = timestamps.first() else {
        return Vec::new();
    };
    timestamps
        .iter()
        .map(|t| (*t - *first).num_milliseconds() as f64 / 1000.0)
        .collect()
}

/// Process rows for one pid alongside every system row of the same store,
/// each sorted by time on its own.
#[derive(Debug, Clone, Default)]
pub struct SeriesSet {
    pub pid: u32,
    pub process: Vec<ProcessSample>,
    pub system: Vec<SystemSample>,
}

pub fn load_series(store: &MetricsStore, pid: u32) -> Result<SeriesSet, StoreError> {
    Ok(SeriesSet {
        pid,
        process: store.query_processes(&ProcessQuery::pid(pid))?,
        system: store.query_system(None, None)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self { mean: sum / count as f64, min, max })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub samples: usize,
    pub cpu: Option<Stats>,
    pub memory: Option<Stats>,
}

/// Statistics over the full, non-decimated process series.
pub fn summarize(process: &[ProcessSample]) -> SeriesSummary {
    SeriesSummary {
        samples: process.len(),
        cpu: Stats::of(process.iter().map(|s| s.cpu_percent)),
        memory: Stats::of(process.iter().map(|s| s.memory_mb)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessCharts {
    /// Seconds since the first process sample.
    pub x: Vec<f64>,
    pub cpu_percent: Vec<f64>,
    pub memory_mb: Vec<f64>,
    pub threads: Vec<f64>,
    pub handles: Vec<f64>,
    pub io_read_mb: Vec<f64>,
    pub io_write_mb: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemCharts {
    /// Seconds since the first system sample.
    pub x: Vec<f64>,
    pub cpu_percent: Vec<f64>,
    pub memory_percent: Vec<f64>,
}

impl ProcessCharts {
    pub fn build(samples: &[ProcessSample], max_points: usize) -> Self {
        let x = relative_seconds(&samples.iter().map(|s| s.timestamp).collect::<Vec<_>>());
        // Windows-style sources report handles, Unix ones descriptors.
        let handle_key = match samples.first() {
            Some(first) if first.extra_metrics.contains_key("num_handles") => "num_handles",
            _ => "num_fds",
        };
        let keep = downsample_indices(samples.len(), max_points);
        Self {
            x: keep.iter().map(|&i| x[i]).collect(),
            cpu_percent: column(samples, &keep, |s| s.cpu_percent),
            memory_mb: column(samples, &keep, |s| s.memory_mb),
            threads: column(samples, &keep, |s| s.metric("num_threads")),
            handles: column(samples, &keep, |s| s.metric(handle_key)),
            io_read_mb: column(samples, &keep, |s| s.metric("io_read_bytes") / BYTES_PER_MB),
            io_write_mb: column(samples, &keep, |s| s.metric("io_write_bytes") / BYTES_PER_MB),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

fn column<T>(samples: &[T], keep: &[usize], f: impl Fn(&T) -> f64) -> Vec<f64> {
    keep.iter().map(|&i| f(&samples[i])).collect()
}

impl SystemCharts {
    pub fn build(samples: &[SystemSample], max_points: usize) -> Self {
        let x = relative_seconds(&samples.iter().map(|s| s.timestamp).collect::<Vec<_>>());
        let keep = downsample_indices(samples.len(), max_points);
        Self {
            x: keep.iter().map(|&i| x[i]).collect(),
            cpu_percent: column(samples, &keep, |s| s.cpu_percent),
            memory_percent: column(samples, &keep, |s| s.memory_percent),
        }
    }
}

/// Everything a viewer shows for one selected pid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub pid: u32,
    pub name: Option<String>,
    pub summary: SeriesSummary,
    pub process: ProcessCharts,
    pub system: SystemCharts,
}

impl Report {
    pub fn from_series(series: &SeriesSet, max_points: usize) -> Self {
        Self {
            pid: series.pid,
            name: series.process.first().map(|s| s.name.clone()),
            summary: summarize(&series.process),
            process: ProcessCharts::build(&series.process, max_points),
            system: SystemCharts::build(&series.system, max_points),
        }
    }
}

pub fn build_report(store: &MetricsStore, pid: u32, max_points: usize) -> Result<Report, StoreError> {
    Ok(Report::from_series(&load_series(store, pid)?, max_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;
    use serde_json::json;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn at(secs: i64) -> NaiveDateTime {
        ts("2025-03-01T12:00:00") + chrono::Duration::seconds(secs)
    }

    #[test]
    fn downsample_keeps_exact_budget_strictly_increasing() {
        for (len, max) in [(1001, 1000), (5000, 1000), (7, 3), (100, 99), (10_007, 13)] {
            let idx = downsample_indices(len, max);
            assert_eq!(idx.len(), max, "len={len} max={max}");
            assert!(idx.windows(2).all(|w| w[0] < w[1]), "len={len} max={max}");
            assert!(*idx.last().unwrap() < len);
            assert_eq!(idx[0], 0);
        }
    }

    #[test]
    fn downsample_within_budget_is_identity() {
        assert_eq!(downsample_indices(5, 10), vec![0, 1, 2, 3, 4]);
        assert_eq!(downsample_indices(5, 5), vec![0, 1, 2, 3, 4]);
        assert_eq!(downsample_indices(3, 0), vec![0, 1, 2]);
        assert!(downsample_indices(0, 10).is_empty());
    }

    #[test]
    fn downsample_is_stride_selection() {
        assert_eq!(downsample_indices(10, 4), vec![0, 2, 5, 7]);
        let values: Vec<u32> = (0..10).collect();
        assert_eq!(downsample(&values, 4), vec![0, 2, 5, 7]);
    }

    #[test]
    fn relative_time_starts_at_zero() {
        assert_eq!(relative_seconds(&[at(5), at(6), at(10)]), vec![0.0, 1.0, 5.0]);
        assert!(relative_seconds(&[]).is_empty());
    }

    #[test]
    fn stats_over_values() {
        let s = Stats::of([1.0, 2.0, 6.0]).unwrap();
        assert_eq!(s, Stats { mean: 3.0, min: 1.0, max: 6.0 });
        assert!(Stats::of(std::iter::empty()).is_none());
    }

    #[test]
    fn summary_uses_full_series() {
        let samples: Vec<ProcessSample> = (0..2000)
            .map(|i| {
                let mut s = ProcessSample::bare(at(i), 1, "w");
                s.cpu_percent = i as f64;
                s.memory_mb = 100.0;
                s
            })
            .collect();
        let summary = summarize(&samples);
        assert_eq!(summary.samples, 2000);
        assert_eq!(summary.cpu.unwrap().max, 1999.0);
        assert_eq!(summary.memory.unwrap().mean, 100.0);

        let charts = ProcessCharts::build(&samples, 500);
        assert_eq!(charts.len(), 500);
        assert_eq!(charts.cpu_percent.len(), 500);
    }

    #[test]
    fn process_charts_read_extras_with_zero_default() {
        let mut a = ProcessSample::bare(at(0), 1, "w");
        a.extra_metrics.insert("num_threads".into(), json!(4));
        a.extra_metrics.insert("num_fds".into(), json!(9));
        a.extra_metrics.insert("io_read_bytes".into(), json!(2 * 1024 * 1024));
        let b = ProcessSample::bare(at(3), 1, "w");
        let charts = ProcessCharts::build(&[a, b], DEFAULT_MAX_POINTS);
        assert_eq!(charts.x, vec![0.0, 3.0]);
        assert_eq!(charts.threads, vec![4.0, 0.0]);
        assert_eq!(charts.handles, vec![9.0, 0.0]);
        assert_eq!(charts.io_read_mb, vec![2.0, 0.0]);
        assert_eq!(charts.io_write_mb, vec![0.0, 0.0]);
    }

    #[test]
    fn handles_preferred_when_first_sample_has_them() {
        let mut a = ProcessSample::bare(at(0), 1, "w");
        a.extra_metrics.insert("num_handles".into(), json!(40));
        a.extra_metrics.insert("num_fds".into(), json!(9));
        let charts = ProcessCharts::build(&[a], DEFAULT_MAX_POINTS);
        assert_eq!(charts.handles, vec![40.0]);
    }

    #[test]
    fn process_and_system_axes_normalise_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::open(dir.path().join("s.db")).unwrap();
        for secs in [0, 1, 2, 3] {
            store
                .insert_system_sample(&SystemSample::new(at(secs), 10.0, 100.0, 50.0))
                .unwrap();
        }
        for secs in [2, 3] {
            let mut s = ProcessSample::bare(at(secs), 42, "late");
            s.cpu_percent = 5.0;
            store.insert_process_sample(&s).unwrap();
        }
        store.insert_process_sample(&ProcessSample::bare(at(1), 7, "other")).unwrap();

        let report = build_report(&store, 42, DEFAULT_MAX_POINTS).unwrap();
        assert_eq!(report.name.as_deref(), Some("late"));
        assert_eq!(report.process.x, vec![0.0, 1.0]);
        assert_eq!(report.system.x, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(report.system.memory_percent, vec![50.0; 4]);
        assert_eq!(report.summary.cpu.unwrap().mean, 5.0);
    }

    #[test]
    fn report_for_unknown_pid_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::open(dir.path().join("s.db")).unwrap();
        let report = build_report(&store, 1, DEFAULT_MAX_POINTS).unwrap();
        assert!(report.name.is_none());
        assert!(report.process.is_empty());
        assert_eq!(report.summary.samples, 0);
        assert!(report.summary.cpu.is_none());
    }
}
