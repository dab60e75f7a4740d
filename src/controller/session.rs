//! One monitoring session: warm-up, then one tick per interval until stopped.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use tracing::{debug, error, info};

use super::ticker::{LastTick, Ticker, Wait};
use crate::collectors::MetricsSource;
use crate::error::StoreError;
use crate::model::{now_secs, WatchList};
use crate::store::MetricsStore;

pub(crate) type SharedSource = Mutex<Box<dyn MetricsSource>>;

pub(crate) fn lock_source(source: &SharedSource) -> MutexGuard<'_, Box<dyn MetricsSource>> {
    source.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub at: NaiveDateTime,
    /// Process rows written this tick.
    pub processes: usize,
}

pub struct Session {
    store: MetricsStore,
    /// Lower-cased watch-list snapshot taken at session start.
    watched: Vec<String>,
    last_at: Cell<Option<NaiveDateTime>>,
}

impl Session {
    pub fn new(store: MetricsStore, watch: &WatchList) -> Self {
        let mut watched: Vec<String> = watch.name_set().into_iter().collect();
        watched.sort();
        Self { store, watched, last_at: Cell::new(None) }
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    /// Establish CPU baselines: one throwaway system call and one per
    /// currently matching process. Vanished processes are simply not returned.
    pub fn warm_up(&self, source: &mut dyn MetricsSource) {
        source.get_system_info();
        let matched: usize = self.watched.iter().map(|name| source.get_by_name(name).len()).sum();
        debug!(matched, "cpu baselines established");
    }

    /// Sample every live process of every watched name plus the system, and
    /// write them all under one tick instant.
    ///
    /// A storage fault aborts the rest of this tick and is returned.
    pub fn tick(&self, source: &mut dyn MetricsSource) -> Result<TickReport, StoreError> {
        let at = self.next_instant(now_secs());
        let mut processes = 0;
        for name in &self.watched {
            for mut sample in source.get_by_name(name) {
                sample.timestamp = at;
                self.store.insert_process_sample(&sample)?;
                processes += 1;
            }
        }
        let mut system = source.get_system_info();
        system.timestamp = at;
        self.store.insert_system_sample(&system)?;
        Ok(TickReport { at, processes })
    }

    /// Tick instants are whole seconds and strictly increasing within a
    /// session. A tick that lands in the previous tick's second takes the
    /// next one, so a stored instant can lead wall-clock time by a second.
    /// The lead does not accumulate: the next tick on time is stamped `now`.
    fn next_instant(&self, now: NaiveDateTime) -> NaiveDateTime {
        let at = match self.last_at.get() {
            Some(last) if now <= last => {
                let bumped = last + chrono::Duration::seconds(1);
                debug!(%now, %bumped, "tick shares the previous tick's second, stamping ahead");
                bumped
            }
            _ => now,
        };
        self.last_at.set(Some(at));
        at
    }

    /// Run until the ticker is stopped or `max_ticks` ticks have run.
    /// Returns the number of ticks attempted.
    ///
    /// Storage faults are logged and the loop carries on with the next tick.
    pub fn run(
        &self,
        source: &SharedSource,
        mut ticker: Ticker,
        last_tick: &LastTick,
        max_ticks: Option<u64>,
    ) -> u64 {
        info!(
            store = %self.store.path().display(),
            watched = ?self.watched,
            interval = ?ticker.interval(),
            "monitor loop started"
        );
        self.warm_up(&mut **lock_source(source));
        ticker.reset();

        let mut ticks = 0u64;
        while ticker.wait() == Wait::Tick {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.tick(&mut **lock_source(source))
            }));
            match outcome {
                Ok(Ok(report)) => {
                    last_tick.record(report.at);
                    debug!(at = %report.at, processes = report.processes, "tick recorded");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "storage write failed, continuing with next tick");
                }
                Err(_) => {
                    error!("tick panicked, continuing with next tick");
                }
            }
            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
        }
        info!(ticks, "monitor loop stopped");
        ticks
    }
}
