//! Session lifecycle: start and stop the background sampler, expose its
//! progress, and refresh the live process-name list between sessions.

mod refresher;
mod session;
mod ticker;

pub use refresher::{ProcessListDiff, ProcessListRefresher};
pub use session::{Session, TickReport};
pub use ticker::{LastTick, Ticker, Wait};

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::collectors::MetricsSource;
use crate::config::ConfigStore;
use crate::error::MonitorError;
use crate::model::{now_secs, WatchList};
use crate::store::MetricsStore;
use session::SharedSource;

/// How long `stop` waits for the sampler thread before giving up on it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum spacing between live process-list refreshes.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    /// Recording into the named session store.
    Running { session: String },
}

/// Everything a session needs, captured when it starts.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub output_dir: PathBuf,
    pub interval_secs: u64,
    pub watch: WatchList,
    /// Stop on its own after this many ticks.
    pub max_ticks: Option<u64>,
}

impl SessionSettings {
    pub fn from_config(config: &ConfigStore) -> Self {
        Self {
            output_dir: PathBuf::from(config.output_dir()),
            interval_secs: config.record_interval(),
            watch: config.monitored_processes(),
            max_ticks: None,
        }
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(MonitorError::EmptyOutputDir);
        }
        if self.watch.is_empty() {
            return Err(MonitorError::EmptyWatchList);
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

struct RunningSession {
    // Dropping the sender wakes the ticker with `Wait::Stopped`.
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
    store: MetricsStore,
}

/// Signals completion when the sampler thread exits, panicking or not.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

pub struct Monitor {
    collector: Arc<SharedSource>,
    state: MonitorState,
    running: Option<RunningSession>,
    last_tick: Arc<LastTick>,
    refresher: ProcessListRefresher,
    last_refresh: Option<Instant>,
    // A sampler that outlived JOIN_TIMEOUT. It still holds the collector.
    lingering: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(collector: Box<dyn MetricsSource>) -> Self {
        Self {
            collector: Arc::new(Mutex::new(collector)),
            state: MonitorState::Idle,
            running: None,
            last_tick: Arc::new(LastTick::new()),
            refresher: ProcessListRefresher::new(),
            last_refresh: None,
            lingering: None,
        }
    }

    /// Start recording into a new session store under `settings.output_dir`.
    /// Returns the session store's file name.
    pub fn start(&mut self, settings: &SessionSettings) -> Result<String, MonitorError> {
        self.poll();
        if self.running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        if let Some(handle) = self.lingering.take() {
            if !handle.is_finished() {
                self.lingering = Some(handle);
                return Err(MonitorError::CollectorUnavailable);
            }
            let _ = handle.join();
        }
        settings.validate()?;

        let store = MetricsStore::create_session(&settings.output_dir, &now_secs())?;
        let name = store.name();
        let session = Session::new(store.clone(), &settings.watch);

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let ticker = Ticker::new(settings.interval(), stop_rx);
        let collector = Arc::clone(&self.collector);
        let last_tick = Arc::clone(&self.last_tick);
        let max_ticks = settings.max_ticks;
        last_tick.clear();

        let handle = thread::Builder::new()
            .name("procwatch-monitor".into())
            .spawn(move || {
                let _done = DoneGuard(done_tx);
                session.run(&collector, ticker, &last_tick, max_ticks);
            })
            .map_err(MonitorError::Spawn)?;

        info!(session = %name, interval = settings.interval_secs, "session started");
        self.running = Some(RunningSession { stop_tx, done_rx, handle, store });
        self.state = MonitorState::Running { session: name.clone() };
        Ok(name)
    }

    /// Stop the running session. Waits up to [`JOIN_TIMEOUT`] for the
    /// sampler to finish its current tick. Returns false if nothing was running.
    pub fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };
        let RunningSession { stop_tx, done_rx, handle, store } = running;
        drop(stop_tx);

        match done_rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                debug!(session = %store.name(), "sampler joined");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    session = %store.name(),
                    timeout = ?JOIN_TIMEOUT,
                    "sampler did not stop in time, detaching it"
                );
                self.lingering = Some(handle);
            }
        }
        self.state = MonitorState::Idle;
        info!(session = %store.name(), "session stopped");
        true
    }

    /// Reap a sampler that finished on its own (tick limit reached) and
    /// return the current state.
    pub fn poll(&mut self) -> &MonitorState {
        let finished = self
            .running
            .as_ref()
            .is_some_and(|r| r.handle.is_finished());
        if finished {
            if let Some(running) = self.running.take() {
                let _ = running.handle.join();
                info!(session = %running.store.name(), "session finished");
            }
            self.state = MonitorState::Idle;
        }
        &self.state
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Store of the running session.
    pub fn session_store(&self) -> Option<&MetricsStore> {
        self.running.as_ref().map(|r| &r.store)
    }

    /// Instant of the last successful tick of the current or most recent session.
    pub fn last_tick(&self) -> Option<NaiveDateTime> {
        self.last_tick.get()
    }

    pub fn seconds_since_last_tick(&self) -> Option<i64> {
        self.last_tick()
            .map(|at| (now_secs() - at).num_seconds().max(0))
    }

    /// Re-enumerate live process names and patch the published list.
    ///
    /// Skipped (returns `None`) while a session is running so the sampler
    /// never competes for the collector, and whenever the collector is busy.
    pub fn refresh_process_list(&mut self) -> Option<ProcessListDiff> {
        self.poll();
        if self.running.is_some() {
            return None;
        }
        let listing = {
            let mut collector = match self.collector.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return None,
            };
            collector.list_processes_fast()
        };
        self.last_refresh = Some(Instant::now());
        let diff = self.refresher.apply(listing.iter().map(|s| s.name.as_str()));
        if !diff.is_empty() {
            debug!(added = diff.added.len(), removed = diff.removed.len(), "process list changed");
        }
        Some(diff)
    }

    /// Refresh if at least [`REFRESH_INTERVAL`] has passed since the last one.
    pub fn refresh_if_due(&mut self, now: Instant) -> Option<ProcessListDiff> {
        let due = self
            .last_refresh
            .is_none_or(|last| now.duration_since(last) >= REFRESH_INTERVAL);
        if due { self.refresh_process_list() } else { None }
    }

    pub fn refresher(&self) -> &ProcessListRefresher {
        &self.refresher
    }

    pub fn refresher_mut(&mut self) -> &mut ProcessListRefresher {
        &mut self.refresher
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
