// Re-export all model types from submodules.

pub use process::{ProcessSample, UNKNOWN_USER};
pub use system::SystemSample;
pub use watch::WatchList;

mod process;
mod system;
mod watch;

use chrono::{Local, NaiveDateTime, SubsecRound};

/// Open-ended, platform-dependent metrics attached to a sample
/// (thread count, descriptor count, IO counters, load averages, ...).
pub type ExtraMetrics = serde_json::Map<String, serde_json::Value>;

/// Storage format for sample timestamps. Fixed width, so string order is time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time truncated to whole seconds.
pub fn now_secs() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts fractional seconds for files written by
/// older recorders that kept sub-second precision.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
