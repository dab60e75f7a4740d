// DDL for a session store file.

use std::time::Duration;

pub const PROCESSES_DDL: &str = "\
CREATE TABLE IF NOT EXISTS processes (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT    NOT NULL,
    pid             INTEGER NOT NULL,
    name            TEXT    NOT NULL,
    command_line    TEXT,
    user            TEXT,
    cpu_percent     REAL,
    memory_mb       REAL,
    extra_metrics   TEXT,
    UNIQUE(timestamp, pid)
);
CREATE INDEX IF NOT EXISTS idx_processes_timestamp ON processes(timestamp);
CREATE INDEX IF NOT EXISTS idx_processes_pid       ON processes(pid);
CREATE INDEX IF NOT EXISTS idx_processes_name      ON processes(name);
";

pub const SYSTEM_INFO_DDL: &str = "\
CREATE TABLE IF NOT EXISTS system_info (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT    NOT NULL UNIQUE,
    cpu_percent     REAL,
    memory_total_mb REAL,
    memory_used_mb  REAL,
    memory_percent  REAL,
    extra_metrics   TEXT
);
CREATE INDEX IF NOT EXISTS idx_system_info_timestamp ON system_info(timestamp);
";

/// Applied on every connection so a viewer can read a file while the
/// recorder commits.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(2000);

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn ddl_executes_on_in_memory_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.busy_timeout(BUSY_TIMEOUT).unwrap();
        conn.execute_batch(PROCESSES_DDL).unwrap();
        conn.execute_batch(SYSTEM_INFO_DDL).unwrap();
    }

    #[test]
    fn ddl_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(PROCESSES_DDL).unwrap();
        conn.execute_batch(PROCESSES_DDL).unwrap();
        conn.execute_batch(SYSTEM_INFO_DDL).unwrap();
        conn.execute_batch(SYSTEM_INFO_DDL).unwrap();
    }
}
