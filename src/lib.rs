//! procwatch: records per-process and system-wide performance samples into
//! one SQLite file per session and reads them back as chart-ready series.
//!
//! This library exposes the core modules for use by the binary and by tests.

pub mod analysis;
pub mod collectors;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod store;
