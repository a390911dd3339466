//! Data persistence for acquisition sessions.

pub mod run_log;

pub use run_log::RunLog;
