//! Observability
//!
//! Leveled, timestamped log records for the supervisor.

pub mod log;
