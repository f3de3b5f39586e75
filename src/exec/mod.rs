//! Execution control
//!
//! Forking and exec'ing managed applications.

pub mod launch;
