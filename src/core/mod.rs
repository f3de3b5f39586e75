//! Supervision core.
//!
//! Owns the process table of a cycle and the start/monitor/drain/reload
//! state machine built on top of exec and kernel primitives.

pub mod supervisor;
pub mod types;
