//! nanoinit: a minimal init-style process supervisor
//!
//! Launches a declared list of applications, restarts the ones marked for
//! auto-restart, forwards stop signals to all of them and reloads the whole
//! set on SIGUSR1.
//!
//! # Architecture
//!
//! ## Relaxed JSON ([`json`])
//! - [`json::parser`]: streaming, bounded-depth parser emitting one event per leaf
//! - [`json::path`]: structural paths and their `/key[n]` string form
//! - [`json::escape`]: lazy string decoding
//!
//! ## Configuration ([`config`])
//! - [`config::projector`]: selector scoping and schema validation
//! - [`config::source`]: file-backed source re-read on every cycle
//! - [`config::types`]: descriptors, configuration and error types
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::signal`]: async-signal-safe stop/reload flags
//! - [`kernel::process`]: locating a running instance for `--reload`
//!
//! ## Execution Control ([`exec`])
//! - [`exec::launch`]: fork, redirect, exec with exec-failure reporting
//!
//! ## Supervision ([`core`])
//! - [`core::supervisor`]: start, monitor, forward, drain, reload cycle
//! - [`core::types`]: process control blocks and cycle outcomes
//!
//! ## Observability ([`observability`])
//! - [`observability::log`]: timestamped log sink

// Relaxed JSON
pub mod json;

// Configuration
pub mod config;

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Supervision
pub mod core;

// Observability
pub mod observability;

// CLI entrypoint wiring for the nanoinit binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
