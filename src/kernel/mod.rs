//! Thin wrappers around Linux signal and process primitives.

pub mod process;
pub mod signal;
