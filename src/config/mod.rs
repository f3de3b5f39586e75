//! Configuration
//!
//! Application descriptors, the projection of a JSON document onto them,
//! and the file-backed source the supervisor reloads from.

pub mod projector;
pub mod source;
pub mod types;
