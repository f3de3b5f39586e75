//! Relaxed JSON
//!
//! Constant-memory streaming parser that reports each terminal value with its
//! structural path, plus the lazy string decoding it relies on.

pub mod escape;
pub mod parser;
pub mod path;

pub use escape::{EscapeError, RawStr};
pub use parser::{parse, Flow, ParseError, Value};
pub use path::{Path, PathElement};
