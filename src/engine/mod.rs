//! Matching and generation against a loaded grammar.

pub mod generator;
pub mod matcher;
pub mod tree;

pub use generator::generate;
pub use matcher::{parse, parse_with};
pub use tree::{Capture, CaptureValue, ParseNode};

/// Default bound on nested rule calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Limits for one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub max_call_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
