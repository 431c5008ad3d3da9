//! Duet: one declarative grammar relating two textual notations, used to transform text in
//! either direction.
//!
//! ```no_run
//! use duet::transform::{DirectorySource, Transcoder};
//!
//! let transcoder = Transcoder::new(DirectorySource::new("grammars"));
//! let xml = transcoder.transform("epidoc-lite", "1. [abc]\n", "leiden2xml")?;
//! # Ok::<(), duet::EngineError>(())
//! ```

pub use crate::engine::{ParseNode, ParseOptions};
pub use crate::errors::{
    EngineError, ErrorCategory, GrammarError, GrammarErrorKind, Location, TransformError,
    TransformErrorKind,
};
pub use crate::grammar::{Direction, Grammar, Side};
pub use crate::transform::{GrammarCache, GrammarSource, Transcoder};

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod grammar;
pub mod service;
pub mod transform;
