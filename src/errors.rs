//! Duet error handling.
//!
//! Two disjoint families: [`GrammarError`] (the grammar itself is unusable, caught once at load
//! time) and [`TransformError`] (one input failed against an otherwise valid grammar). Both carry
//! a named source and a primary span so they render as `miette` reports.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use serde::Serialize;
use thiserror::Error;

use crate::grammar::Direction;

/// Longest offending substring quoted in a transform error.
const SNIPPET_MAX_CHARS: usize = 24;

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// Named text an error points into: a grammar source or a transform input.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }

    pub fn locate(&self, offset: usize) -> Location {
        Location::locate(&self.content, offset)
    }
}

/// A position in some text: 0-based byte offset plus 1-based line and column (in chars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Computes line and column for a byte offset. Offsets past the end clamp to the end.
    pub fn locate(text: &str, offset: usize) -> Self {
        let offset = offset.min(text.len());
        let mut line = 1;
        let mut column = 1;
        for (index, ch) in text.char_indices() {
            if index >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The text starting at `offset`, up to the end of its line, capped at a few dozen chars.
pub fn offending_snippet(text: &str, offset: usize) -> String {
    let Some(rest) = text.get(offset.min(text.len())..) else {
        return String::new();
    };
    rest.chars()
        .take_while(|c| *c != '\n')
        .take(SNIPPET_MAX_CHARS)
        .collect()
}

// ============================================================================
// GRAMMAR ERRORS
// ============================================================================

/// Everything that can make a grammar unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarErrorKind {
    #[error("syntax error: {message}")]
    SyntaxError { message: String },

    #[error("rule '{rule}' is defined more than once")]
    DuplicateRule { rule: String },

    #[error("rule '{referenced_by}' references undefined rule '{rule}'")]
    UnknownRule { rule: String, referenced_by: String },

    #[error("left recursion without consuming input: {}", .cycle.join(" -> "))]
    InfiniteRecursion { cycle: Vec<String> },

    #[error("direction {direction} has two entry rules: '{first}' and '{second}'")]
    AmbiguousEntryPoint {
        direction: Direction,
        first: String,
        second: String,
    },

    #[error("bidirectional grammar declares no entry rule for direction {direction}")]
    MissingEntryPoint { direction: Direction },

    #[error("capture '{label}' in rule '{rule}': {reason}")]
    CaptureMismatch {
        rule: String,
        label: String,
        reason: String,
    },

    #[error("rule '{rule}' production {production} has no usable {side}-side template: {reason}")]
    MissingTemplate {
        rule: String,
        production: usize,
        side: String,
        reason: String,
    },

    #[error("grammar '{reference}' is unavailable: {reason}")]
    SourceUnavailable { reference: String, reason: String },
}

impl GrammarErrorKind {
    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::SyntaxError { .. } => "syntax_error",
            Self::DuplicateRule { .. } => "duplicate_rule",
            Self::UnknownRule { .. } => "unknown_rule",
            Self::InfiniteRecursion { .. } => "infinite_recursion",
            Self::AmbiguousEntryPoint { .. } => "ambiguous_entry_point",
            Self::MissingEntryPoint { .. } => "missing_entry_point",
            Self::CaptureMismatch { .. } => "capture_mismatch",
            Self::MissingTemplate { .. } => "missing_template",
            Self::SourceUnavailable { .. } => "source_unavailable",
        }
    }

    fn primary_label(&self) -> &'static str {
        match self {
            Self::SyntaxError { .. } => "invalid syntax",
            Self::DuplicateRule { .. } => "redefined here",
            Self::UnknownRule { .. } => "undefined rule",
            Self::InfiniteRecursion { .. } => "recursion starts here",
            Self::AmbiguousEntryPoint { .. } => "second entry point",
            Self::MissingEntryPoint { .. } => "grammar declared bidirectional",
            Self::CaptureMismatch { .. } => "capture",
            Self::MissingTemplate { .. } => "production",
            Self::SourceUnavailable { .. } => "unavailable",
        }
    }
}

/// A grammar that cannot be loaded, positioned in the grammar source.
#[derive(Debug, Clone)]
pub struct GrammarError {
    pub kind: GrammarErrorKind,
    pub location: Location,
    span: SourceSpan,
    source: Option<Arc<NamedSource<String>>>,
}

impl GrammarError {
    /// Error at a byte range of the grammar source.
    pub fn at(kind: GrammarErrorKind, source: &SourceContext, start: usize, end: usize) -> Self {
        let start = start.min(source.content.len());
        let end = end.clamp(start, source.content.len());
        Self {
            kind,
            location: source.locate(start),
            span: (start..end).into(),
            source: Some(source.to_named_source()),
        }
    }

    /// Error that is not tied to any grammar text, such as an unreadable source.
    pub fn unsourced(kind: GrammarErrorKind) -> Self {
        Self {
            kind,
            location: Location::start(),
            span: (0..0).into(),
            source: None,
        }
    }

    pub fn source_unavailable(reference: &str, reason: impl fmt::Display) -> Self {
        Self::unsourced(GrammarErrorKind::SourceUnavailable {
            reference: reference.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Name of the grammar source this error points into, if any.
    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name())
    }
}

impl std::error::Error for GrammarError {}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}:{}: {}", source.name(), self.location, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Diagnostic for GrammarError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("duet::grammar::{}", self.kind.code_suffix())))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.source.as_ref()?;
        let label = LabeledSpan::new_with_span(Some(self.kind.primary_label().into()), self.span);
        Some(Box::new(std::iter::once(label)))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source.as_deref().map(|s| s as &dyn miette::SourceCode)
    }
}

// ============================================================================
// TRANSFORM ERRORS
// ============================================================================

/// Ways a specific input can fail against a loaded grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformErrorKind {
    #[error("no rule matches{}", expected_suffix(.expected))]
    NoRuleMatches { expected: Vec<String> },

    #[error("unexpected trailing input")]
    TrailingInput,

    #[error("rule '{rule}' has no template for the target side")]
    MissingTemplate {
        rule: String,
        production: Option<usize>,
    },

    #[error("grammar declares no entry point for direction {direction}")]
    UnknownEntryPoint { direction: Direction },

    #[error("unknown direction '{token}'")]
    UnknownDirection { token: String },

    #[error("nesting deeper than {limit} rule calls")]
    DepthLimit { limit: usize },
}

fn expected_suffix(expected: &[String]) -> String {
    match expected {
        [] => String::new(),
        [one] => format!(", expected {}", one),
        many => format!(", expected one of {}", many.join(", ")),
    }
}

/// Error category, the coarse classification request layers map to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The input text does not conform to the grammar.
    Input,
    /// The caller asked for something the grammar does not offer.
    Request,
    /// The grammar cannot serve this input (missing templates).
    Grammar,
    /// A resource limit was hit.
    Limit,
}

impl TransformErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoRuleMatches { .. } | Self::TrailingInput => ErrorCategory::Input,
            Self::UnknownEntryPoint { .. } | Self::UnknownDirection { .. } => {
                ErrorCategory::Request
            }
            Self::MissingTemplate { .. } => ErrorCategory::Grammar,
            Self::DepthLimit { .. } => ErrorCategory::Limit,
        }
    }

    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::NoRuleMatches { .. } => "no_rule_matches",
            Self::TrailingInput => "trailing_input",
            Self::MissingTemplate { .. } => "missing_template",
            Self::UnknownEntryPoint { .. } => "unknown_entry_point",
            Self::UnknownDirection { .. } => "unknown_direction",
            Self::DepthLimit { .. } => "depth_limit",
        }
    }

    fn primary_label(&self) -> &'static str {
        match self {
            Self::NoRuleMatches { .. } => "no rule matches here",
            Self::TrailingInput => "input continues here",
            Self::MissingTemplate { .. } => "matched here",
            Self::UnknownEntryPoint { .. } => "entry point",
            Self::UnknownDirection { .. } => "direction",
            Self::DepthLimit { .. } => "nesting limit reached",
        }
    }
}

/// A transform failure, positioned in the input text. Never accompanied by partial output.
#[derive(Debug, Clone)]
pub struct TransformError {
    pub kind: TransformErrorKind,
    pub location: Location,
    /// The offending text at `location`, empty at end of input.
    pub snippet: String,
    positioned: bool,
    span: SourceSpan,
    source: Option<Arc<NamedSource<String>>>,
}

impl TransformError {
    /// Error at `offset` of the input described by `input`.
    pub fn at(kind: TransformErrorKind, input: &SourceContext, offset: usize) -> Self {
        let location = input.locate(offset);
        let snippet = offending_snippet(&input.content, location.offset);
        Self {
            kind,
            location,
            span: (location.offset, snippet.len()).into(),
            snippet,
            positioned: true,
            source: Some(input.to_named_source()),
        }
    }

    /// Error at a known position whose input text is not at hand yet. See [`Self::with_input`].
    pub fn located(kind: TransformErrorKind, location: Location) -> Self {
        Self {
            kind,
            location,
            snippet: String::new(),
            positioned: true,
            span: (location.offset, 0).into(),
            source: None,
        }
    }

    /// Attaches the input text, filling in the snippet and the diagnostic source.
    pub fn with_input(mut self, input: &SourceContext) -> Self {
        if !self.positioned || self.source.is_some() {
            return self;
        }
        self.snippet = offending_snippet(&input.content, self.location.offset);
        self.span = (self.location.offset, self.snippet.len()).into();
        self.source = Some(input.to_named_source());
        self
    }

    /// Error that is not tied to a position in any input, e.g. a bad direction token.
    pub fn unpositioned(kind: TransformErrorKind) -> Self {
        Self {
            kind,
            location: Location::start(),
            snippet: String::new(),
            positioned: false,
            span: (0..0).into(),
            source: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl std::error::Error for TransformError {}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positioned {
            return write!(f, "{}", self.kind);
        }
        write!(f, "{} at {}", self.kind, self.location)?;
        if self.source.is_none() {
            Ok(())
        } else if self.snippet.is_empty() {
            write!(f, " (end of input)")
        } else {
            write!(f, " near {:?}", self.snippet)
        }
    }
}

impl Diagnostic for TransformError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("duet::transform::{}", self.kind.code_suffix())))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.source.as_ref()?;
        let label = LabeledSpan::new_with_span(Some(self.kind.primary_label().into()), self.span);
        Some(Box::new(std::iter::once(label)))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source.as_deref().map(|s| s as &dyn miette::SourceCode)
    }
}

// ============================================================================
// FACADE ERROR
// ============================================================================

/// What the transform facade can fail with: exactly one of the two families.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transform(#[from] TransformError),
}

/// Prints an error with full miette diagnostics
pub fn print_error<E: Diagnostic + Send + Sync + 'static>(error: E) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}
