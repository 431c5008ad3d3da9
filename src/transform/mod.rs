//! Transform facade: grammar lookup, caching, direction selection and the parse/generate
//! pipeline behind a single call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::{generate, parse_with, ParseNode, ParseOptions};
use crate::errors::{EngineError, GrammarError, SourceContext, TransformError};
use crate::grammar::{Direction, Grammar};

pub mod cache;
pub mod source;

pub use cache::GrammarCache;
pub use source::{DirectorySource, GrammarSource, MemorySource, SourceError};

/// Outcome of transforming there and back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTrip {
    pub direction: Direction,
    /// Output of the forward transform.
    pub intermediate: String,
    /// The intermediate text transformed back.
    pub output: String,
}

impl RoundTrip {
    pub fn is_identity(&self, input: &str) -> bool {
        self.output == input
    }
}

/// Transforms text with grammars resolved by reference.
pub struct Transcoder {
    source: Box<dyn GrammarSource>,
    cache: Arc<GrammarCache>,
    options: ParseOptions,
    profiles: BTreeMap<String, String>,
}

impl Transcoder {
    pub fn new(source: impl GrammarSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: Arc::new(GrammarCache::new()),
            options: ParseOptions::default(),
            profiles: BTreeMap::new(),
        }
    }

    /// Grammar directory, extension and limits taken from `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let source = DirectorySource::new(&config.grammar_dir).with_extension(&config.extension);
        Self::new(source)
            .with_options(config.parse_options())
            .with_profiles(config.profiles.clone())
    }

    /// Shares `cache` with other transcoders.
    pub fn with_cache(mut self, cache: Arc<GrammarCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Aliases from request types to grammar references.
    pub fn with_profiles(mut self, profiles: BTreeMap<String, String>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Grammar reference for a request type: its profile when one is configured, else the type.
    pub fn resolve_profile<'a>(&'a self, kind: &'a str) -> &'a str {
        self.profiles.get(kind).map(String::as_str).unwrap_or(kind)
    }

    pub fn cache(&self) -> &GrammarCache {
        &self.cache
    }

    /// The grammar for `reference`, loaded on first use.
    pub fn grammar(&self, reference: &str) -> Result<Arc<Grammar>, GrammarError> {
        self.cache.get_or_load(reference, || {
            let text = self
                .source
                .fetch(reference)
                .map_err(|e| GrammarError::source_unavailable(reference, e))?;
            Grammar::load_named(reference, &text)
        })
    }

    /// Transforms `text` with the grammar `reference` in the direction named by `direction`.
    pub fn transform(
        &self,
        reference: &str,
        text: &str,
        direction: &str,
    ) -> Result<String, EngineError> {
        let grammar = self.grammar(reference).map_err(|error| {
            debug!(reference, error = %error, "grammar unavailable");
            error
        })?;
        let direction = grammar.direction(direction)?;
        self.transcode(&grammar, text, direction).map_err(|error| {
            debug!(reference, %direction, error = %error, "transform failed");
            error.into()
        })
    }

    /// Runs `text` forward and the result backward.
    pub fn round_trip(
        &self,
        reference: &str,
        text: &str,
        direction: &str,
    ) -> Result<RoundTrip, EngineError> {
        let grammar = self.grammar(reference)?;
        let direction = grammar.direction(direction)?;
        let intermediate = self.transcode(&grammar, text, direction)?;
        let output = self.transcode(&grammar, &intermediate, direction.reversed())?;
        Ok(RoundTrip {
            direction,
            intermediate,
            output,
        })
    }

    /// Parse tree of `text` without generating output.
    pub fn tree(
        &self,
        reference: &str,
        text: &str,
        direction: &str,
    ) -> Result<ParseNode, EngineError> {
        let grammar = self.grammar(reference)?;
        let direction = grammar.direction(direction)?;
        let entry = grammar.entry_for(direction)?;
        Ok(parse_with(&grammar, entry, direction, text, &self.options)?)
    }

    /// The composed pipeline on an already loaded grammar.
    pub fn transcode(
        &self,
        grammar: &Grammar,
        text: &str,
        direction: Direction,
    ) -> Result<String, TransformError> {
        let entry = grammar.entry_for(direction)?;
        let tree = parse_with(grammar, entry, direction, text, &self.options)?;
        generate(grammar, direction, &tree)
            .map_err(|error| error.with_input(&SourceContext::from_file("input", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GrammarErrorKind, TransformErrorKind};

    const TAGS: &str = r#"
        %sides plain tagged;
        %bidirectional;
        %entry doc;
        doc : xs=word* <=> xs=word* ;
        word : w=[a-z]+ " " <=> "<w>" w=[a-z]+ "</w>" ;
    "#;

    fn transcoder() -> Transcoder {
        Transcoder::new(MemorySource::new().with("tags", TAGS))
    }

    #[test]
    fn transform_and_back() {
        let t = transcoder();
        let out = t.transform("tags", "ab cd ", "plain2tagged").unwrap();
        assert_eq!(out, "<w>ab</w><w>cd</w>");
        assert_eq!(t.transform("tags", &out, "b2a").unwrap(), "ab cd ");
    }

    #[test]
    fn round_trip_reports_both_texts() {
        let trip = transcoder().round_trip("tags", "ab ", "a2b").unwrap();
        assert_eq!(trip.intermediate, "<w>ab</w>");
        assert!(trip.is_identity("ab "));
    }

    #[test]
    fn errors_keep_their_family() {
        let t = transcoder();
        assert!(matches!(
            t.transform("missing", "x", "a2b"),
            Err(EngineError::Grammar(GrammarError {
                kind: GrammarErrorKind::SourceUnavailable { .. },
                ..
            }))
        ));
        let Err(EngineError::Transform(err)) = t.transform("tags", "ab", "a2b") else {
            panic!("expected a transform error");
        };
        assert_eq!(err.kind, TransformErrorKind::TrailingInput);
        assert_eq!(err.location.offset, 0);
        let Err(EngineError::Transform(err)) = t.transform("tags", "ab ", "sideways") else {
            panic!("expected a transform error");
        };
        assert!(matches!(err.kind, TransformErrorKind::UnknownDirection { .. }));
    }
}
