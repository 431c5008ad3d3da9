//! Transcoding grammars.
//!
//! A grammar is loaded once from source text, validated as a whole, and compiled into one matcher
//! program per side plus a template per production side. The loaded value is immutable and can be
//! shared freely across threads.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{GrammarError, GrammarErrorKind, SourceContext, TransformError, TransformErrorKind};

pub mod compile;
pub mod loader;
pub mod model;
pub mod validators;

pub use compile::{Template, TemplatePart, TemplateState};
pub use model::{Direction, Expr, Production, Rule, RuleBody, RuleId, Side, Span};
pub use validators::{GrammarValidators, ValidationReport, ValidationReporter};

use compile::Program;

/// A validated, compiled grammar.
#[derive(Debug)]
pub struct Grammar {
    name: Option<String>,
    source_name: String,
    sides: [String; 2],
    bidirectional: bool,
    rules: Vec<Rule>,
    index: HashMap<String, RuleId>,
    entries: [Option<RuleId>; 2],
    fingerprint: String,
    programs: [Program; 2],
    templates: Vec<Vec<[TemplateState; 2]>>,
}

/// Result of checking a grammar source: the grammar when it is usable, and the full report.
#[derive(Debug)]
pub struct Analysis {
    pub grammar: Option<Grammar>,
    pub report: ValidationReport,
}

/// Runs the whole load pipeline and keeps every error and warning it finds.
pub fn analyze(source_name: &str, text: &str) -> Analysis {
    let source = SourceContext::from_file(source_name, text);
    let mut report = ValidationReport::new();

    let draft = match loader::parse_source(&source) {
        Ok(draft) => draft,
        Err(error) => {
            report.report_error(error);
            return Analysis {
                grammar: None,
                report,
            };
        }
    };

    let index = GrammarValidators::check_duplicate_rules(&draft, &source, &mut report);
    GrammarValidators::check_rule_references(&draft, &index, &source, &mut report);
    let entries = GrammarValidators::check_entry_points(&draft, &index, &source, &mut report);
    GrammarValidators::check_captures(&draft, &source, &mut report);
    GrammarValidators::check_left_recursion(&draft, &index, &source, &mut report);
    if !report.is_valid() {
        return Analysis {
            grammar: None,
            report,
        };
    }

    let programs = Side::BOTH.map(|side| compile::compile_program(&draft.rules, &index, side));
    let templates = compile::compile_templates(&draft.rules, &index);
    let grammar = Grammar {
        sides: draft.side_names(),
        name: draft.name,
        source_name: source_name.to_string(),
        bidirectional: draft.bidirectional.is_some(),
        rules: draft.rules,
        index,
        entries,
        fingerprint: format!("{:x}", Sha256::digest(text.as_bytes())),
        programs,
        templates,
    };

    GrammarValidators::check_coverage(&grammar, draft.bidirectional, &source, &mut report);
    GrammarValidators::check_nullable_repetition(&grammar, &mut report);
    GrammarValidators::check_unreachable_rules(&grammar, &mut report);

    Analysis {
        grammar: report.is_valid().then_some(grammar),
        report,
    }
}

impl Grammar {
    /// Loads a grammar from source text.
    pub fn load(text: &str) -> Result<Self, GrammarError> {
        Self::load_named("grammar", text)
    }

    /// Loads a grammar, naming its source in diagnostics.
    pub fn load_named(source_name: &str, text: &str) -> Result<Self, GrammarError> {
        let Analysis { grammar, report } = analyze(source_name, text);
        let Some(grammar) = grammar else {
            let error = report.errors.into_iter().next().unwrap_or_else(|| {
                GrammarError::unsourced(GrammarErrorKind::SyntaxError {
                    message: "grammar rejected".to_string(),
                })
            });
            debug!(grammar = source_name, error = %error, "grammar rejected");
            return Err(error);
        };

        for warning in &report.warnings {
            warn!(grammar = source_name, "{}", warning);
        }
        debug!(
            grammar = source_name,
            rules = grammar.rules.len(),
            fingerprint = %grammar.fingerprint,
            "grammar loaded"
        );
        Ok(grammar)
    }

    /// The `%name` declared in the source, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name of the source the grammar was loaded from.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn sides(&self) -> &[String; 2] {
        &self.sides
    }

    pub fn side_name(&self, side: Side) -> &str {
        &self.sides[side.index()]
    }

    pub fn is_bidirectional(&self) -> bool {
        self.bidirectional
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.index.get(name).copied()
    }

    pub fn entry(&self, direction: Direction) -> Option<RuleId> {
        self.entries[direction.index()]
    }

    /// Entry rule for `direction`, or `UnknownEntryPoint`.
    pub fn entry_for(&self, direction: Direction) -> Result<RuleId, TransformError> {
        self.entry(direction).ok_or_else(|| {
            TransformError::unpositioned(TransformErrorKind::UnknownEntryPoint { direction })
        })
    }

    /// Resolves a direction token against this grammar's side names.
    pub fn direction(&self, token: &str) -> Result<Direction, TransformError> {
        Direction::resolve(token, &self.sides).ok_or_else(|| {
            TransformError::unpositioned(TransformErrorKind::UnknownDirection {
                token: token.to_string(),
            })
        })
    }

    /// SHA-256 of the source text, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn template(&self, rule: RuleId, production: usize, side: Side) -> Option<&TemplateState> {
        self.templates
            .get(rule.0)?
            .get(production)
            .map(|states| &states[side.index()])
    }

    pub(crate) fn program(&self, side: Side) -> &Program {
        &self.programs[side.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRS: &str = r#"
        %name "pairs";
        %sides leiden xml;
        %bidirectional;
        %entry doc;
        doc : items=item* <=> "<doc>" items=item* "</doc>" ;
        item : "(" w=word ")" <=> "<i>" w=word "</i>" ;
        word = [a-z]+ ;
    "#;

    #[test]
    fn loads_and_exposes_metadata() {
        let grammar = Grammar::load_named("pairs.duet", PAIRS).unwrap();
        assert_eq!(grammar.name(), Some("pairs"));
        assert_eq!(grammar.source_name(), "pairs.duet");
        assert_eq!(grammar.side_name(Side::B), "xml");
        assert!(grammar.is_bidirectional());
        assert_eq!(grammar.rule_id("item"), Some(RuleId(1)));
        assert_eq!(grammar.entry(Direction::BToA), Some(RuleId(0)));
        assert_eq!(grammar.fingerprint().len(), 64);
    }

    #[test]
    fn direction_tokens_use_side_names() {
        let grammar = Grammar::load(PAIRS).unwrap();
        assert_eq!(grammar.direction("xml2leiden").unwrap(), Direction::BToA);
        let err = grammar.direction("up").unwrap_err();
        assert_eq!(
            err.kind,
            TransformErrorKind::UnknownDirection { token: "up".into() }
        );
    }

    #[test]
    fn swapped_side_names_keep_their_meaning() {
        let grammar = Grammar::load(r#"%sides b a; %entry r; r = "x" ;"#).unwrap();
        assert_eq!(grammar.direction("a2b").unwrap(), Direction::BToA);
        assert_eq!(grammar.direction("b_to_a").unwrap(), Direction::AToB);
    }

    #[test]
    fn missing_entry_is_reported_per_direction() {
        let grammar = Grammar::load(r#"%entry a r; r = "x" ;"#).unwrap();
        assert!(grammar.entry_for(Direction::AToB).is_ok());
        assert_eq!(
            grammar.entry_for(Direction::BToA).unwrap_err().kind,
            TransformErrorKind::UnknownEntryPoint {
                direction: Direction::BToA
            }
        );
    }

    #[test]
    fn load_returns_first_error_with_position() {
        let err = Grammar::load_named("bad.duet", "%entry r;\nr = missing ;").unwrap_err();
        assert_eq!(err.location.line, 2);
        assert_eq!(err.source_name(), Some("bad.duet"));
        assert!(matches!(err.kind, GrammarErrorKind::UnknownRule { .. }));
    }

    #[test]
    fn analyze_keeps_all_errors() {
        let analysis = analyze("t", r#"a = x ; b = y ;"#);
        assert!(analysis.grammar.is_none());
        assert_eq!(analysis.report.errors.len(), 2);
    }

    #[test]
    fn same_source_same_fingerprint() {
        let a = Grammar::load(PAIRS).unwrap();
        let b = Grammar::load(PAIRS).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
