//! Grammar loading and transformation through the public API.

mod common;

use common::memory_transcoder;
use duet::grammar::analyze;
use duet::{
    Direction, EngineError, ErrorCategory, Grammar, GrammarErrorKind, ParseOptions,
    TransformErrorKind,
};
use rstest::rstest;

const NAMES: &str = r#"
    %name "names";
    %sides given family;
    %bidirectional;
    %entry r;
    r : f=name " " l=name <=> l=name ", " f=name ;
    name = [A-Z] [a-z]* ;
"#;

fn transform_error(grammar: &str, text: &str, direction: &str) -> duet::TransformError {
    match memory_transcoder(grammar).transform("g", text, direction) {
        Err(EngineError::Transform(error)) => error,
        other => panic!("expected a transform error, got {:?}", other),
    }
}

// ============================================================================
// GRAMMAR LOADING
// ============================================================================

#[rstest]
#[case::unbalanced_group(r#"r = ( "a" ;"#, "syntax_error")]
#[case::reversed_bounds(r#"r = "a"{3,1} ;"#, "syntax_error")]
#[case::empty_class(r#"r = [] ;"#, "syntax_error")]
#[case::unknown_entry_side(r#"%entry c r; r = "a" ;"#, "syntax_error")]
#[case::duplicate_rule(r#"r = "a" ; r = "b" ;"#, "duplicate_rule")]
#[case::unknown_rule(r#"r = s ;"#, "unknown_rule")]
#[case::left_recursion(r#"r = r "a" | "a" ;"#, "infinite_recursion")]
#[case::two_entries(r#"%entry a; %entry a b; a = "x" ; b = "y" ;"#, "ambiguous_entry_point")]
#[case::one_entry(r#"%bidirectional; %entry a r; r : "x" <=> "y" ;"#, "missing_entry_point")]
#[case::label_mismatch(r#"%entry r; r : x=[a-z] <=> y=[a-z] ;"#, "capture_mismatch")]
#[case::absent_side(r#"%bidirectional; %entry r; r : "x" <=> ~ ;"#, "missing_template")]
fn invalid_grammars_are_rejected(#[case] source: &str, #[case] code: &str) {
    let error = Grammar::load(source).unwrap_err();
    assert_eq!(error.kind.code_suffix(), code, "{}", error);
}

#[test]
fn analysis_collects_every_error() {
    let analysis = analyze("many.duet", r#"r = s ; r = "x" ; t = t "y" ;"#);
    let codes: Vec<_> = analysis
        .report
        .errors
        .iter()
        .map(|e| e.kind.code_suffix())
        .collect();
    assert!(codes.contains(&"duplicate_rule"));
    assert!(codes.contains(&"unknown_rule"));
    assert!(codes.contains(&"infinite_recursion"));
    assert!(analysis.grammar.is_none());
}

#[test]
fn grammar_error_points_into_the_grammar() {
    let error = Grammar::load_named("pos.duet", "r = \"a\" ;\nq = missing ;").unwrap_err();
    assert_eq!(error.source_name(), Some("pos.duet"));
    assert_eq!(error.location.line, 2);
    assert!(matches!(
        error.kind,
        GrammarErrorKind::UnknownRule { ref rule, .. } if rule == "missing"
    ));
}

#[test]
fn unavailable_grammar_is_a_grammar_error() {
    let Err(EngineError::Grammar(error)) = memory_transcoder(NAMES).transform("nope", "A B", "a2b")
    else {
        panic!("expected a grammar error");
    };
    assert_eq!(error.kind.code_suffix(), "source_unavailable");
}

#[test]
fn fingerprint_follows_the_text() {
    let one = Grammar::load(NAMES).unwrap();
    let two = Grammar::load(NAMES).unwrap();
    let other = Grammar::load(&NAMES.replace("\", \"", "\"; \"")).unwrap();
    assert_eq!(one.fingerprint(), two.fingerprint());
    assert_ne!(one.fingerprint(), other.fingerprint());
    assert_eq!(one.fingerprint().len(), 64);
}

// ============================================================================
// TRANSFORMATION
// ============================================================================

#[rstest]
#[case::forward("Ada Lovelace", "given2family", "Lovelace, Ada")]
#[case::backward("Lovelace, Ada", "family2given", "Ada Lovelace")]
#[case::canonical_token("Grace Hopper", "a2b", "Hopper, Grace")]
#[case::spelled_out("Hopper, Grace", "family-to-given", "Grace Hopper")]
fn templates_reorder_captures(#[case] input: &str, #[case] direction: &str, #[case] expected: &str) {
    let output = memory_transcoder(NAMES).transform("g", input, direction).unwrap();
    assert_eq!(output, expected);
}

#[rstest]
#[case::first_alternative_wins(r#"%entry r; r : x=("ab" | "a") <=> "[" x=("ab" | "a") "]" ;"#, "ab", "[ab]")]
#[case::greedy_gives_back(r#"%entry r; r : x="a"* "a" <=> x="a"* "!" ;"#, "aaa", "aa!")]
#[case::uncaptured_parts_render_canonically(
    r#"%entry r; r : x=[a-z] ("," | ";") <=> x=[a-z] (";" | ",") [0-9]{2} ;"#,
    "q,",
    "q;00"
)]
fn forward_transforms(#[case] grammar: &str, #[case] input: &str, #[case] expected: &str) {
    let output = memory_transcoder(grammar).transform("g", input, "a2b").unwrap();
    assert_eq!(output, expected);
}

#[test]
fn trailing_input_is_positioned() {
    let error = transform_error(NAMES, "Ada Lovelace ", "a2b");
    assert_eq!(error.kind, TransformErrorKind::TrailingInput);
    assert_eq!(error.location.offset, 12);
    assert_eq!(error.location.column, 13);
    assert_eq!(error.kind.category(), ErrorCategory::Input);
}

#[test]
fn failure_reports_what_was_expected() {
    let error = transform_error(NAMES, "ada", "a2b");
    assert_eq!(error.location.offset, 0);
    assert_eq!(
        error.kind,
        TransformErrorKind::NoRuleMatches {
            expected: vec!["[A-Z]".to_string()]
        }
    );
    assert_eq!(error.snippet, "ada");
}

#[test]
fn one_sided_production_has_no_template() {
    let grammar = r#"%entry r; r : "x" <=> "y" : "z" <=> ~ ;"#;
    assert_eq!(memory_transcoder(grammar).transform("g", "x", "a2b").unwrap(), "y");
    let error = transform_error(grammar, "z", "a2b");
    assert_eq!(
        error.kind,
        TransformErrorKind::MissingTemplate {
            rule: "r".to_string(),
            production: Some(2)
        }
    );
    assert_eq!(error.kind.category(), ErrorCategory::Grammar);
}

#[test]
fn direction_without_entry_point() {
    let error = transform_error(r#"%entry a r; r : "x" <=> "y" ;"#, "y", "b2a");
    assert_eq!(
        error.kind,
        TransformErrorKind::UnknownEntryPoint {
            direction: Direction::BToA
        }
    );
    assert_eq!(error.kind.category(), ErrorCategory::Request);
}

#[test]
fn nesting_beyond_the_limit() {
    let grammar = r#"%entry r; r : x=n <=> x=n ; n = "(" n ")" | "" ;"#;
    let input = format!("{}{}", "(".repeat(20), ")".repeat(20));
    let transcoder = memory_transcoder(grammar).with_options(ParseOptions { max_call_depth: 10 });
    let Err(EngineError::Transform(error)) = transcoder.transform("g", &input, "a2b") else {
        panic!("expected a transform error");
    };
    assert_eq!(error.kind, TransformErrorKind::DepthLimit { limit: 10 });
    assert_eq!(error.kind.category(), ErrorCategory::Limit);

    let unlimited = memory_transcoder(grammar);
    assert_eq!(unlimited.transform("g", &input, "a2b").unwrap(), input);
}

#[test]
fn round_trip_of_shipped_grammar() {
    let transcoder = common::shipped_transcoder();
    let input = "1. a[bc]d\n2. (e)f\n";
    let trip = transcoder.round_trip("epidoc-lite", input, "leiden2xml").unwrap();
    assert!(trip.intermediate.starts_with("<ab>\n<lb n=\"1\"/>"));
    assert!(trip.is_identity(input), "came back as {:?}", trip.output);
}

#[test]
fn parse_tree_exposes_captures() {
    let tree = memory_transcoder(NAMES).tree("g", "Ada Lovelace", "a2b").unwrap();
    assert_eq!(&*tree.name, "r");
    assert_eq!(tree.production, Some(0));
    let given = tree.capture("f").expect("capture f");
    assert_eq!((given.span.start, given.span.end), (0, 3));
    let json = serde_json::to_value(&tree).unwrap();
    assert_eq!(json["name"], "r");
}
