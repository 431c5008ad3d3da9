use std::collections::{BTreeSet, HashMap, HashSet};

use super::compile::TemplateState;
use super::loader::GrammarDraft;
use super::model::{Direction, Expr, Rule, RuleBody, RuleId, Side, Span};
use super::Grammar;
use crate::errors::{GrammarError, GrammarErrorKind, SourceContext};

// =====================
// Report
// =====================

/// Outcome of checking one grammar source: every error found, plus advisory warnings.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<GrammarError>,
    pub warnings: Vec<String>,
}

pub trait ValidationReporter {
    fn report_error(&mut self, error: GrammarError);
    fn report_warning(&mut self, message: impl Into<String>);
}

impl ValidationReporter for ValidationReport {
    fn report_error(&mut self, error: GrammarError) {
        self.errors.push(error);
    }
    fn report_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =====================
// Validators
// =====================

/// Validates a grammar draft for structural problems.
/// Each validator focuses on a single concern and reports everything it finds.
pub struct GrammarValidators;

impl GrammarValidators {
    /// Checks that every rule name is defined once. Returns the name index, first definition wins.
    pub fn check_duplicate_rules(
        draft: &GrammarDraft,
        source: &SourceContext,
        report: &mut ValidationReport,
    ) -> HashMap<String, RuleId> {
        let mut index = HashMap::new();
        for rule in &draft.rules {
            if index.contains_key(&rule.name) {
                let kind = GrammarErrorKind::DuplicateRule {
                    rule: rule.name.clone(),
                };
                report.report_error(at(kind, source, rule.span));
                continue;
            }
            index.insert(rule.name.clone(), rule.id);
        }
        index
    }

    /// Checks for references to undefined rules on either side of every rule.
    pub fn check_rule_references(
        draft: &GrammarDraft,
        index: &HashMap<String, RuleId>,
        source: &SourceContext,
        report: &mut ValidationReport,
    ) {
        for rule in &draft.rules {
            let mut missing = Vec::new();
            for_each_expr(rule, |_, expr| {
                expr.for_each_ref(&mut |name, span| {
                    if !index.contains_key(name) {
                        missing.push((name.to_string(), span));
                    }
                })
            });
            for (name, span) in missing {
                let kind = GrammarErrorKind::UnknownRule {
                    rule: name,
                    referenced_by: rule.name.clone(),
                };
                report.report_error(at(kind, source, span));
            }
        }
    }

    /// Resolves `%entry` declarations into one entry rule per direction.
    pub fn check_entry_points(
        draft: &GrammarDraft,
        index: &HashMap<String, RuleId>,
        source: &SourceContext,
        report: &mut ValidationReport,
    ) -> [Option<RuleId>; 2] {
        let sides = draft.side_names();
        let mut entries: [Option<(RuleId, &str)>; 2] = [None, None];

        for decl in &draft.entries {
            let directions: Vec<Direction> = match &decl.side {
                None => Direction::BOTH.to_vec(),
                Some(name) => match sides.iter().position(|side| side == name) {
                    Some(i) => vec![Direction::from_source(Side::BOTH[i])],
                    None => {
                        let message = format!(
                            "%entry names unknown side '{}' (sides are {} and {})",
                            name, sides[0], sides[1]
                        );
                        report.report_error(at(
                            GrammarErrorKind::SyntaxError { message },
                            source,
                            decl.span,
                        ));
                        continue;
                    }
                },
            };

            let Some(&id) = index.get(&decl.rule) else {
                let kind = GrammarErrorKind::UnknownRule {
                    rule: decl.rule.clone(),
                    referenced_by: "%entry".to_string(),
                };
                report.report_error(at(kind, source, decl.span));
                continue;
            };

            for direction in directions {
                match entries[direction.index()] {
                    Some((existing, _)) if existing == id => {}
                    Some((_, first)) => {
                        let kind = GrammarErrorKind::AmbiguousEntryPoint {
                            direction,
                            first: first.to_string(),
                            second: decl.rule.clone(),
                        };
                        report.report_error(at(kind, source, decl.span));
                    }
                    None => entries[direction.index()] = Some((id, decl.rule.as_str())),
                }
            }
        }

        entries.map(|entry| entry.map(|(id, _)| id))
    }

    /// Checks capture placement and that the labels of both sides of a production agree.
    pub fn check_captures(
        draft: &GrammarDraft,
        source: &SourceContext,
        report: &mut ValidationReport,
    ) {
        let sides = draft.side_names();
        for rule in &draft.rules {
            match &rule.body {
                RuleBody::Shared(expr) => {
                    for capture in collect_captures(expr) {
                        report.report_error(capture_error(
                            rule,
                            &capture.label,
                            "shared rules copy their text verbatim and cannot capture",
                            capture.span,
                            source,
                        ));
                    }
                }
                RuleBody::Productions(productions) => {
                    for production in productions {
                        Self::check_production_captures(rule, production, &sides, source, report);
                    }
                }
            }
        }
    }

    fn check_production_captures(
        rule: &Rule,
        production: &super::model::Production,
        sides: &[String; 2],
        source: &SourceContext,
        report: &mut ValidationReport,
    ) {
        let mut per_side: [Vec<CaptureSite>; 2] = [Vec::new(), Vec::new()];

        for side in Side::BOTH {
            let Some(expr) = production.side(side) else {
                continue;
            };
            let captures = collect_captures(expr);
            let mut seen = HashSet::new();
            for capture in &captures {
                if let Some(operator) = capture.nested_under {
                    let reason = format!("captures cannot sit under {}", operator);
                    report.report_error(capture_error(rule, &capture.label, &reason, capture.span, source));
                }
                if !seen.insert(capture.label.as_str()) {
                    let reason = format!("label is used twice on the {} side", sides[side.index()]);
                    report.report_error(capture_error(rule, &capture.label, &reason, capture.span, source));
                }
            }
            per_side[side.index()] = captures;
        }

        if production.sides.iter().any(Option::is_none) {
            return;
        }

        for side in Side::BOTH {
            let other = &per_side[side.other().index()];
            for capture in &per_side[side.index()] {
                match other.iter().find(|c| c.label == capture.label) {
                    None => {
                        let reason = format!(
                            "label appears only on the {} side",
                            sides[side.index()]
                        );
                        report.report_error(capture_error(rule, &capture.label, &reason, capture.span, source));
                    }
                    // report kind mismatches once, from the A side
                    Some(peer) if side == Side::A && peer.node_rule != capture.node_rule => {
                        let reason = match (&capture.node_rule, &peer.node_rule) {
                            (Some(a), Some(b)) => {
                                format!("captures rule '{}' on one side and '{}' on the other", a, b)
                            }
                            _ => "captures rule nodes on one side and plain text on the other"
                                .to_string(),
                        };
                        report.report_error(capture_error(rule, &capture.label, &reason, capture.span, source));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    /// Checks every side for left recursion that consumes no input.
    pub fn check_left_recursion(
        draft: &GrammarDraft,
        index: &HashMap<String, RuleId>,
        source: &SourceContext,
        report: &mut ValidationReport,
    ) {
        let mut reported: HashSet<BTreeSet<RuleId>> = HashSet::new();

        for side in Side::BOTH {
            let nullable = nullable_rules(&draft.rules, index, side);
            let graph: Vec<Vec<(RuleId, Span)>> = draft
                .rules
                .iter()
                .map(|rule| {
                    let mut calls = Vec::new();
                    for expr in rule.side_exprs(side) {
                        left_calls(expr, &nullable, index, &mut calls);
                    }
                    calls
                })
                .collect();

            for (cycle, span) in find_cycles(&graph) {
                let members: BTreeSet<RuleId> = cycle.iter().copied().collect();
                if !reported.insert(members) {
                    continue;
                }
                let names = cycle
                    .iter()
                    .map(|id| draft.rules[id.0].name.clone())
                    .collect();
                report.report_error(at(
                    GrammarErrorKind::InfiniteRecursion { cycle: names },
                    source,
                    span,
                ));
            }
        }
    }

    /// For bidirectional grammars: both directions need an entry rule, and every production
    /// reachable from an entry needs a usable template on the side it generates.
    pub fn check_coverage(
        grammar: &Grammar,
        bidirectional: Option<Span>,
        source: &SourceContext,
        report: &mut ValidationReport,
    ) {
        let Some(declared_at) = bidirectional else {
            return;
        };

        for direction in Direction::BOTH {
            let Some(entry) = grammar.entries[direction.index()] else {
                report.report_error(at(
                    GrammarErrorKind::MissingEntryPoint { direction },
                    source,
                    declared_at,
                ));
                continue;
            };

            let target = direction.target();
            for id in generated_rules(grammar, entry, direction.source()) {
                let rule = &grammar.rules[id.0];
                for (i, production) in rule.productions().iter().enumerate() {
                    if production.side(direction.source()).is_none() {
                        continue;
                    }
                    let reason = match &grammar.templates[id.0][i][target.index()] {
                        TemplateState::Ready(_) => continue,
                        TemplateState::Absent => "the side is written as '~'".to_string(),
                        TemplateState::Unrenderable(reason) => reason.clone(),
                    };
                    let kind = GrammarErrorKind::MissingTemplate {
                        rule: rule.name.clone(),
                        production: i + 1,
                        side: grammar.side_name(target).to_string(),
                        reason,
                    };
                    report.report_error(at(kind, source, production.span));
                }
            }
        }
    }

    /// Warns about rules no entry point can reach.
    pub fn check_unreachable_rules(grammar: &Grammar, report: &mut ValidationReport) {
        let roots: Vec<RuleId> = grammar.entries.iter().flatten().copied().collect();
        if roots.is_empty() {
            return;
        }

        let mut reachable = HashSet::new();
        let mut stack = roots;
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            for side in Side::BOTH {
                for expr in grammar.rules[id.0].side_exprs(side) {
                    expr.for_each_ref(&mut |name, _| {
                        if let Some(&next) = grammar.index.get(name) {
                            stack.push(next);
                        }
                    });
                }
            }
        }

        for rule in &grammar.rules {
            if !reachable.contains(&rule.id) {
                report.report_warning(format!(
                    "rule '{}' is not reachable from any entry point",
                    rule.name
                ));
            }
        }
    }

    /// Warns about unbounded repetitions whose body can match empty input.
    pub fn check_nullable_repetition(grammar: &Grammar, report: &mut ValidationReport) {
        for side in Side::BOTH {
            let nullable = nullable_rules(&grammar.rules, &grammar.index, side);
            for rule in &grammar.rules {
                let mut found = false;
                for expr in rule.side_exprs(side) {
                    visit_repeats(expr, &mut |body| {
                        found |= nullable_expr(body, &nullable, &grammar.index);
                    });
                }
                // shared rules are visited on both sides; warn once
                if found && !(rule.is_shared() && side == Side::B) {
                    report.report_warning(format!(
                        "rule '{}' repeats an expression that can match empty input on the {} side",
                        rule.name,
                        grammar.side_name(side)
                    ));
                }
            }
        }
    }
}

// =====================
// Helpers
// =====================

fn at(kind: GrammarErrorKind, source: &SourceContext, span: Span) -> GrammarError {
    GrammarError::at(kind, source, span.start, span.end)
}

fn capture_error(
    rule: &Rule,
    label: &str,
    reason: &str,
    span: Span,
    source: &SourceContext,
) -> GrammarError {
    let kind = GrammarErrorKind::CaptureMismatch {
        rule: rule.name.clone(),
        label: label.to_string(),
        reason: reason.to_string(),
    };
    at(kind, source, span)
}

fn for_each_expr(rule: &Rule, mut visit: impl FnMut(Option<Side>, &Expr)) {
    match &rule.body {
        RuleBody::Shared(expr) => visit(None, expr),
        RuleBody::Productions(productions) => {
            for production in productions {
                for side in Side::BOTH {
                    if let Some(expr) = production.side(side) {
                        visit(Some(side), expr);
                    }
                }
            }
        }
    }
}

struct CaptureSite {
    label: String,
    span: Span,
    node_rule: Option<String>,
    nested_under: Option<&'static str>,
}

fn collect_captures(expr: &Expr) -> Vec<CaptureSite> {
    fn walk(expr: &Expr, nested_under: Option<&'static str>, out: &mut Vec<CaptureSite>) {
        match expr {
            Expr::Capture { label, expr, span } => {
                out.push(CaptureSite {
                    label: label.clone(),
                    span: *span,
                    node_rule: expr.node_capture_rule().map(str::to_string),
                    nested_under,
                });
                walk(expr, nested_under.or(Some("another capture")), out);
            }
            Expr::Seq(items) => items.iter().for_each(|item| walk(item, nested_under, out)),
            Expr::Choice(alternatives) => alternatives
                .iter()
                .for_each(|alt| walk(alt, nested_under.or(Some("a choice")), out)),
            Expr::Repeat { expr, .. } => walk(expr, nested_under.or(Some("a repetition")), out),
            Expr::Literal(_) | Expr::Class(_) | Expr::Any | Expr::Ref { .. } => {}
        }
    }

    let mut out = Vec::new();
    walk(expr, None, &mut out);
    out
}

fn nullable_expr(expr: &Expr, nullable: &[bool], index: &HashMap<String, RuleId>) -> bool {
    match expr {
        Expr::Literal(text) => text.is_empty(),
        Expr::Class(_) | Expr::Any => false,
        Expr::Ref { name, .. } => index.get(name).is_some_and(|id| nullable[id.0]),
        Expr::Seq(items) => items.iter().all(|item| nullable_expr(item, nullable, index)),
        Expr::Choice(alternatives) => alternatives
            .iter()
            .any(|alt| nullable_expr(alt, nullable, index)),
        Expr::Repeat { expr, min, .. } => *min == 0 || nullable_expr(expr, nullable, index),
        Expr::Capture { expr, .. } => nullable_expr(expr, nullable, index),
    }
}

/// Which rules can succeed without consuming input when parsing `side`.
fn nullable_rules(rules: &[Rule], index: &HashMap<String, RuleId>, side: Side) -> Vec<bool> {
    let mut nullable = vec![false; rules.len()];
    loop {
        let mut changed = false;
        for rule in rules {
            if nullable[rule.id.0] {
                continue;
            }
            if rule
                .side_exprs(side)
                .iter()
                .any(|expr| nullable_expr(expr, &nullable, index))
            {
                nullable[rule.id.0] = true;
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

/// Collects the rules `expr` may call before consuming any input. Returns whether `expr` is
/// nullable.
fn left_calls(
    expr: &Expr,
    nullable: &[bool],
    index: &HashMap<String, RuleId>,
    out: &mut Vec<(RuleId, Span)>,
) -> bool {
    match expr {
        Expr::Literal(text) => text.is_empty(),
        Expr::Class(_) | Expr::Any => false,
        Expr::Ref { name, span } => match index.get(name) {
            Some(&id) => {
                out.push((id, *span));
                nullable[id.0]
            }
            None => false,
        },
        Expr::Seq(items) => {
            for item in items {
                if !left_calls(item, nullable, index, out) {
                    return false;
                }
            }
            true
        }
        Expr::Choice(alternatives) => {
            let mut any = false;
            for alt in alternatives {
                any |= left_calls(alt, nullable, index, out);
            }
            any
        }
        Expr::Repeat { expr, min, .. } => {
            let body = left_calls(expr, nullable, index, out);
            *min == 0 || body
        }
        Expr::Capture { expr, .. } => left_calls(expr, nullable, index, out),
    }
}

/// Depth-first search for cycles. Each cycle is returned as the rule path with its first rule
/// repeated at the end, plus the span of the reference that closes it.
fn find_cycles(graph: &[Vec<(RuleId, Span)>]) -> Vec<(Vec<RuleId>, Span)> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        node: usize,
        graph: &[Vec<(RuleId, Span)>],
        marks: &mut [Mark],
        path: &mut Vec<RuleId>,
        cycles: &mut Vec<(Vec<RuleId>, Span)>,
    ) {
        marks[node] = Mark::Active;
        path.push(RuleId(node));
        for &(next, span) in &graph[node] {
            match marks[next.0] {
                Mark::New => visit(next.0, graph, marks, path, cycles),
                Mark::Active => {
                    let start = path.iter().position(|id| *id == next).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    cycles.push((cycle, span));
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks[node] = Mark::Done;
    }

    let mut marks = vec![Mark::New; graph.len()];
    let mut cycles = Vec::new();
    for node in 0..graph.len() {
        if marks[node] == Mark::New {
            visit(node, graph, &mut marks, &mut Vec::new(), &mut cycles);
        }
    }
    cycles
}

/// Rules whose productions the generator instantiates starting from `entry`: the entry itself
/// and every rule reachable through node captures.
fn generated_rules(grammar: &Grammar, entry: RuleId, source: Side) -> Vec<RuleId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![entry];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        for expr in grammar.rules[id.0].side_exprs(source) {
            for capture in collect_captures(expr) {
                if let Some(next) = capture
                    .node_rule
                    .as_deref()
                    .and_then(|name| grammar.index.get(name))
                {
                    stack.push(*next);
                }
            }
        }
    }
    order
}

fn visit_repeats<'e>(expr: &'e Expr, visit: &mut impl FnMut(&'e Expr)) {
    match expr {
        Expr::Repeat { expr, max: None, .. } => {
            visit(expr);
            visit_repeats(expr, visit);
        }
        Expr::Repeat { expr, .. } | Expr::Capture { expr, .. } => visit_repeats(expr, visit),
        Expr::Seq(items) | Expr::Choice(items) => {
            for item in items {
                visit_repeats(item, visit);
            }
        }
        Expr::Literal(_) | Expr::Class(_) | Expr::Any | Expr::Ref { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::analyze;

    fn kinds(src: &str) -> Vec<GrammarErrorKind> {
        analyze("test", src)
            .report
            .errors
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn reports_every_duplicate_and_unknown() {
        let found = kinds(r#"%entry a; a = b ; a = "x" ; c = d ;"#);
        assert!(found.contains(&GrammarErrorKind::DuplicateRule { rule: "a".into() }));
        assert!(found.contains(&GrammarErrorKind::UnknownRule {
            rule: "b".into(),
            referenced_by: "a".into()
        }));
        assert!(found.contains(&GrammarErrorKind::UnknownRule {
            rule: "d".into(),
            referenced_by: "c".into()
        }));
    }

    #[test]
    fn left_recursion_through_nullable_prefix() {
        let found = kinds(r#"%entry e; e = ws t ; t = e "+" | "1" ; ws = " "* ;"#);
        assert_eq!(
            found,
            vec![GrammarErrorKind::InfiniteRecursion {
                cycle: vec!["e".into(), "t".into(), "e".into()]
            }]
        );
    }

    #[test]
    fn right_recursion_is_fine() {
        assert!(kinds(r#"%entry l; l = "x" l | "" ;"#).is_empty());
    }

    #[test]
    fn capture_under_repetition_is_rejected() {
        let found = kinds(r#"%entry r; r : (x=[a-z])* <=> x=[a-z] ;"#);
        assert!(matches!(
            &found[0],
            GrammarErrorKind::CaptureMismatch { label, reason, .. }
                if label == "x" && reason.contains("repetition")
        ));
    }

    #[test]
    fn one_sided_label_is_rejected() {
        let found = kinds(r#"%entry r; r : x=[a-z] y=[0-9] <=> x=[a-z] ;"#);
        assert_eq!(found.len(), 1);
        assert!(matches!(
            &found[0],
            GrammarErrorKind::CaptureMismatch { label, .. } if label == "y"
        ));
    }

    #[test]
    fn node_and_text_capture_disagree() {
        let found = kinds(r#"%entry r; r : x=w <=> x=[a-z]+ ; w = [a-z]+ ;"#);
        assert!(matches!(
            &found[0],
            GrammarErrorKind::CaptureMismatch { reason, .. } if reason.contains("plain text")
        ));
    }

    #[test]
    fn bidirectional_requires_both_entries() {
        let found = kinds(r#"%bidirectional; %entry a r; r : "x" <=> "y" ;"#);
        assert_eq!(
            found,
            vec![GrammarErrorKind::MissingEntryPoint {
                direction: Direction::BToA
            }]
        );
    }

    #[test]
    fn bidirectional_requires_templates() {
        let found = kinds(
            r#"%bidirectional; %entry r;
               r : "x" <=> "y" : "z" <=> ~ ;"#,
        );
        assert!(matches!(
            &found[..],
            [GrammarErrorKind::MissingTemplate { rule, production: 2, side, .. }]
                if rule == "r" && side == "b"
        ));
    }

    #[test]
    fn ambiguous_entries() {
        let found = kinds(r#"%entry a; %entry a b; a = "x" ; b = "y" ;"#);
        assert!(matches!(
            &found[..],
            [GrammarErrorKind::AmbiguousEntryPoint { direction: Direction::AToB, .. }]
        ));
    }

    #[test]
    fn warnings_for_unreachable_and_nullable_loops() {
        let analysis = analyze("test", r#"%entry a; a = (" "?)* ; lonely = "z" ;"#);
        assert!(analysis.report.is_valid());
        assert_eq!(analysis.report.warnings.len(), 2);
        assert!(analysis.report.warnings[0].contains("empty input"));
        assert!(analysis.report.warnings[1].contains("lonely"));
    }
}
