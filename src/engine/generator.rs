//! Target-side text generation from a parse tree.

use super::tree::{CaptureValue, ParseNode};
use crate::errors::{TransformError, TransformErrorKind};
use crate::grammar::{Direction, Grammar, TemplatePart, TemplateState};

enum Task<'a> {
    Emit(&'a str),
    Node(&'a ParseNode),
}

/// Renders `tree` with the target-side templates of `direction`.
pub fn generate(
    grammar: &Grammar,
    direction: Direction,
    tree: &ParseNode,
) -> Result<String, TransformError> {
    let target = direction.target();
    let mut out = String::with_capacity(tree.span.end - tree.span.start);
    let mut tasks = vec![Task::Node(tree)];

    while let Some(task) = tasks.pop() {
        let node = match task {
            Task::Emit(text) => {
                out.push_str(text);
                continue;
            }
            Task::Node(node) => node,
        };

        let Some(production) = node.production else {
            out.push_str(node.text.as_deref().unwrap_or_default());
            continue;
        };

        let Some(TemplateState::Ready(template)) = grammar.template(node.rule, production, target)
        else {
            return Err(missing_template(node, production));
        };

        // pushed in reverse so parts come off the stack in template order
        for part in template.parts.iter().rev() {
            match part {
                TemplatePart::Text(text) => tasks.push(Task::Emit(text)),
                TemplatePart::Slot(label) => {
                    let capture = node
                        .capture(label)
                        .ok_or_else(|| missing_template(node, production))?;
                    match &capture.value {
                        CaptureValue::Text(text) => tasks.push(Task::Emit(text)),
                        CaptureValue::Nodes(children) => {
                            tasks.extend(children.iter().rev().map(Task::Node));
                        }
                    }
                }
            }
        }
    }

    Ok(out)
}

fn missing_template(node: &ParseNode, production: usize) -> TransformError {
    TransformError::located(
        TransformErrorKind::MissingTemplate {
            rule: node.name.to_string(),
            production: Some(production + 1),
        },
        node.location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse;

    fn run(src: &str, direction: Direction, text: &str) -> Result<String, TransformError> {
        let grammar = Grammar::load(src).unwrap();
        let entry = grammar.entry_for(direction).unwrap();
        let tree = parse(&grammar, entry, direction, text)?;
        generate(&grammar, direction, &tree)
    }

    const NAMES: &str = r#"
        %entry list;
        list : xs=person* <=> "<list>" xs=person* "</list>" ;
        person : f=name " " l=name ";" <=> "<p last='" l=name "'>" f=name "</p>" ;
        name = [A-Z][a-z]* ;
    "#;

    #[test]
    fn slots_follow_target_order() {
        let out = run(NAMES, Direction::AToB, "Ada Lovelace;Alan Turing;").unwrap();
        assert_eq!(
            out,
            "<list><p last='Lovelace'>Ada</p><p last='Turing'>Alan</p></list>"
        );
        let back = run(NAMES, Direction::BToA, &out).unwrap();
        assert_eq!(back, "Ada Lovelace;Alan Turing;");
    }

    #[test]
    fn empty_node_capture_renders_nothing() {
        assert_eq!(run(NAMES, Direction::AToB, "").unwrap(), "<list></list>");
    }

    #[test]
    fn one_sided_production_has_no_template() {
        let src = r#"%entry r; r : "[" w=[a-z]+ "]" <=> "<w>" w=[a-z]+ "</w>" : "{" w=[a-z]+ "}" <=> ~ ;"#;
        assert_eq!(run(src, Direction::AToB, "[ab]").unwrap(), "<w>ab</w>");
        let err = run(src, Direction::AToB, "{ab}").unwrap_err();
        assert_eq!(
            err.kind,
            TransformErrorKind::MissingTemplate {
                rule: "r".into(),
                production: Some(2)
            }
        );
        assert_eq!(err.location.offset, 0);
    }

    #[test]
    fn uncaptured_parts_render_canonically() {
        let src = r#"%entry r; r : w=word ws+ "." <=> "<s>" w=word "</s>" ; ws = [ \t] ; word = [a-z]+ ;"#;
        assert_eq!(run(src, Direction::AToB, "hi \t.").unwrap(), "<s>hi</s>");
        assert_eq!(run(src, Direction::BToA, "<s>hi</s>").unwrap(), "hi .");
    }
}
