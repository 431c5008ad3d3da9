//! Parse trees built from the matcher's event log.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::Location;
use crate::grammar::{RuleId, Span};

/// One matched rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseNode {
    pub rule: RuleId,
    pub name: Arc<str>,
    /// Index of the matched production, `None` for shared rules.
    pub production: Option<usize>,
    pub span: Span,
    pub location: Location,
    /// Matched text of a shared rule, emitted verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<Capture>,
}

impl ParseNode {
    pub fn capture(&self, label: &str) -> Option<&Capture> {
        self.captures.iter().find(|c| c.label == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capture {
    pub label: String,
    pub span: Span,
    pub value: CaptureValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureValue {
    Text(String),
    Nodes(Vec<ParseNode>),
}

/// What the matcher records while it runs. Backtracking truncates the log, so after a
/// successful match it describes exactly the winning path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Enter { rule: RuleId, pos: usize },
    Production(usize),
    Open { label: usize, nodes: bool, pos: usize },
    Close { pos: usize },
    Exit { pos: usize },
}

/// Byte offsets of line starts, for turning offsets into line/column.
pub(crate) struct LineIndex<'t> {
    text: &'t str,
    starts: Vec<usize>,
}

impl<'t> LineIndex<'t> {
    pub fn new(text: &'t str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    pub fn locate(&self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        let line = self.starts.partition_point(|start| *start <= offset);
        let line_start = self.starts[line - 1];
        let column = self
            .text
            .get(line_start..offset)
            .map_or(0, |prefix| prefix.chars().count())
            + 1;
        Location {
            offset,
            line,
            column,
        }
    }
}

struct OpenCapture {
    label: usize,
    nodes: bool,
    start: usize,
    children: Vec<ParseNode>,
}

struct PartialNode {
    rule: RuleId,
    production: Option<usize>,
    start: usize,
    captures: Vec<Capture>,
    open: Option<OpenCapture>,
}

/// Folds the event log of a successful match into the tree rooted at the entry rule.
pub(crate) fn build_tree(
    events: &[Event],
    text: &str,
    names: &[Arc<str>],
    labels: &[String],
    shared: &[bool],
) -> Option<ParseNode> {
    let lines = LineIndex::new(text);
    let mut stack: Vec<PartialNode> = Vec::new();
    let mut root = None;

    for event in events {
        match *event {
            Event::Enter { rule, pos } => stack.push(PartialNode {
                rule,
                production: None,
                start: pos,
                captures: Vec::new(),
                open: None,
            }),
            Event::Production(index) => {
                if let Some(node) = stack.last_mut() {
                    node.production = Some(index);
                }
            }
            Event::Open { label, nodes, pos } => {
                if let Some(node) = stack.last_mut() {
                    node.open = Some(OpenCapture {
                        label,
                        nodes,
                        start: pos,
                        children: Vec::new(),
                    });
                }
            }
            Event::Close { pos } => {
                let Some(node) = stack.last_mut() else {
                    continue;
                };
                let Some(open) = node.open.take() else {
                    continue;
                };
                let value = if open.nodes {
                    CaptureValue::Nodes(open.children)
                } else {
                    CaptureValue::Text(text.get(open.start..pos).unwrap_or_default().to_string())
                };
                node.captures.push(Capture {
                    label: labels.get(open.label).cloned().unwrap_or_default(),
                    span: Span::new(open.start, pos),
                    value,
                });
            }
            Event::Exit { pos } => {
                let Some(partial) = stack.pop() else {
                    continue;
                };
                let is_shared = shared.get(partial.rule.0).copied().unwrap_or(false);
                let node = ParseNode {
                    rule: partial.rule,
                    name: names
                        .get(partial.rule.0)
                        .cloned()
                        .unwrap_or_else(|| Arc::from("")),
                    production: partial.production,
                    span: Span::new(partial.start, pos),
                    location: lines.locate(partial.start),
                    text: is_shared
                        .then(|| text.get(partial.start..pos).unwrap_or_default().to_string()),
                    captures: partial.captures,
                };
                match stack.last_mut() {
                    Some(parent) => {
                        // uncaptured children are rendered canonically and dropped here
                        if let Some(open) = parent.open.as_mut().filter(|open| open.nodes) {
                            open.children.push(node);
                        }
                    }
                    None => root = Some(node),
                }
            }
        }
    }

    root
}
