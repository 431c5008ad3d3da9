//! Compiles rule sides into matcher programs and templates.
//!
//! Each side of the grammar becomes one flat instruction list for the backtracking machine in
//! [`crate::engine::matcher`]. Control flow is expressed with choice points:
//!
//! - `Choice`/`Commit` give PEG ordered choice. `Commit` drops the branch's own choice point and
//!   every backtrack entry left inside the branch, so a matched alternative is never revisited.
//! - `Fork` records a resumable "stop repeating here" point for greedy repetition, so the machine
//!   can give back iterations when the rest of the sequence fails.
//! - `Call`/`Return` make every rule reference atomic.

use std::collections::{HashMap, HashSet};

use super::model::{CharClass, Expr, Rule, RuleBody, RuleId, Side};

/// Program counter of the `Halt` instruction every program starts with.
pub const HALT_PC: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// Match a non-empty literal.
    Literal(Box<str>),
    /// Match one char against `Program::classes[index]`.
    Class(usize),
    /// Match any one char.
    Any,
    /// Push an ordered-choice point resuming at `alt`.
    Choice(usize),
    /// Drop everything back to and including the newest choice point, jump to the target.
    Commit(usize),
    /// Push a repetition exit point resuming at the target.
    Fork(usize),
    /// End of an unbounded repetition iteration. Loops to `head` unless the iteration was empty.
    LoopBack { head: usize, exit: usize },
    Fail,
    Call(RuleId),
    Return,
    /// Record which production of the current rule is being tried.
    Production(usize),
    /// Open a capture; `nodes` captures child rule nodes instead of text.
    CaptureOpen { label: usize, nodes: bool },
    CaptureClose,
    Halt,
}

/// Compiled matcher for one side of a grammar.
#[derive(Debug, Clone)]
pub struct Program {
    pub code: Vec<Inst>,
    /// Entry pc of each rule, indexed by `RuleId`.
    pub starts: Vec<usize>,
    pub classes: Vec<CharClass>,
    pub labels: Vec<String>,
}

impl Program {
    /// Human-readable terminal at `pc`, for "expected ..." diagnostics.
    pub fn describe(&self, pc: usize) -> Option<String> {
        match self.code.get(pc)? {
            Inst::Literal(text) => Some(format!("{:?}", text)),
            Inst::Class(index) => self.classes.get(*index).map(|c| c.text.clone()),
            Inst::Any => Some("any character".to_string()),
            _ => None,
        }
    }
}

/// Compiles the patterns of `side` for every rule.
pub fn compile_program(rules: &[Rule], index: &HashMap<String, RuleId>, side: Side) -> Program {
    let mut compiler = Compiler {
        index,
        code: vec![Inst::Halt],
        classes: Vec::new(),
        labels: Vec::new(),
        label_ids: HashMap::new(),
    };

    let mut starts = Vec::with_capacity(rules.len());
    for rule in rules {
        starts.push(compiler.here());
        compiler.rule(rule, side);
    }

    Program {
        code: compiler.code,
        starts,
        classes: compiler.classes,
        labels: compiler.labels,
    }
}

struct Compiler<'g> {
    index: &'g HashMap<String, RuleId>,
    code: Vec<Inst>,
    classes: Vec<CharClass>,
    labels: Vec<String>,
    label_ids: HashMap<String, usize>,
}

impl<'g> Compiler<'g> {
    fn here(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, inst: Inst) -> usize {
        self.code.push(inst);
        self.code.len() - 1
    }

    fn patch(&mut self, at: usize, target: usize) {
        match &mut self.code[at] {
            Inst::Choice(t) | Inst::Commit(t) | Inst::Fork(t) => *t = target,
            Inst::LoopBack { exit, .. } => *exit = target,
            _ => {}
        }
    }

    fn rule(&mut self, rule: &Rule, side: Side) {
        match &rule.body {
            RuleBody::Shared(expr) => self.expr(expr),
            RuleBody::Productions(productions) => {
                let present: Vec<(usize, &Expr)> = productions
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| p.side(side).map(|expr| (i, expr)))
                    .collect();
                self.ordered_choice(present.len(), |c, k| {
                    let (production, expr) = present[k];
                    c.emit(Inst::Production(production));
                    c.expr(expr);
                });
            }
        }
        self.emit(Inst::Return);
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(text) => {
                if !text.is_empty() {
                    self.emit(Inst::Literal(text.as_str().into()));
                }
            }
            Expr::Class(class) => {
                self.classes.push(class.clone());
                let index = self.classes.len() - 1;
                self.emit(Inst::Class(index));
            }
            Expr::Any => {
                self.emit(Inst::Any);
            }
            Expr::Ref { name, .. } => {
                match self.index.get(name) {
                    Some(id) => self.emit(Inst::Call(*id)),
                    // rejected by validation before compiling
                    None => self.emit(Inst::Fail),
                };
            }
            Expr::Seq(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expr::Choice(alternatives) => {
                self.ordered_choice(alternatives.len(), |c, k| c.expr(&alternatives[k]));
            }
            Expr::Repeat { expr, min, max } => self.repeat(expr, *min, *max),
            Expr::Capture { label, expr, .. } => {
                let label = self.label(label);
                let nodes = expr.node_capture_rule().is_some();
                self.emit(Inst::CaptureOpen { label, nodes });
                self.expr(expr);
                self.emit(Inst::CaptureClose);
            }
        }
    }

    /// Branches tried in order; the first to succeed is committed.
    fn ordered_choice(&mut self, count: usize, mut branch: impl FnMut(&mut Self, usize)) {
        let mut commits = Vec::with_capacity(count);
        for k in 0..count {
            let choice = self.emit(Inst::Choice(0));
            branch(self, k);
            commits.push(self.emit(Inst::Commit(0)));
            let next = self.here();
            self.patch(choice, next);
        }
        self.emit(Inst::Fail);
        let end = self.here();
        for commit in commits {
            self.patch(commit, end);
        }
    }

    /// `body` matched as a unit: once it succeeds, its internal choice points are discarded.
    fn atomic(&mut self, body: &Expr) {
        self.ordered_choice(1, |c, _| c.expr(body));
    }

    fn repeat(&mut self, body: &Expr, min: u32, max: Option<u32>) {
        for _ in 0..min {
            self.atomic(body);
        }
        match max {
            None => {
                let head = self.here();
                let fork = self.emit(Inst::Fork(0));
                self.atomic(body);
                let back = self.emit(Inst::LoopBack { head, exit: 0 });
                let exit = self.here();
                self.patch(fork, exit);
                self.patch(back, exit);
            }
            Some(max) => {
                let forks: Vec<usize> = (min..max)
                    .map(|_| {
                        let fork = self.emit(Inst::Fork(0));
                        self.atomic(body);
                        fork
                    })
                    .collect();
                let exit = self.here();
                for fork in forks {
                    self.patch(fork, exit);
                }
            }
        }
    }

    fn label(&mut self, label: &str) -> usize {
        if let Some(id) = self.label_ids.get(label) {
            return *id;
        }
        self.labels.push(label.to_string());
        let id = self.labels.len() - 1;
        self.label_ids.insert(label.to_string(), id);
        id
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Text(String),
    Slot(String),
}

/// Output recipe for one production side: literal text interleaved with capture slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

impl Template {
    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(TemplatePart::Text(last)) = self.parts.last_mut() {
            last.push_str(&text);
            return;
        }
        self.parts.push(TemplatePart::Text(text));
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::Slot(label) => Some(label.as_str()),
            TemplatePart::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateState {
    /// The production was written with `~` on this side.
    Absent,
    /// The side exists but some uncaptured part has no canonical text.
    Unrenderable(String),
    Ready(Template),
}

/// Templates of every production on both sides, indexed `[rule][production][side]`.
pub fn compile_templates(
    rules: &[Rule],
    index: &HashMap<String, RuleId>,
) -> Vec<Vec<[TemplateState; 2]>> {
    let mut renderers = [
        CanonicalRenderer::new(rules, index, Side::A),
        CanonicalRenderer::new(rules, index, Side::B),
    ];

    rules
        .iter()
        .map(|rule| {
            rule.productions()
                .iter()
                .map(|production| {
                    Side::BOTH.map(|side| match production.side(side) {
                        None => TemplateState::Absent,
                        Some(expr) => match renderers[side.index()].template(expr) {
                            Ok(template) => TemplateState::Ready(template),
                            Err(reason) => TemplateState::Unrenderable(reason),
                        },
                    })
                })
                .collect()
        })
        .collect()
}

/// Renders uncaptured pattern parts in their canonical spelling.
struct CanonicalRenderer<'g> {
    rules: &'g [Rule],
    index: &'g HashMap<String, RuleId>,
    side: Side,
    memo: HashMap<RuleId, Result<String, String>>,
    active: HashSet<RuleId>,
}

impl<'g> CanonicalRenderer<'g> {
    fn new(rules: &'g [Rule], index: &'g HashMap<String, RuleId>, side: Side) -> Self {
        Self {
            rules,
            index,
            side,
            memo: HashMap::new(),
            active: HashSet::new(),
        }
    }

    fn template(&mut self, expr: &Expr) -> Result<Template, String> {
        let mut template = Template::default();
        self.collect(expr, &mut template)?;
        Ok(template)
    }

    fn collect(&mut self, expr: &Expr, template: &mut Template) -> Result<(), String> {
        match expr {
            Expr::Capture { label, .. } => {
                template.parts.push(TemplatePart::Slot(label.clone()));
                Ok(())
            }
            Expr::Seq(items) => items.iter().try_for_each(|item| self.collect(item, template)),
            other => {
                let text = self.render(other)?;
                template.push_text(text);
                Ok(())
            }
        }
    }

    fn render(&mut self, expr: &Expr) -> Result<String, String> {
        match expr {
            Expr::Literal(text) => Ok(text.clone()),
            Expr::Class(class) => class
                .canonical_char()
                .map(String::from)
                .ok_or_else(|| format!("{} has no canonical character", class.text)),
            Expr::Any => Err("'.' cannot be rendered without a capture".to_string()),
            Expr::Ref { name, .. } => self.render_rule(name),
            Expr::Seq(items) => items.iter().map(|item| self.render(item)).collect(),
            Expr::Choice(alternatives) => match alternatives.first() {
                Some(first) => self.render(first),
                None => Ok(String::new()),
            },
            Expr::Repeat { expr, min, .. } => {
                if *min == 0 {
                    return Ok(String::new());
                }
                Ok(self.render(expr)?.repeat(*min as usize))
            }
            Expr::Capture { label, .. } => Err(format!(
                "capture '{}' sits under an operator and cannot be placed",
                label
            )),
        }
    }

    fn render_rule(&mut self, name: &str) -> Result<String, String> {
        let Some(&id) = self.index.get(name) else {
            return Err(format!("unknown rule '{}'", name));
        };
        if let Some(done) = self.memo.get(&id) {
            return done.clone();
        }
        if !self.active.insert(id) {
            return Err(format!("rule '{}' has no finite canonical form", name));
        }

        let rules = self.rules;
        let result = match rules.get(id.0).map(|rule| &rule.body) {
            Some(RuleBody::Shared(expr)) => self.render(expr),
            Some(RuleBody::Productions(productions)) => {
                match productions.iter().find_map(|p| p.side(self.side)) {
                    Some(expr) if expr.has_captures() => Err(format!(
                        "rule '{}' is referenced without a label but needs captured input",
                        name
                    )),
                    Some(expr) => self.render(expr),
                    None => Err(format!("rule '{}' has no production on this side", name)),
                }
            }
            None => Err(format!("unknown rule '{}'", name)),
        };

        self.active.remove(&id);
        self.memo.insert(id, result.clone());
        result
    }
}
