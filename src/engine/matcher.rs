//! Backtracking matcher.
//!
//! Runs the compiled program of one grammar side over an input. All machine state (backtrack
//! stack, call stack, event log) lives in a [`Machine`] created per call, so a grammar can be
//! matched from many threads at once.

use std::sync::Arc;

use super::tree::{build_tree, Event, ParseNode};
use super::ParseOptions;
use crate::errors::{SourceContext, TransformError, TransformErrorKind};
use crate::grammar::compile::{Inst, Program, HALT_PC};
use crate::grammar::{Direction, Grammar, RuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    /// Ordered-choice point. `Commit` discards up to and including the newest one.
    Alternative,
    /// Repetition exit point.
    Retry,
}

#[derive(Debug, Clone, Copy)]
struct Backtrack {
    kind: EntryKind,
    pc: usize,
    pos: usize,
    calls: usize,
    log: usize,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    ret: usize,
    /// Backtrack stack height at the call; entries above it are dropped on return.
    height: usize,
}

/// Deepest position a terminal test failed at, and what was expected there.
#[derive(Debug, Default)]
struct Farthest {
    pos: usize,
    expected: Vec<String>,
}

impl Farthest {
    fn record(&mut self, pos: usize, program: &Program, pc: usize) {
        // only terminal tests count; `Fail` just unwinds a branch
        let Some(description) = program.describe(pc) else {
            return;
        };
        if pos < self.pos {
            return;
        }
        if pos > self.pos {
            self.pos = pos;
            self.expected.clear();
        }
        if !self.expected.contains(&description) {
            self.expected.push(description);
        }
    }
}

enum Outcome {
    Matched(usize),
    Failed,
    TooDeep(usize),
}

struct Machine<'a> {
    program: &'a Program,
    text: &'a str,
    limit: usize,
    backtrack: Vec<Backtrack>,
    calls: Vec<Frame>,
    log: Vec<Event>,
    farthest: Farthest,
}

impl<'a> Machine<'a> {
    fn new(program: &'a Program, text: &'a str, limit: usize) -> Self {
        Self {
            program,
            text,
            limit,
            backtrack: Vec::new(),
            calls: Vec::new(),
            log: Vec::new(),
            farthest: Farthest::default(),
        }
    }

    fn push(&mut self, kind: EntryKind, pc: usize, pos: usize) {
        self.backtrack.push(Backtrack {
            kind,
            pc,
            pos,
            calls: self.calls.len(),
            log: self.log.len(),
        });
    }

    /// Resumes at the newest backtrack entry, or reports that none is left.
    fn fail(&mut self) -> Option<(usize, usize)> {
        let entry = self.backtrack.pop()?;
        self.calls.truncate(entry.calls);
        self.log.truncate(entry.log);
        Some((entry.pc, entry.pos))
    }

    fn run(&mut self, entry: RuleId) -> Outcome {
        let program = self.program;
        let Some(&start) = program.starts.get(entry.0) else {
            return Outcome::Failed;
        };
        self.calls.push(Frame {
            ret: HALT_PC,
            height: 0,
        });
        self.log.push(Event::Enter { rule: entry, pos: 0 });

        let mut pc = start;
        let mut pos = 0;

        loop {
            let mut matched = true;
            match &program.code[pc] {
                Inst::Halt => return Outcome::Matched(pos),
                Inst::Literal(literal) => {
                    if self.text[pos..].starts_with(&**literal) {
                        pos += literal.len();
                        pc += 1;
                    } else {
                        matched = false;
                    }
                }
                Inst::Class(index) => match self.text[pos..].chars().next() {
                    Some(c) if program.classes[*index].matches(c) => {
                        pos += c.len_utf8();
                        pc += 1;
                    }
                    _ => matched = false,
                },
                Inst::Any => match self.text[pos..].chars().next() {
                    Some(c) => {
                        pos += c.len_utf8();
                        pc += 1;
                    }
                    None => matched = false,
                },
                Inst::Choice(alt) => {
                    self.push(EntryKind::Alternative, *alt, pos);
                    pc += 1;
                }
                Inst::Commit(target) => {
                    while let Some(entry) = self.backtrack.pop() {
                        if entry.kind == EntryKind::Alternative {
                            break;
                        }
                    }
                    pc = *target;
                }
                Inst::Fork(exit) => {
                    self.push(EntryKind::Retry, *exit, pos);
                    pc += 1;
                }
                Inst::LoopBack { head, exit } => match self.backtrack.last() {
                    Some(top) if top.kind == EntryKind::Retry && top.pos == pos => {
                        self.backtrack.pop();
                        pc = *exit;
                    }
                    _ => pc = *head,
                },
                Inst::Fail => matched = false,
                Inst::Call(rule) => {
                    if self.calls.len() >= self.limit {
                        return Outcome::TooDeep(pos);
                    }
                    self.calls.push(Frame {
                        ret: pc + 1,
                        height: self.backtrack.len(),
                    });
                    self.log.push(Event::Enter { rule: *rule, pos });
                    pc = program.starts[rule.0];
                }
                Inst::Return => {
                    let Some(frame) = self.calls.pop() else {
                        return Outcome::Failed;
                    };
                    self.backtrack.truncate(frame.height);
                    self.log.push(Event::Exit { pos });
                    pc = frame.ret;
                }
                Inst::Production(index) => {
                    self.log.push(Event::Production(*index));
                    pc += 1;
                }
                Inst::CaptureOpen { label, nodes } => {
                    self.log.push(Event::Open {
                        label: *label,
                        nodes: *nodes,
                        pos,
                    });
                    pc += 1;
                }
                Inst::CaptureClose => {
                    self.log.push(Event::Close { pos });
                    pc += 1;
                }
            }

            if !matched {
                self.farthest.record(pos, program, pc);
                match self.fail() {
                    Some((resume_pc, resume_pos)) => {
                        pc = resume_pc;
                        pos = resume_pos;
                    }
                    None => return Outcome::Failed,
                }
            }
        }
    }
}

/// Matches `text` against the `entry` rule on the source side of `direction`.
pub fn parse(
    grammar: &Grammar,
    entry: RuleId,
    direction: Direction,
    text: &str,
) -> Result<ParseNode, TransformError> {
    parse_with(grammar, entry, direction, text, &ParseOptions::default())
}

pub fn parse_with(
    grammar: &Grammar,
    entry: RuleId,
    direction: Direction,
    text: &str,
    options: &ParseOptions,
) -> Result<ParseNode, TransformError> {
    let program = grammar.program(direction.source());
    let input = || SourceContext::from_file("input", text);

    let limit = options.max_call_depth.max(1);
    let mut machine = Machine::new(program, text, limit);
    let stop = match machine.run(entry) {
        Outcome::Matched(stop) => stop,
        Outcome::TooDeep(pos) => {
            return Err(TransformError::at(
                TransformErrorKind::DepthLimit { limit },
                &input(),
                pos,
            ));
        }
        Outcome::Failed => {
            let Farthest { pos, expected } = std::mem::take(&mut machine.farthest);
            return Err(TransformError::at(
                TransformErrorKind::NoRuleMatches { expected },
                &input(),
                pos,
            ));
        }
    };
    if stop < text.len() {
        return Err(TransformError::at(TransformErrorKind::TrailingInput, &input(), stop));
    }

    let names: Vec<Arc<str>> = grammar.rules().iter().map(|r| Arc::from(r.name.as_str())).collect();
    let shared: Vec<bool> = grammar.rules().iter().map(|r| r.is_shared()).collect();
    build_tree(&machine.log, text, &names, &program.labels, &shared).ok_or_else(|| {
        TransformError::at(
            TransformErrorKind::NoRuleMatches {
                expected: Vec::new(),
            },
            &input(),
            0,
        )
    })
}
