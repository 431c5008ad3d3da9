//! In-memory rule graph of a transcoding grammar.
//!
//! A rule holds both notations at once: a production pairs an A-side expression with a B-side
//! expression, and the same labels on both sides tie captures to template slots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Index of a rule inside its grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub usize);

/// Byte range in the grammar source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

// ============================================================================
// SIDES AND DIRECTIONS
// ============================================================================

/// One of the two notations a grammar relates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    pub const fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    pub const fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Which side is parsed and which side is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::AToB, Direction::BToA];

    /// Direction whose input is written in `side`.
    pub const fn from_source(side: Side) -> Self {
        match side {
            Side::A => Direction::AToB,
            Side::B => Direction::BToA,
        }
    }

    /// The side matched against the input.
    pub const fn source(self) -> Side {
        match self {
            Direction::AToB => Side::A,
            Direction::BToA => Side::B,
        }
    }

    /// The side whose templates produce the output.
    pub const fn target(self) -> Side {
        self.source().other()
    }

    pub const fn reversed(self) -> Direction {
        Direction::from_source(self.target())
    }

    pub const fn index(self) -> usize {
        self.source().index()
    }

    /// Resolves a direction token. Accepts the canonical tokens (`a2b`, `a_to_b`, `a-to-b`,
    /// `forward`, and their mirrors) and side-name pairs such as `leiden2xml` or
    /// `xml-to-leiden`. Matching is case-insensitive. Side-name pairs win over the canonical
    /// tokens, so `%sides b a;` makes `a2b` mean B to A.
    pub fn resolve(token: &str, sides: &[String; 2]) -> Option<Direction> {
        let token = token.trim().to_ascii_lowercase();
        let a = sides[0].to_ascii_lowercase();
        let b = sides[1].to_ascii_lowercase();
        for separator in ["2", "_to_", "-to-"] {
            if token == format!("{a}{separator}{b}") {
                return Some(Direction::AToB);
            }
            if token == format!("{b}{separator}{a}") {
                return Some(Direction::BToA);
            }
        }
        token.parse().ok()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => write!(f, "A_TO_B"),
            Direction::BToA => write!(f, "B_TO_A"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a2b" | "a_to_b" | "a-to-b" | "atob" | "forward" => Ok(Direction::AToB),
            "b2a" | "b_to_a" | "b-to-a" | "btoa" | "backward" | "reverse" => Ok(Direction::BToA),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
}

/// A character class such as `[a-z_]` or `[^<>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    pub negated: bool,
    pub items: Vec<ClassItem>,
    /// Source spelling, used in diagnostics.
    pub text: String,
}

impl CharClass {
    pub fn matches(&self, c: char) -> bool {
        let hit = self.items.iter().any(|item| match *item {
            ClassItem::Char(x) => x == c,
            ClassItem::Range(lo, hi) => lo <= c && c <= hi,
        });
        hit != self.negated
    }

    /// The character a template renders for this class when nothing was captured.
    pub fn canonical_char(&self) -> Option<char> {
        if self.negated {
            return None;
        }
        self.items.first().map(|item| match *item {
            ClassItem::Char(c) | ClassItem::Range(c, _) => c,
        })
    }
}

/// Combinator tree for one side of a production, or the body of a shared rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(String),
    Class(CharClass),
    Any,
    Ref { name: String, span: Span },
    Seq(Vec<Expr>),
    Choice(Vec<Expr>),
    Repeat {
        expr: Box<Expr>,
        min: u32,
        max: Option<u32>,
    },
    Capture {
        label: String,
        expr: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    /// Rule captured as child nodes when this expression sits under a label:
    /// `x=item`, `xs=item*`, `t=title?`. Anything else is captured as text.
    pub fn node_capture_rule(&self) -> Option<&str> {
        match self {
            Expr::Ref { name, .. } => Some(name),
            Expr::Repeat { expr, .. } => match expr.as_ref() {
                Expr::Ref { name, .. } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Calls `visit` for every rule reference in this expression, in source order.
    pub fn for_each_ref<'e>(&'e self, visit: &mut impl FnMut(&'e str, Span)) {
        match self {
            Expr::Ref { name, span } => visit(name, *span),
            Expr::Seq(items) | Expr::Choice(items) => {
                for item in items {
                    item.for_each_ref(visit);
                }
            }
            Expr::Repeat { expr, .. } | Expr::Capture { expr, .. } => expr.for_each_ref(visit),
            Expr::Literal(_) | Expr::Class(_) | Expr::Any => {}
        }
    }

    pub fn has_captures(&self) -> bool {
        match self {
            Expr::Capture { .. } => true,
            Expr::Seq(items) | Expr::Choice(items) => items.iter().any(Expr::has_captures),
            Expr::Repeat { expr, .. } => expr.has_captures(),
            Expr::Literal(_) | Expr::Class(_) | Expr::Any | Expr::Ref { .. } => false,
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// One alternative of a production rule: the same construct written in both notations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub sides: [Option<Expr>; 2],
    pub span: Span,
}

impl Production {
    pub fn side(&self, side: Side) -> Option<&Expr> {
        self.sides[side.index()].as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleBody {
    /// `name = expr ;` the same pattern in both notations, copied verbatim.
    Shared(Expr),
    /// `name : a <=> b : ... ;` ordered alternatives with per-side templates.
    Productions(Vec<Production>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub span: Span,
    pub body: RuleBody,
}

impl Rule {
    pub fn is_shared(&self) -> bool {
        matches!(self.body, RuleBody::Shared(_))
    }

    pub fn productions(&self) -> &[Production] {
        match &self.body {
            RuleBody::Productions(productions) => productions,
            RuleBody::Shared(_) => &[],
        }
    }

    /// Every expression matched when parsing `side`.
    pub fn side_exprs(&self, side: Side) -> Vec<&Expr> {
        match &self.body {
            RuleBody::Shared(expr) => vec![expr],
            RuleBody::Productions(productions) => {
                productions.iter().filter_map(|p| p.side(side)).collect()
            }
        }
    }
}

/// An `%entry` declaration as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDecl {
    /// Side name given in the declaration, `None` for both directions.
    pub side: Option<String>,
    pub rule: String,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sides() -> [String; 2] {
        ["leiden".to_string(), "xml".to_string()]
    }

    #[test]
    fn direction_tokens_resolve() {
        assert_eq!(Direction::resolve("a2b", &sides()), Some(Direction::AToB));
        assert_eq!(Direction::resolve("B_TO_A", &sides()), Some(Direction::BToA));
        assert_eq!(Direction::resolve("Leiden2XML", &sides()), Some(Direction::AToB));
        assert_eq!(Direction::resolve("xml-to-leiden", &sides()), Some(Direction::BToA));
        assert_eq!(Direction::resolve("sideways", &sides()), None);
    }

    #[test]
    fn side_names_win_over_canonical_tokens() {
        let swapped = ["b".to_string(), "a".to_string()];
        assert_eq!(Direction::resolve("a2b", &swapped), Some(Direction::BToA));
        assert_eq!(Direction::resolve("B-to-A", &swapped), Some(Direction::AToB));
        assert_eq!(Direction::resolve("forward", &swapped), Some(Direction::AToB));
    }

    #[test]
    fn direction_sides() {
        assert_eq!(Direction::AToB.source(), Side::A);
        assert_eq!(Direction::AToB.target(), Side::B);
        assert_eq!(Direction::BToA.reversed(), Direction::AToB);
    }

    #[test]
    fn class_membership_and_canonical_char() {
        let class = CharClass {
            negated: false,
            items: vec![ClassItem::Char(' '), ClassItem::Range('a', 'c')],
            text: "[ a-c]".into(),
        };
        assert!(class.matches('b'));
        assert!(!class.matches('d'));
        assert_eq!(class.canonical_char(), Some(' '));

        let negated = CharClass {
            negated: true,
            ..class
        };
        assert!(negated.matches('d'));
        assert_eq!(negated.canonical_char(), None);
    }
}
