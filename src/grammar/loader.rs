//! Grammar source loader.
//!
//! Converts grammar source text into the rule model with source location tracking.
//! This stage is purely syntactic: references, captures and recursion are checked by the
//! validators afterwards.

use pest::{error::InputLocation, iterators::Pair, Parser};
use pest_derive::Parser;

use super::model::{self, CharClass, ClassItem, EntryDecl, Expr, Production, RuleBody, RuleId, Span};
use crate::errors::{GrammarError, GrammarErrorKind, SourceContext};

#[derive(Parser)]
#[grammar = "grammar/grammar.pest"]
struct GrammarSyntax;

/// Everything a grammar source declares, before validation.
#[derive(Debug, Clone, Default)]
pub struct GrammarDraft {
    pub name: Option<String>,
    pub sides: Option<([String; 2], Span)>,
    pub bidirectional: Option<Span>,
    pub entries: Vec<EntryDecl>,
    pub rules: Vec<model::Rule>,
}

impl GrammarDraft {
    pub fn side_names(&self) -> [String; 2] {
        match &self.sides {
            Some((names, _)) => names.clone(),
            None => ["a".to_string(), "b".to_string()],
        }
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse grammar source text into a draft rule list.
pub fn parse_source(source: &SourceContext) -> Result<GrammarDraft, GrammarError> {
    let mut pairs = GrammarSyntax::parse(Rule::grammar, &source.content)
        .map_err(|e| convert_parse_error(e, source))?;
    let Some(root) = pairs.next() else {
        return Err(syntax_error(source, "empty grammar", Span::default()));
    };

    let mut draft = GrammarDraft::default();
    for pair in root.into_inner() {
        let span = get_span(&pair);
        match pair.as_rule() {
            Rule::name_decl => {
                let literal = first_inner(pair, source)?;
                draft.name = Some(unescape_literal(literal, source)?);
            }
            Rule::sides_decl => {
                let names: Vec<String> = pair.into_inner().map(|p| p.as_str().to_string()).collect();
                let [a, b] = <[String; 2]>::try_from(names)
                    .map_err(|_| syntax_error(source, "%sides takes two names", span))?;
                if a == b {
                    return Err(syntax_error(source, "the two sides need distinct names", span));
                }
                draft.sides = Some(([a, b], span));
            }
            Rule::bidi_decl => draft.bidirectional = Some(span),
            Rule::entry_decl => {
                let mut names: Vec<String> = pair.into_inner().map(|p| p.as_str().to_string()).collect();
                let rule = names.pop().unwrap_or_default();
                draft.entries.push(EntryDecl {
                    side: names.pop(),
                    rule,
                    span,
                });
            }
            Rule::shared_rule => {
                let id = RuleId(draft.rules.len());
                draft.rules.push(build_shared_rule(pair, id, source)?);
            }
            Rule::production_rule => {
                let id = RuleId(draft.rules.len());
                draft.rules.push(build_production_rule(pair, id, source)?);
            }
            Rule::EOI => {}
            other => {
                return Err(syntax_error(
                    source,
                    &format!("unsupported construct: {:?}", other),
                    span,
                ))
            }
        }
    }

    Ok(draft)
}

// ============================================================================
// RULE BUILDERS
// ============================================================================

fn build_shared_rule(
    pair: Pair<Rule>,
    id: RuleId,
    source: &SourceContext,
) -> Result<model::Rule, GrammarError> {
    let span = get_span(&pair);
    let mut inner = pair.into_inner();
    let name = next_inner(&mut inner, source, span, "rule name")?;
    let body = next_inner(&mut inner, source, span, "rule body")?;

    Ok(model::Rule {
        id,
        name: name.as_str().to_string(),
        span,
        body: RuleBody::Shared(build_choice(body, source)?),
    })
}

fn build_production_rule(
    pair: Pair<Rule>,
    id: RuleId,
    source: &SourceContext,
) -> Result<model::Rule, GrammarError> {
    let span = get_span(&pair);
    let mut inner = pair.into_inner();
    let name = next_inner(&mut inner, source, span, "rule name")?;

    let productions = inner
        .map(|production| build_production(production, source))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(model::Rule {
        id,
        name: name.as_str().to_string(),
        span,
        body: RuleBody::Productions(productions),
    })
}

fn build_production(pair: Pair<Rule>, source: &SourceContext) -> Result<Production, GrammarError> {
    let span = get_span(&pair);
    let mut inner = pair.into_inner();
    let a = next_inner(&mut inner, source, span, "A side")?;
    let b = next_inner(&mut inner, source, span, "B side")?;

    Ok(Production {
        sides: [build_side(a, source)?, build_side(b, source)?],
        span,
    })
}

fn build_side(pair: Pair<Rule>, source: &SourceContext) -> Result<Option<Expr>, GrammarError> {
    let inner = first_inner(pair, source)?;
    match inner.as_rule() {
        Rule::absent => Ok(None),
        _ => build_choice(inner, source).map(Some),
    }
}

// ============================================================================
// EXPRESSION BUILDERS
// ============================================================================

fn build_choice(pair: Pair<Rule>, source: &SourceContext) -> Result<Expr, GrammarError> {
    let mut alternatives = pair
        .into_inner()
        .map(|p| build_sequence(p, source))
        .collect::<Result<Vec<_>, _>>()?;

    if alternatives.len() == 1 {
        return Ok(alternatives.remove(0));
    }
    Ok(Expr::Choice(alternatives))
}

fn build_sequence(pair: Pair<Rule>, source: &SourceContext) -> Result<Expr, GrammarError> {
    let mut items = pair
        .into_inner()
        .map(|p| build_term(p, source))
        .collect::<Result<Vec<_>, _>>()?;

    if items.len() == 1 {
        return Ok(items.remove(0));
    }
    Ok(Expr::Seq(items))
}

fn build_term(pair: Pair<Rule>, source: &SourceContext) -> Result<Expr, GrammarError> {
    let span = get_span(&pair);
    match pair.as_rule() {
        Rule::capture => {
            let mut inner = pair.into_inner();
            let label = next_inner(&mut inner, source, span, "capture label")?;
            let body = next_inner(&mut inner, source, span, "captured expression")?;
            Ok(Expr::Capture {
                label: label.as_str().to_string(),
                expr: Box::new(build_postfix(body, source)?),
                span,
            })
        }
        Rule::postfix => build_postfix(pair, source),
        other => Err(syntax_error(
            source,
            &format!("unsupported term: {:?}", other),
            span,
        )),
    }
}

fn build_postfix(pair: Pair<Rule>, source: &SourceContext) -> Result<Expr, GrammarError> {
    let span = get_span(&pair);
    let mut inner = pair.into_inner();
    let primary = next_inner(&mut inner, source, span, "expression")?;
    let mut expr = build_primary(primary, source)?;

    for suffix in inner {
        let (min, max) = match suffix.as_rule() {
            Rule::star => (0, None),
            Rule::plus => (1, None),
            Rule::question => (0, Some(1)),
            Rule::bounds => parse_bounds(suffix, source)?,
            other => {
                return Err(syntax_error(
                    source,
                    &format!("unsupported suffix: {:?}", other),
                    span,
                ))
            }
        };
        expr = Expr::Repeat {
            expr: Box::new(expr),
            min,
            max,
        };
    }

    Ok(expr)
}

fn build_primary(pair: Pair<Rule>, source: &SourceContext) -> Result<Expr, GrammarError> {
    let span = get_span(&pair);
    match pair.as_rule() {
        Rule::literal => Ok(Expr::Literal(unescape_literal(pair, source)?)),
        Rule::class => Ok(Expr::Class(parse_class(pair, source)?)),
        Rule::any => Ok(Expr::Any),
        Rule::group => build_choice(first_inner(pair, source)?, source),
        Rule::reference => Ok(Expr::Ref {
            name: pair.as_str().to_string(),
            span,
        }),
        other => Err(syntax_error(
            source,
            &format!("unsupported expression: {:?}", other),
            span,
        )),
    }
}

fn parse_bounds(pair: Pair<Rule>, source: &SourceContext) -> Result<(u32, Option<u32>), GrammarError> {
    let span = get_span(&pair);
    let mut min = None;
    let mut max = None;
    let mut open_ended = false;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::number => {
                let value = part.as_str().parse::<u32>().map_err(|_| {
                    syntax_error(source, "repetition bound is too large", span)
                })?;
                if open_ended {
                    max = Some(value);
                } else {
                    min = Some(value);
                }
            }
            Rule::bounds_sep => open_ended = true,
            _ => {}
        }
    }

    let min = min.ok_or_else(|| syntax_error(source, "missing repetition bound", span))?;
    let max = match (open_ended, max) {
        (false, _) => Some(min),
        (true, max) => max,
    };
    if let Some(max) = max {
        if max < min {
            return Err(syntax_error(
                source,
                &format!("repetition bounds {{{min},{max}}} are reversed"),
                span,
            ));
        }
        if max == 0 {
            return Err(syntax_error(source, "repetition of zero items", span));
        }
    }
    Ok((min, max))
}

// ============================================================================
// TERMINALS
// ============================================================================

fn unescape_literal(pair: Pair<Rule>, source: &SourceContext) -> Result<String, GrammarError> {
    let span = get_span(&pair);
    let inner = first_inner(pair, source)?;
    let mut chars = inner.as_str().chars().peekable();
    let mut result = String::with_capacity(inner.as_str().len());

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        let escaped = match chars.next() {
            Some('u') => read_unicode_escape(&mut chars)
                .ok_or_else(|| syntax_error(source, "malformed \\u{...} escape", span))?,
            Some(other) => simple_escape(other).ok_or_else(|| {
                syntax_error(source, &format!("unknown escape '\\{}'", other), span)
            })?,
            None => return Err(syntax_error(source, "dangling backslash", span)),
        };
        result.push(escaped);
    }

    Ok(result)
}

fn parse_class(pair: Pair<Rule>, source: &SourceContext) -> Result<CharClass, GrammarError> {
    let span = get_span(&pair);
    let text = pair.as_str().to_string();
    let mut negated = false;
    let mut body = "";

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::negated => negated = true,
            Rule::class_inner => body = part.as_str(),
            _ => {}
        }
    }

    let mut members = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        let escaped = ch == '\\';
        let ch = if escaped {
            match chars.next() {
                Some('u') => read_unicode_escape(&mut chars)
                    .ok_or_else(|| syntax_error(source, "malformed \\u{...} escape", span))?,
                Some(other) => class_escape(other).ok_or_else(|| {
                    syntax_error(source, &format!("unknown escape '\\{}'", other), span)
                })?,
                None => return Err(syntax_error(source, "dangling backslash", span)),
            }
        } else {
            ch
        };
        // A bare '-' between two members forms a range; leading or trailing '-' is literal.
        let range_dash = !escaped && ch == '-' && !members.is_empty() && chars.peek().is_some();
        members.push((ch, range_dash));
    }

    let mut items = Vec::new();
    let mut index = 0;
    while index < members.len() {
        let (ch, _) = members[index];
        let is_range = members.get(index + 1).is_some_and(|(_, dash)| *dash)
            && index + 2 < members.len();
        if is_range {
            let hi = members[index + 2].0;
            if hi < ch {
                return Err(syntax_error(
                    source,
                    &format!("character range {}-{} is reversed", ch, hi),
                    span,
                ));
            }
            items.push(ClassItem::Range(ch, hi));
            index += 3;
        } else {
            items.push(ClassItem::Char(ch));
            index += 1;
        }
    }

    if items.is_empty() {
        return Err(syntax_error(source, "empty character class", span));
    }

    Ok(CharClass {
        negated,
        items,
        text,
    })
}

fn simple_escape(ch: char) -> Option<char> {
    match ch {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        _ => None,
    }
}

fn class_escape(ch: char) -> Option<char> {
    match ch {
        ']' | '[' | '-' | '^' => Some(ch),
        other => simple_escape(other),
    }
}

fn read_unicode_escape(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<char> {
    if chars.next()? != '{' {
        return None;
    }
    let mut digits = String::new();
    loop {
        match chars.next()? {
            '}' => break,
            c if c.is_ascii_hexdigit() && digits.len() < 6 => digits.push(c),
            _ => return None,
        }
    }
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}

// ============================================================================
// UTILITIES
// ============================================================================

fn get_span(pair: &Pair<Rule>) -> Span {
    Span::new(pair.as_span().start(), pair.as_span().end())
}

fn first_inner<'i>(pair: Pair<'i, Rule>, source: &SourceContext) -> Result<Pair<'i, Rule>, GrammarError> {
    let span = get_span(&pair);
    pair.into_inner()
        .next()
        .ok_or_else(|| syntax_error(source, "incomplete construct", span))
}

fn next_inner<'i>(
    inner: &mut pest::iterators::Pairs<'i, Rule>,
    source: &SourceContext,
    span: Span,
    element: &str,
) -> Result<Pair<'i, Rule>, GrammarError> {
    inner
        .next()
        .ok_or_else(|| syntax_error(source, &format!("missing {}", element), span))
}

fn syntax_error(source: &SourceContext, message: &str, span: Span) -> GrammarError {
    GrammarError::at(
        GrammarErrorKind::SyntaxError {
            message: message.to_string(),
        },
        source,
        span.start,
        span.end,
    )
}

fn convert_parse_error(error: pest::error::Error<Rule>, source: &SourceContext) -> GrammarError {
    let error = error.renamed_rules(|rule| {
        match rule {
            Rule::ident | Rule::reference => "identifier",
            Rule::literal => "string literal",
            Rule::class => "character class",
            Rule::production => "production (':' side '<=>' side)",
            Rule::shared_rule | Rule::production_rule => "rule",
            Rule::name_decl | Rule::sides_decl | Rule::bidi_decl | Rule::entry_decl => "directive",
            Rule::capture => "capture",
            Rule::postfix | Rule::group | Rule::any => "expression",
            Rule::star | Rule::plus | Rule::question | Rule::bounds => "repetition",
            Rule::EOI => "end of grammar",
            other => return format!("{:?}", other),
        }
        .to_string()
    });

    let (start, end) = match error.location {
        InputLocation::Pos(pos) => (pos, pos),
        InputLocation::Span((start, end)) => (start, end),
    };

    GrammarError::at(
        GrammarErrorKind::SyntaxError {
            message: error.variant.message().into_owned(),
        },
        source,
        start,
        end,
    )
}
