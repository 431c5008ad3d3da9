//! Handles all user-facing output for the CLI.
//!
//! Colours are only used when stdout is a terminal.

use std::io::{self, Write};
use std::path::Path;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::grammar::{Direction, Grammar};

fn stdout() -> StandardStream {
    let choice = if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Writes transform output exactly as produced.
pub fn write_output(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()
}

/// One line per valid grammar: sides, rule count, entries, fingerprint.
pub fn print_check_ok(path: &Path, grammar: &Grammar) {
    let mut stdout = stdout();
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    print!("ok");
    let _ = stdout.reset();

    let entries: Vec<String> = Direction::BOTH
        .iter()
        .map(|direction| {
            let rule = grammar
                .entry(*direction)
                .and_then(|id| grammar.rule(id))
                .map_or("-", |rule| rule.name.as_str());
            format!(
                "{}2{}={}",
                grammar.side_name(direction.source()),
                grammar.side_name(direction.target()),
                rule
            )
        })
        .collect();

    println!(
        " {}: {} rules, sides {}/{}, entries {}, {}sha256 {}",
        path.display(),
        grammar.rules().len(),
        grammar.side_name(crate::grammar::Side::A),
        grammar.side_name(crate::grammar::Side::B),
        entries.join(" "),
        if grammar.is_bidirectional() { "bidirectional, " } else { "" },
        &grammar.fingerprint()[..12],
    );
}

pub fn print_warning(path: &Path, message: &str) {
    let mut stdout = stdout();
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
    print!("warning");
    let _ = stdout.reset();
    println!(" {}: {}", path.display(), message);
}

/// Line diff between the original input and the round-tripped text.
pub fn print_round_trip_mismatch(input: &str, output: &str) {
    let mut stdout = stdout();
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    println!("--- input / +++ after round trip");
    let _ = stdout.reset();

    let changeset = Changeset::new(input, output, "\n");
    print_diff(&mut stdout, &changeset.diffs);
    let _ = stdout.reset();
}

pub fn print_round_trip_ok(direction: Direction) {
    let mut stdout = stdout();
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    print!("round trip ok");
    let _ = stdout.reset();
    println!(" ({} and back)", direction);
}

fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) {
    for diff in diffs {
        match diff {
            Difference::Same(ref x) => {
                let _ = stdout.reset();
                for line in x.lines() {
                    println!(" {}", line);
                }
            }
            Difference::Add(ref x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
                for line in x.lines() {
                    println!("+{}", line);
                }
            }
            Difference::Rem(ref x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
                for line in x.lines() {
                    println!("-{}", line);
                }
            }
        }
    }
}
