// Regression tests: CLI commands, exit codes and miette diagnostics on stderr.
// Requires: assert_cmd, predicates, tempfile crates in [dev-dependencies]

mod common;

use std::fs;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};
use tempfile::tempdir;

fn shipped_grammar() -> String {
    common::grammar_dir()
        .join("epidoc-lite.duet")
        .display()
        .to_string()
}

fn duet() -> Command {
    let mut cmd = Command::cargo_bin("duet").unwrap();
    cmd.env_remove("DUET_LOG");
    cmd
}

#[test]
fn transform_reads_a_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("text.txt");
    fs::write(&input, "1. ab[cd]e\n").unwrap();

    duet()
        .args(["transform", "-g", &shipped_grammar(), "-d", "leiden2xml"])
        .arg(&input)
        .assert()
        .success()
        .stdout("<ab>\n<lb n=\"1\"/>ab<supplied reason=\"lost\">cd</supplied>e\n</ab>\n");
}

#[test]
fn transform_reads_stdin() {
    duet()
        .args(["transform", "-g", &shipped_grammar(), "-d", "xml2leiden"])
        .write_stdin("<ab>\n<lb n=\"3\"/>x<ex>y</ex>\n</ab>\n")
        .assert()
        .success()
        .stdout("3. x(y)\n");
}

#[test]
fn grammar_reference_resolves_through_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("duet.yaml");
    fs::write(
        &config,
        format!(
            "grammar_dir: {}\nprofiles:\n  epidoc: epidoc-lite\n",
            common::grammar_dir().display()
        ),
    )
    .unwrap();

    duet()
        .arg("--config")
        .arg(&config)
        .args(["transform", "-g", "epidoc", "-d", "a2b"])
        .write_stdin("1. q\n")
        .assert()
        .success()
        .stdout("<ab>\n<lb n=\"1\"/>q\n</ab>\n");
}

#[test]
fn transform_errors_render_as_diagnostics() {
    duet()
        .args(["transform", "-g", &shipped_grammar(), "-d", "xml2leiden"])
        .write_stdin("<ab>\n<lb n=\"1\"/><del>x</del>\n</ab>\n")
        .assert()
        .failure()
        .code(1)
        .stdout("")
        .stderr(contains("duet::transform::no_rule_matches"));
}

#[test]
fn check_accepts_the_shipped_grammars() {
    duet()
        .arg("check")
        .arg(common::grammar_dir())
        .assert()
        .success()
        .stdout(contains("ok").and(contains("epidoc-lite.duet")).and(contains("sides leiden/xml")));
}

#[test]
fn check_reports_grammar_errors() {
    let dir = tempdir().unwrap();
    let bad = dir.path().join("bad.duet");
    fs::write(&bad, "%entry r;\nr = missing ;\n").unwrap();

    duet()
        .arg("check")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(contains("duet::grammar::unknown_rule").or(contains("help:")));
}

#[test]
fn check_without_grammar_files_fails() {
    let dir = tempdir().unwrap();
    duet()
        .arg("check")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("no .duet grammar files found"));
}

#[test]
fn tree_prints_json() {
    duet()
        .args(["tree", "-g", &shipped_grammar(), "-d", "leiden2xml"])
        .write_stdin("1. a\n")
        .assert()
        .success()
        .stdout(contains("\"name\": \"document\"").and(contains("\"label\": \"lines\"")));
}

#[test]
fn roundtrip_reports_success() {
    duet()
        .args(["roundtrip", "-g", &shipped_grammar(), "-d", "leiden2xml"])
        .write_stdin("1. [.?]a<b>\n")
        .assert()
        .success()
        .stdout(contains("round trip ok"));
}
