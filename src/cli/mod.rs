//! The Duet Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::{fs, io, process};

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::cli::args::{Command, DuetArgs, TransformArgs};
use crate::config::EngineConfig;
use crate::errors::print_error;
use crate::grammar;
use crate::transform::{DirectorySource, Transcoder};

pub mod args;
pub mod output;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "DUET_LOG";

/// `Ok(false)` means the command ran but found problems it already reported.
type CommandResult = miette::Result<bool>;

/// The main entry point for the CLI.
pub fn run() {
    let args = DuetArgs::parse();
    init_logging(args.verbose);

    let result = load_config(args.config.as_deref()).and_then(|config| match &args.command {
        Command::Transform(transform) => handle_transform(&config, transform),
        Command::Check { paths } => handle_check(&config, paths),
        Command::Tree(transform) => handle_tree(&config, transform),
        Command::Roundtrip(transform) => handle_roundtrip(&config, transform),
    });

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(report) => {
            eprintln!("{report:?}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> miette::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Builds a transcoder and the reference to use for `--grammar`. A path to an existing file is
/// loaded from that file; anything else is looked up in the configured grammar directory.
fn transcoder_for(config: &EngineConfig, grammar: &str) -> (Transcoder, String) {
    let path = Path::new(grammar);
    if path.is_file() {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let transcoder = Transcoder::new(
                DirectorySource::new(root).with_extension(&config.extension),
            )
            .with_options(config.parse_options())
            .with_profiles(config.profiles.clone());
            return (transcoder, name.to_string());
        }
    }
    let transcoder = Transcoder::from_config(config);
    let reference = transcoder.resolve_profile(grammar).to_string();
    (transcoder, reference)
}

fn read_input(file: Option<&Path>) -> miette::Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("cannot read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .into_diagnostic()
                .wrap_err("cannot read stdin")?;
            Ok(text)
        }
    }
}

/// Handles the `transform` subcommand.
fn handle_transform(config: &EngineConfig, args: &TransformArgs) -> CommandResult {
    let (transcoder, reference) = transcoder_for(config, &args.grammar);
    let input = read_input(args.file.as_deref())?;
    let output = transcoder.transform(&reference, &input, &args.direction)?;
    output::write_output(&output).into_diagnostic()?;
    Ok(true)
}

/// Handles the `tree` subcommand.
fn handle_tree(config: &EngineConfig, args: &TransformArgs) -> CommandResult {
    let (transcoder, reference) = transcoder_for(config, &args.grammar);
    let input = read_input(args.file.as_deref())?;
    let tree = transcoder.tree(&reference, &input, &args.direction)?;
    let json = serde_json::to_string_pretty(&tree).into_diagnostic()?;
    println!("{json}");
    Ok(true)
}

/// Handles the `roundtrip` subcommand.
fn handle_roundtrip(config: &EngineConfig, args: &TransformArgs) -> CommandResult {
    let (transcoder, reference) = transcoder_for(config, &args.grammar);
    let input = read_input(args.file.as_deref())?;
    let trip = transcoder.round_trip(&reference, &input, &args.direction)?;
    if trip.is_identity(&input) {
        output::print_round_trip_ok(trip.direction);
        return Ok(true);
    }
    output::print_round_trip_mismatch(&input, &trip.output);
    Ok(false)
}

/// Handles the `check` subcommand.
fn handle_check(config: &EngineConfig, paths: &[PathBuf]) -> CommandResult {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_grammar_files(path, &config.extension));
        } else {
            files.push(path.clone());
        }
    }
    if files.is_empty() {
        return Err(miette::miette!("no .{} grammar files found", config.extension));
    }

    let mut all_valid = true;
    for file in &files {
        let text = fs::read_to_string(file)
            .into_diagnostic()
            .wrap_err_with(|| format!("cannot read {}", file.display()))?;
        let analysis = grammar::analyze(&file.display().to_string(), &text);
        for warning in &analysis.report.warnings {
            output::print_warning(file, warning);
        }
        match analysis.grammar {
            Some(grammar) => output::print_check_ok(file, &grammar),
            None => {
                all_valid = false;
                for error in analysis.report.errors {
                    print_error(error);
                }
            }
        }
    }
    Ok(all_valid)
}

/// Discovers all grammar files recursively under the given root directory.
fn discover_grammar_files(root: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .map(|ext| ext == extension)
                    .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}
