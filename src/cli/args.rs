//! Defines the command-line arguments and subcommands for the Duet CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "duet",
    version,
    about = "One grammar, two notations: a bidirectional text transcoder."
)]
pub struct DuetArgs {
    /// Engine configuration file (YAML, or JSON when it ends in .json).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log engine activity at debug level (overrides DUET_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Grammar, direction and input shared by the transforming commands.
#[derive(Debug, Args)]
pub struct TransformArgs {
    /// Grammar file, or a reference resolved against the configured grammar directory.
    #[arg(short, long)]
    pub grammar: String,

    /// Direction token such as `a2b`, `b2a` or `<side>2<side>`.
    #[arg(short, long)]
    pub direction: String,

    /// Input file. Reads stdin when omitted.
    pub file: Option<PathBuf>,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transform input with a grammar and print the result.
    Transform(TransformArgs),
    /// Validate grammar files, or directories of grammar files.
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the parse tree of the input as JSON.
    Tree(TransformArgs),
    /// Transform there and back and compare with the input.
    Roundtrip(TransformArgs),
}
