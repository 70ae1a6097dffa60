//! Library interface for the `changebot` CLI.
//!
//! This crate exposes the CLI's argument parser and command structure as a library,
//! primarily for testing. The actual entry point is in `main.rs`.
//!
//! # Structure
//!
//! - [`Cli`] - The root argument parser (clap derive)
//! - [`Commands`] - Available subcommands
//! - [`commands`] - Command implementations

pub mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Color output preference.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect terminal capabilities automatically.
    #[default]
    Auto,
    /// Always emit colors.
    Always,
    /// Never emit colors.
    Never,
}

impl ColorChoice {
    /// Configure global color output based on this choice.
    ///
    /// Call this once at startup to set the color mode.
    pub fn apply(self) {
        match self {
            Self::Auto => {} // owo-colors auto-detects by default
            Self::Always => owo_colors::set_override(true),
            Self::Never => owo_colors::set_override(false),
        }
    }
}

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    GITHUB_TOKEN            Token for git pushes and the GitHub API (required by `run`)
    GITHUB_EVENT_NAME       Trigger event; `workflow_dispatch` publishes releases
    GITHUB_REPOSITORY       owner/repo (defaults to the origin remote)
    GITHUB_REF_NAME         Base branch (defaults to the current branch)
    GITHUB_SHA              Commit to version from and tag (defaults to HEAD)
    GITHUB_OUTPUT           File receiving action outputs
    INPUT_<NAME>            Action inputs, e.g. INPUT_SETUPGITUSER
    RUST_LOG                Log filter (e.g., debug, changebot=trace)
    CHANGEBOT_LOG_PATH      Explicit log file path
    CHANGEBOT_LOG_DIR       Log directory
";

/// Command-line interface definition for changebot.
#[derive(Parser)]
#[command(name = "changebot")]
#[command(about = "Changesets release automation for GitHub Actions", long_about = None)]
#[command(version)]
#[command(after_long_help = ENV_HELP)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Only print errors (suppresses warnings/info)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More detail (repeatable; e.g. -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Colorize output
    #[arg(long, global = true, value_enum, default_value_t)]
    pub color: ColorChoice,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands for the CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Version or publish, depending on pending changesets
    Run(commands::run::RunArgs),

    /// Show pending changesets and what `run` would do
    Status(commands::status::StatusArgs),
}

/// Returns the clap command, for help rendering and argument tests.
pub fn command() -> clap::Command {
    Cli::command()
}
