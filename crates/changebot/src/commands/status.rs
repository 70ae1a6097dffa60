//! Status command: preview what `run` would do, without side effects.

use camino::Utf8Path;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use changebot_core::changeset::{ChangesetRef, read_changeset_state};
use changebot_core::config::Config;
use changebot_core::dispatch::{self, DispatchDecision};
use changebot_core::env::RunEnvironment;

/// Arguments for the `status` subcommand.
#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Treat the run as manually dispatched
    #[arg(long)]
    pub manual: bool,

    /// Command that publishes packages (only its presence matters here)
    #[arg(long, env = "INPUT_PUBLISH", value_name = "SCRIPT")]
    pub publish: Option<String>,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    changeset_dir: &'a Utf8Path,
    changesets: &'a [ChangesetRef],
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_tag: Option<&'a str>,
    event: &'a str,
    decision: DispatchDecision,
}

/// Print pending changesets and the dispatch decision.
#[instrument(name = "cmd_status", skip_all, fields(json_output = global_json))]
pub fn cmd_status(
    args: StatusArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let env = RunEnvironment::from_env();
    let state = read_changeset_state(cwd, config.changeset_dir())?;

    let manual = args.manual || env.trigger.is_manual_dispatch();
    let has_publish_script = args.publish.is_some_and(|s| !s.trim().is_empty());
    let decision = dispatch::decide(state.has_changesets(), manual, has_publish_script);
    debug!(%decision, manual, has_publish_script, "status computed");

    let report = StatusReport {
        changeset_dir: config.changeset_dir(),
        changesets: &state.changesets,
        pre_tag: state.pre_tag(),
        event: &env.trigger.event_name,
        decision,
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Changesets".bold().underline());
    if report.changesets.is_empty() {
        println!("  {} No pending changesets", "○".yellow());
    }
    for changeset in report.changesets {
        let releases: Vec<String> = changeset
            .releases
            .iter()
            .map(|r| format!("{} ({})", r.name, r.bump))
            .collect();
        println!("  {} {} {}", "•".cyan(), changeset.id.bold(), releases.join(", ").dimmed());
    }
    if let Some(tag) = report.pre_tag {
        println!("  {} pre-release mode: {}", "!".yellow(), tag.yellow());
    }
    println!();
    println!("{}: {}", "Next run".dimmed(), decision.to_string().green());
    Ok(())
}
