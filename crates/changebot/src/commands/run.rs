//! Run command: the full action.

use anyhow::Context;
use camino::Utf8Path;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use changebot_core::action::{self, ActionEvent, RunContext, StageOutcome, SystemBackend};
use changebot_core::config::Config;
use changebot_core::env::RunEnvironment;
use changebot_core::inputs::{ActionInputs, RawInputs};

/// Arguments for the `run` subcommand.
///
/// Each flag falls back to the `INPUT_<NAME>` variable GitHub sets for the
/// matching `with:` key.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configure the bot committer and write ~/.netrc (true|false)
    #[arg(long, env = "INPUT_SETUPGITUSER", value_name = "BOOL")]
    pub setup_git_user: Option<String>,

    /// Command to run instead of `changeset version`
    #[arg(long, env = "INPUT_VERSION", value_name = "SCRIPT")]
    pub version_script: Option<String>,

    /// Version pull request title
    #[arg(long, env = "INPUT_TITLE")]
    pub title: Option<String>,

    /// Version commit message
    #[arg(long, env = "INPUT_COMMIT", value_name = "MESSAGE")]
    pub commit: Option<String>,

    /// Command that publishes packages
    #[arg(long, env = "INPUT_PUBLISH", value_name = "SCRIPT")]
    pub publish: Option<String>,

    /// Create GitHub releases after a publish script (true|false)
    #[arg(long, env = "INPUT_CREATEGITHUBRELEASES", value_name = "BOOL")]
    pub create_github_releases: Option<String>,
}

impl RunArgs {
    fn into_raw(self) -> RawInputs {
        RawInputs {
            setup_git_user: self.setup_git_user,
            version: self.version_script,
            title: self.title,
            commit: self.commit,
            publish: self.publish,
            create_github_releases: self.create_github_releases,
        }
    }
}

/// Execute a run in `cwd`.
#[instrument(name = "cmd_run", skip_all)]
pub fn cmd_run(
    args: RunArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let env = RunEnvironment::from_env();
    debug!(?env, "captured environment");

    let inputs = ActionInputs::parse(args.into_raw(), config).context("invalid action input")?;
    let backend = SystemBackend::new(cwd, &env, &inputs, config);
    let ctx = RunContext {
        root: cwd,
        config,
        env: &env,
        inputs: &inputs,
    };

    let mut spinner: Option<ProgressBar> = None;
    let result = action::run(&ctx, &backend, |event| {
        if !global_json {
            handle_event(event, &mut spinner);
        }
    });
    if let Some(spinner) = spinner.take() {
        spinner.finish_and_clear();
    }
    let report = match result {
        Ok(report) => report,
        Err(err) if err.is_configuration() => {
            return Err(anyhow::Error::new(err).context("configuration error"));
        }
        Err(err) => return Err(err.into()),
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.published {
        let names: Vec<String> = report
            .published_packages
            .iter()
            .map(|p| format!("{}@{}", p.name, p.version))
            .collect();
        println!("{} {}", "Published".green().bold(), names.join(", "));
    }
    Ok(())
}

fn handle_event(event: ActionEvent, spinner: &mut Option<ProgressBar>) {
    match event {
        ActionEvent::StageStarted(stage) => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("  {spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
            bar.set_message(format!("{stage}..."));
            bar.enable_steady_tick(std::time::Duration::from_millis(80));
            *spinner = Some(bar);
        }
        ActionEvent::StageCompleted(stage, outcome) => {
            if let Some(bar) = spinner.take() {
                bar.finish_and_clear();
            }
            match outcome {
                StageOutcome::Success { message } => {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        format!("{stage}").bold(),
                        message.dimmed()
                    );
                }
                StageOutcome::Skipped { reason } => {
                    println!(
                        "  {} {} {}",
                        "○".yellow(),
                        format!("{stage}").bold(),
                        reason.dimmed()
                    );
                }
            }
        }
    }
}
