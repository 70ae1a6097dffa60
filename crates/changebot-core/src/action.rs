//! Run orchestration.
//!
//! A run is four stages in a fixed order: validate the environment,
//! optionally configure the git identity, read changeset state, then
//! dispatch to exactly one handler. Side effects go through a [`Backend`],
//! so the whole run can be driven by in-memory doubles.

use std::cell::OnceCell;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, instrument};

use crate::changeset::{self, ChangesetState};
use crate::config::{Config, GitIdentityConfig};
use crate::dispatch::{self, DispatchDecision};
use crate::env::{Credentials, EnvError, RunEnvironment};
use crate::error::ActionResult;
use crate::git::{self, GitWorkspace, SystemGit};
use crate::github::{self, GhCli, GitHost};
use crate::identity;
use crate::inputs::ActionInputs;
use crate::outputs::{ActionOutputs, GithubOutput, OutputSink, keys};
use crate::packages;
use crate::publish::{self, GitHubReleasePublisher, PublishRequest};
use crate::tools::{ChangesetCli, PublishTool, ScriptPublisher, VersionTool};
use crate::version_pr::{self, VersionPrRequest};

/// A stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Credential and environment validation.
    Environment,
    /// Committer identity and credential file.
    Identity,
    /// Reading the changeset directory.
    State,
    /// Choosing and running a handler.
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::Identity => write!(f, "identity"),
            Self::State => write!(f, "changesets"),
            Self::Dispatch => write!(f, "dispatch"),
        }
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StageOutcome {
    /// Stage completed.
    Success {
        /// What happened.
        message: String,
    },
    /// Stage was skipped.
    Skipped {
        /// Why.
        reason: String,
    },
}

/// Progress reported while a run executes.
#[derive(Debug, Clone)]
pub enum ActionEvent {
    /// A stage has started.
    StageStarted(Stage),
    /// A stage has completed.
    StageCompleted(Stage, StageOutcome),
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Decision taken.
    pub decision: DispatchDecision,
    /// `hasChangesets` output.
    pub has_changesets: bool,
    /// `published` output.
    pub published: bool,
    /// `publishedPackages` output.
    pub published_packages: Vec<crate::tools::PublishedPackage>,
    /// Version pull request number, when one was created or updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_number: Option<u64>,
}

/// Side-effecting collaborators of a run.
pub trait Backend {
    /// Configure the committer identity and write host credentials under `home`.
    fn configure_identity(&self, home: &Utf8Path, credentials: &Credentials) -> ActionResult<()>;
    /// Working copy of the repository.
    fn git(&self) -> &dyn GitWorkspace;
    /// Tool applying changesets.
    fn version_tool(&self) -> &dyn VersionTool;
    /// Publisher for the configured `publish` script, if any.
    fn script_publisher(&self) -> Option<&dyn PublishTool>;
    /// Hosting service; may resolve the repository on first use.
    fn host(&self) -> ActionResult<&dyn GitHost>;
    /// Destination for outputs.
    fn outputs(&self) -> &dyn OutputSink;
}

/// Everything a run reads.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Repository root.
    pub root: &'a Utf8Path,
    /// Loaded configuration.
    pub config: &'a Config,
    /// Captured process environment.
    pub env: &'a RunEnvironment,
    /// Parsed action inputs.
    pub inputs: &'a ActionInputs,
}

/// Execute a run.
///
/// Calls `on_event` at stage boundaries so the CLI can report progress.
#[instrument(skip_all, fields(root = %ctx.root))]
pub fn run(
    ctx: &RunContext<'_>,
    backend: &dyn Backend,
    mut on_event: impl FnMut(ActionEvent),
) -> ActionResult<RunReport> {
    on_event(ActionEvent::StageStarted(Stage::Environment));
    let credentials = ctx.env.credentials()?;
    on_event(ActionEvent::StageCompleted(
        Stage::Environment,
        success("GITHUB_TOKEN present"),
    ));

    on_event(ActionEvent::StageStarted(Stage::Identity));
    if ctx.inputs.setup_git_user {
        let home = ctx.env.home.as_deref().ok_or(EnvError::MissingHome)?;
        backend.configure_identity(home, &credentials)?;
        on_event(ActionEvent::StageCompleted(
            Stage::Identity,
            success("git user and credentials configured"),
        ));
    } else {
        on_event(ActionEvent::StageCompleted(
            Stage::Identity,
            StageOutcome::Skipped {
                reason: "setupGitUser is false".into(),
            },
        ));
    }

    on_event(ActionEvent::StageStarted(Stage::State));
    let state = changeset::read_changeset_state(ctx.root, ctx.config.changeset_dir())?;
    let has_changesets = state.has_changesets();
    let mut outputs = ActionOutputs::defaults(has_changesets);
    outputs.write(backend.outputs())?;
    on_event(ActionEvent::StageCompleted(
        Stage::State,
        success(format!("{} pending changeset(s)", state.changesets.len())),
    ));

    on_event(ActionEvent::StageStarted(Stage::Dispatch));
    let decision = dispatch::decide(
        has_changesets,
        ctx.env.trigger.is_manual_dispatch(),
        ctx.inputs.has_publish_script(),
    );
    info!(%decision, has_changesets, "dispatching");

    let mut pull_request_number = None;
    let message = match decision {
        DispatchDecision::Noop => "nothing to do".to_string(),
        DispatchDecision::VersionPr => {
            let outcome = version(ctx, backend, &state)?;
            let number = outcome.pull_request.number;
            backend
                .outputs()
                .set(keys::PULL_REQUEST_NUMBER, &number.to_string())?;
            pull_request_number = Some(number);
            let verb = if outcome.updated { "updated" } else { "opened" };
            format!("{verb} pull request #{number} from {}", outcome.branch)
        }
        DispatchDecision::PublishReleases => {
            let outcome = release(ctx, backend)?;
            if outcome.published() {
                outputs.published = true;
                outputs.published_packages = outcome.report.published;
                outputs.write_published(backend.outputs())?;
            }
            let mut message = format!("{} package(s) published", outputs.published_packages.len());
            if !outcome.release_failures.is_empty() {
                message.push_str(&format!(
                    ", no GitHub release for {}",
                    outcome.release_failures.join(", ")
                ));
            }
            message
        }
    };
    on_event(ActionEvent::StageCompleted(
        Stage::Dispatch,
        success(format!("{decision}: {message}")),
    ));

    Ok(RunReport {
        decision,
        has_changesets,
        published: outputs.published,
        published_packages: outputs.published_packages,
        pull_request_number,
    })
}

fn success(message: impl Into<String>) -> StageOutcome {
    StageOutcome::Success {
        message: message.into(),
    }
}

fn base_branch(ctx: &RunContext<'_>) -> ActionResult<String> {
    if let Some(branch) = &ctx.env.ref_name {
        return Ok(branch.clone());
    }
    git::current_branch(ctx.root)?.ok_or_else(|| EnvError::MissingBranch.into())
}

fn target_sha(ctx: &RunContext<'_>) -> ActionResult<String> {
    match &ctx.env.sha {
        Some(sha) => Ok(sha.clone()),
        None => Ok(git::head_sha(ctx.root)?),
    }
}

fn version(
    ctx: &RunContext<'_>,
    backend: &dyn Backend,
    state: &ChangesetState,
) -> ActionResult<version_pr::VersionPrOutcome> {
    let base = base_branch(ctx)?;
    let sha = target_sha(ctx)?;
    let request = VersionPrRequest {
        base_branch: &base,
        sha: &sha,
        branch_prefix: ctx.config.branch_prefix(),
        title: &ctx.inputs.pr_title,
        commit_message: &ctx.inputs.commit_message,
    };
    version_pr::run_version_pr(
        &request,
        state,
        backend.git(),
        backend.version_tool(),
        backend.host()?,
    )
}

fn release(ctx: &RunContext<'_>, backend: &dyn Backend) -> ActionResult<publish::PublishOutcome> {
    let sha = target_sha(ctx)?;
    let candidates = packages::release_candidates(&packages::discover(ctx.root)?);
    let host = backend.host()?;

    match backend.script_publisher() {
        Some(script) => {
            let request = PublishRequest {
                sha: &sha,
                create_releases_for_published: ctx.inputs.create_github_releases,
            };
            publish::run_publish(request, &candidates, script, host)
        }
        None => {
            let request = PublishRequest {
                sha: &sha,
                create_releases_for_published: false,
            };
            let publisher = GitHubReleasePublisher::new(host, sha.clone());
            publish::run_publish(request, &candidates, &publisher, host)
        }
    }
}

/// [`Backend`] that shells out to `git`, `gh`, and the changesets CLI.
pub struct SystemBackend {
    root: Utf8PathBuf,
    env: RunEnvironment,
    identity: Option<GitIdentityConfig>,
    git: SystemGit,
    version_tool: ChangesetCli,
    script_publisher: Option<ScriptPublisher>,
    outputs: GithubOutput,
    host: OnceCell<GhCli>,
}

impl SystemBackend {
    /// Build the backend for the repository at `root`.
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        env: &RunEnvironment,
        inputs: &ActionInputs,
        config: &Config,
    ) -> Self {
        let root = root.into();
        Self {
            git: SystemGit::new(root.clone()),
            version_tool: ChangesetCli::new(root.clone(), inputs.version_script.clone()),
            script_publisher: inputs
                .publish_script
                .as_ref()
                .map(|script| ScriptPublisher::new(root.clone(), script.clone())),
            outputs: GithubOutput::new(env.output_path.clone()),
            identity: config.git.clone(),
            env: env.clone(),
            host: OnceCell::new(),
            root,
        }
    }
}

impl Backend for SystemBackend {
    fn configure_identity(&self, home: &Utf8Path, credentials: &Credentials) -> ActionResult<()> {
        identity::setup_git_user(&self.root, self.identity.as_ref())?;
        identity::write_netrc(home, credentials)?;
        Ok(())
    }

    fn git(&self) -> &dyn GitWorkspace {
        &self.git
    }

    fn version_tool(&self) -> &dyn VersionTool {
        &self.version_tool
    }

    fn script_publisher(&self) -> Option<&dyn PublishTool> {
        self.script_publisher
            .as_ref()
            .map(|p| p as &dyn PublishTool)
    }

    fn host(&self) -> ActionResult<&dyn GitHost> {
        if let Some(host) = self.host.get() {
            return Ok(host);
        }
        let credentials = self.env.credentials()?;
        let slug = github::resolve_repo_slug(self.env.repo_slug(), &self.root)?;
        info!(%slug, "using GitHub repository");
        Ok(self.host.get_or_init(|| GhCli::new(slug, &credentials, self.root.clone())))
    }

    fn outputs(&self) -> &dyn OutputSink {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::RawInputs;
    use crate::testing::{FakeGit, FakeHost, FakePublisher, FakeVersionTool, RecordingOutputs};
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    struct FakeBackend {
        git: FakeGit,
        tool: FakeVersionTool,
        publisher: Option<FakePublisher>,
        host: FakeHost,
        outputs: RecordingOutputs,
        identity_calls: Cell<usize>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                git: FakeGit::dirty(),
                tool: FakeVersionTool::changing(&[("a", "1.1.0")]),
                publisher: None,
                host: FakeHost::default(),
                outputs: RecordingOutputs::default(),
                identity_calls: Cell::new(0),
            }
        }
    }

    impl Backend for FakeBackend {
        fn configure_identity(&self, _home: &Utf8Path, _c: &Credentials) -> ActionResult<()> {
            self.identity_calls.set(self.identity_calls.get() + 1);
            Ok(())
        }
        fn git(&self) -> &dyn GitWorkspace {
            &self.git
        }
        fn version_tool(&self) -> &dyn VersionTool {
            &self.tool
        }
        fn script_publisher(&self) -> Option<&dyn PublishTool> {
            self.publisher.as_ref().map(|p| p as &dyn PublishTool)
        }
        fn host(&self) -> ActionResult<&dyn GitHost> {
            Ok(&self.host)
        }
        fn outputs(&self) -> &dyn OutputSink {
            &self.outputs
        }
    }

    struct Repo {
        _tmp: TempDir,
        root: Utf8PathBuf,
    }

    impl Repo {
        fn new(changesets: usize) -> Self {
            let tmp = TempDir::new().unwrap();
            let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
            fs::create_dir(root.join(".changeset")).unwrap();
            fs::write(root.join(".changeset/config.json"), "{}").unwrap();
            for i in 0..changesets {
                fs::write(
                    root.join(format!(".changeset/change-{i}.md")),
                    "---\na: patch\n---\nfix\n",
                )
                .unwrap();
            }
            fs::write(root.join("package.json"), r#"{"name":"root","private":true}"#).unwrap();
            for (name, version) in [("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0")] {
                let dir = root.join("packages").join(name);
                fs::create_dir_all(&dir).unwrap();
                fs::write(
                    dir.join("package.json"),
                    format!(r#"{{"name":"{name}","version":"{version}"}}"#),
                )
                .unwrap();
            }
            Self { _tmp: tmp, root }
        }
    }

    fn env(event: &str) -> RunEnvironment {
        let event = event.to_string();
        RunEnvironment::from_lookup(move |key| match key {
            "GITHUB_TOKEN" => Some("ghs_test".into()),
            "HOME" => Some("/home/runner".into()),
            "GITHUB_EVENT_NAME" => Some(event.clone()),
            "GITHUB_REPOSITORY" => Some("acme/widgets".into()),
            "GITHUB_REF_NAME" => Some("main".into()),
            "GITHUB_SHA" => Some("abc123".into()),
            _ => None,
        })
    }

    fn inputs(publish: Option<&str>) -> ActionInputs {
        let raw = RawInputs {
            publish: publish.map(str::to_string),
            ..RawInputs::default()
        };
        ActionInputs::parse(raw, &Config::default()).unwrap()
    }

    fn run_with(
        repo: &Repo,
        env: &RunEnvironment,
        inputs: &ActionInputs,
        backend: &FakeBackend,
    ) -> ActionResult<RunReport> {
        let config = Config::default();
        let ctx = RunContext {
            root: &repo.root,
            config: &config,
            env,
            inputs,
        };
        run(&ctx, backend, |_| {})
    }

    #[test]
    fn missing_token_sets_no_outputs() {
        let repo = Repo::new(0);
        let backend = FakeBackend::new();
        let env = RunEnvironment::default();

        let err = run_with(&repo, &env, &inputs(None), &backend).unwrap_err();
        assert!(err.is_configuration());
        assert!(backend.outputs.0.borrow().is_empty());
        assert_eq!(backend.identity_calls.get(), 0);
    }

    #[test]
    fn noop_keeps_default_outputs() {
        let repo = Repo::new(0);
        let backend = FakeBackend::new();

        let report = run_with(&repo, &env("push"), &inputs(None), &backend).unwrap();
        assert_eq!(report.decision, DispatchDecision::Noop);
        assert_eq!(backend.outputs.get("published").as_deref(), Some("false"));
        assert_eq!(backend.outputs.get("publishedPackages").as_deref(), Some("[]"));
        assert_eq!(backend.outputs.get("hasChangesets").as_deref(), Some("false"));
        assert_eq!(backend.identity_calls.get(), 1);
        assert!(backend.git.calls().is_empty());
    }

    #[test]
    fn changesets_run_version_once_and_never_publish() {
        let repo = Repo::new(3);
        let mut backend = FakeBackend::new();
        backend.publisher = Some(FakePublisher::publishing(&["a"]));

        let report = run_with(
            &repo,
            &env("workflow_dispatch"),
            &inputs(Some("npm run release")),
            &backend,
        )
        .unwrap();

        assert_eq!(report.decision, DispatchDecision::VersionPr);
        assert_eq!(backend.tool.calls.get(), 1);
        assert_eq!(backend.publisher.as_ref().unwrap().calls.get(), 0);
        assert!(!report.published);
        assert_eq!(backend.outputs.get("published").as_deref(), Some("false"));
        assert_eq!(backend.outputs.get("hasChangesets").as_deref(), Some("true"));
        assert_eq!(backend.outputs.get("pullRequestNumber").as_deref(), Some("1"));
        assert_eq!(backend.host.pulls.borrow()[0].head, "changeset-release/main");
    }

    #[test]
    fn version_pr_twice_leaves_one_pull_request() {
        let repo = Repo::new(1);
        let backend = FakeBackend::new();
        let env = env("push");
        let inputs = inputs(None);

        run_with(&repo, &env, &inputs, &backend).unwrap();
        let second = run_with(&repo, &env, &inputs, &backend).unwrap();
        assert_eq!(second.pull_request_number, Some(1));
        assert_eq!(backend.host.open_pull_requests(), 1);
    }

    #[test]
    fn manual_dispatch_two_of_three_published() {
        let repo = Repo::new(0);
        let mut backend = FakeBackend::new();
        backend.host = FakeHost::default().failing_on(&["b@1.0.0"]);

        let report =
            run_with(&repo, &env("workflow_dispatch"), &inputs(None), &backend).unwrap();

        assert_eq!(report.decision, DispatchDecision::PublishReleases);
        assert!(report.published);
        assert_eq!(report.published_packages.len(), 2);
        assert_eq!(backend.outputs.get("published").as_deref(), Some("true"));
        assert_eq!(
            backend.outputs.get("publishedPackages").as_deref(),
            Some(r#"[{"name":"a","version":"1.0.0"},{"name":"c","version":"1.0.0"}]"#)
        );
        assert_eq!(backend.tool.calls.get(), 0);
    }

    #[test]
    fn release_failure_after_script_still_reports_published() {
        let repo = Repo::new(0);
        let mut backend = FakeBackend::new();
        backend.publisher = Some(FakePublisher::publishing(&["a", "b"]));
        backend.host = FakeHost::default().failing_on(&["b@1.0.0"]);

        let report = run_with(&repo, &env("push"), &inputs(Some("pnpm release")), &backend).unwrap();
        assert!(report.published);
        assert_eq!(backend.outputs.get("published").as_deref(), Some("true"));
        assert_eq!(
            backend.outputs.get("publishedPackages").as_deref(),
            Some(r#"[{"name":"a","version":"1.0.0"},{"name":"b","version":"1.0.0"}]"#)
        );
        assert_eq!(backend.host.release_tags(), ["a@1.0.0"]);
    }

    #[test]
    fn publish_script_runs_on_push() {
        let repo = Repo::new(0);
        let mut backend = FakeBackend::new();
        backend.publisher = Some(FakePublisher::publishing(&["a"]));

        let report = run_with(&repo, &env("push"), &inputs(Some("pnpm release")), &backend).unwrap();
        assert_eq!(report.decision, DispatchDecision::PublishReleases);
        assert_eq!(report.published_packages.len(), 1);
        assert_eq!(backend.host.release_tags(), ["a@1.0.0"]);
    }

    #[test]
    fn nothing_new_to_release_keeps_defaults() {
        let repo = Repo::new(0);
        let mut backend = FakeBackend::new();
        backend.host = FakeHost::with_existing_tags(&["a@1.0.0", "b@1.0.0", "c@1.0.0"]);

        let report =
            run_with(&repo, &env("workflow_dispatch"), &inputs(None), &backend).unwrap();
        assert!(!report.published);
        assert_eq!(backend.outputs.get("published").as_deref(), Some("false"));
    }

    #[test]
    fn setup_git_user_false_skips_identity() {
        let repo = Repo::new(0);
        let backend = FakeBackend::new();
        let raw = RawInputs {
            setup_git_user: Some("false".into()),
            ..RawInputs::default()
        };
        let inputs = ActionInputs::parse(raw, &Config::default()).unwrap();

        run_with(&repo, &env("push"), &inputs, &backend).unwrap();
        assert_eq!(backend.identity_calls.get(), 0);
    }

    #[test]
    fn missing_changeset_dir_fails_before_outputs() {
        let repo = Repo::new(0);
        fs::remove_dir_all(repo.root.join(".changeset")).unwrap();
        let backend = FakeBackend::new();

        let err = run_with(&repo, &env("push"), &inputs(None), &backend).unwrap_err();
        assert!(matches!(err, crate::error::ActionError::StateRead(_)));
        assert!(backend.outputs.0.borrow().is_empty());
    }

    #[test]
    fn events_cover_every_stage() {
        let repo = Repo::new(0);
        let backend = FakeBackend::new();
        let config = Config::default();
        let env = env("push");
        let inputs = inputs(None);
        let ctx = RunContext {
            root: &repo.root,
            config: &config,
            env: &env,
            inputs: &inputs,
        };

        let mut completed = Vec::new();
        run(&ctx, &backend, |event| {
            if let ActionEvent::StageCompleted(stage, _) = event {
                completed.push(stage);
            }
        })
        .unwrap();
        assert_eq!(
            completed,
            [Stage::Environment, Stage::Identity, Stage::State, Stage::Dispatch]
        );
    }
}
