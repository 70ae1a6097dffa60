//! External version and publish tools.
//!
//! Computing versions and publishing to a registry belong to the changesets
//! CLI or to user scripts. This module only runs them and reads back what
//! changed: package versions before and after a bump, and the `New tag:`
//! lines a publish prints.

use std::process::{Command, Output};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::changeset::ChangesetState;
use crate::packages::{self, PackageChange, PackagesError, ReleaseCandidate};

const CHANGESET_BIN: &str = "changeset";

/// Errors from running external tools.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The changesets CLI is not installed.
    #[error("`{0}` not found in node_modules/.bin or on PATH")]
    NotFound(&'static str),

    /// A tool could not be spawned.
    #[error("failed to run `{command}`: {source}")]
    Exec {
        /// Command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A tool exited non-zero.
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        /// Command line.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// Every attempted release failed.
    #[error("no release could be created (failed: {})", .0.join(", "))]
    AllReleasesFailed(Vec<String>),

    /// A GitHub call made while publishing failed.
    #[error(transparent)]
    Host(#[from] crate::github::GitHubError),

    /// Package manifests could not be snapshotted around a bump.
    #[error(transparent)]
    Packages(#[from] PackagesError),
}

/// Result alias for tool runs.
pub type ToolResult<T> = Result<T, ToolError>;

/// A package newly published by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPackage {
    /// Package name.
    pub name: String,
    /// Published version.
    pub version: String,
}

/// Outcome of a publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Newly published packages.
    pub published: Vec<PublishedPackage>,
    /// Tags or package names that failed.
    pub failed: Vec<String>,
}

impl PublishReport {
    /// Whether anything was newly published.
    pub fn any_published(&self) -> bool {
        !self.published.is_empty()
    }
}

/// Applies pending changesets to package versions and changelogs.
pub trait VersionTool {
    /// Run the bump and return the packages whose version changed.
    fn bump(&self, state: &ChangesetState) -> ToolResult<Vec<PackageChange>>;
}

/// Publishes release candidates.
pub trait PublishTool {
    /// Publish whatever is unpublished among `candidates`.
    fn publish(&self, candidates: &[ReleaseCandidate]) -> ToolResult<PublishReport>;
}

/// Locate the changesets CLI: the project's `node_modules/.bin` first, then `PATH`.
pub fn resolve_changeset_bin(root: &Utf8Path) -> ToolResult<Utf8PathBuf> {
    let local = root.join("node_modules").join(".bin").join(CHANGESET_BIN);
    if local.is_file() {
        return Ok(local);
    }
    which::which(CHANGESET_BIN)
        .ok()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .ok_or(ToolError::NotFound(CHANGESET_BIN))
}

/// [`VersionTool`] that runs a `version` script or `changeset version`.
#[derive(Debug, Clone)]
pub struct ChangesetCli {
    root: Utf8PathBuf,
    script: Option<String>,
}

impl ChangesetCli {
    /// Bump the repository at `root`, using `script` instead of the CLI when given.
    pub fn new(root: impl Into<Utf8PathBuf>, script: Option<String>) -> Self {
        Self {
            root: root.into(),
            script,
        }
    }
}

impl VersionTool for ChangesetCli {
    #[instrument(skip_all, fields(root = %self.root))]
    fn bump(&self, state: &ChangesetState) -> ToolResult<Vec<PackageChange>> {
        let before = packages::discover(&self.root)?;

        match &self.script {
            Some(script) => {
                run_checked(shell(script, &self.root), script)?;
            }
            None => {
                let bin = resolve_changeset_bin(&self.root)?;
                let mut cmd = Command::new(bin.as_std_path());
                cmd.arg("version").current_dir(self.root.as_std_path());
                run_checked(cmd, "changeset version")?;
            }
        }

        let after = packages::discover(&self.root)?;
        let changed = packages::changed_packages(&before, &after);
        info!(
            changesets = state.changesets.len(),
            changed = changed.len(),
            "applied changesets"
        );
        Ok(changed)
    }
}

/// [`PublishTool`] that runs the `publish` script and reads its `New tag:` lines.
#[derive(Debug, Clone)]
pub struct ScriptPublisher {
    root: Utf8PathBuf,
    script: String,
}

impl ScriptPublisher {
    /// Run `script` in `root`.
    pub fn new(root: impl Into<Utf8PathBuf>, script: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            script: script.into(),
        }
    }
}

impl PublishTool for ScriptPublisher {
    #[instrument(skip_all, fields(script = %self.script))]
    fn publish(&self, candidates: &[ReleaseCandidate]) -> ToolResult<PublishReport> {
        let output = run(shell(&self.script, &self.root), &self.script)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let published = parse_new_tags(&stdout, candidates);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if published.is_empty() {
                return Err(ToolError::CommandFailed {
                    command: self.script.clone(),
                    exit_code: output.status.code(),
                    stderr,
                });
            }
            warn!(
                published = published.len(),
                exit_code = ?output.status.code(),
                "publish script failed after publishing some packages"
            );
            return Ok(PublishReport {
                published,
                failed: vec![self.script.clone()],
            });
        }

        Ok(PublishReport {
            published,
            failed: Vec::new(),
        })
    }
}

/// Extract published packages from `New tag: <tag>` lines.
///
/// Tags are matched against the candidates first, which resolves `v<version>`
/// tags of single-package repos. Otherwise a tag is split at its last `@`,
/// so scoped names like `@scope/pkg@1.0.0` parse correctly.
pub fn parse_new_tags(output: &str, candidates: &[ReleaseCandidate]) -> Vec<PublishedPackage> {
    output
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once("New tag:")?;
            let tag = rest.split_whitespace().next()?;

            if let Some(c) = candidates.iter().find(|c| c.tag == tag) {
                return Some(PublishedPackage {
                    name: c.name.clone(),
                    version: c.version.clone(),
                });
            }

            let (name, version) = tag.rsplit_once('@')?;
            (!name.is_empty() && !version.is_empty()).then(|| PublishedPackage {
                name: name.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

fn shell(script: &str, root: &Utf8Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", script]).current_dir(root.as_std_path());
    cmd
}

fn run(mut cmd: Command, label: &str) -> ToolResult<Output> {
    debug!(command = %label, "running tool");
    let output = cmd.output().map_err(|source| ToolError::Exec {
        command: label.to_string(),
        source,
    })?;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!(target: "changebot::tool", "{line}");
    }
    Ok(output)
}

fn run_checked(cmd: Command, label: &str) -> ToolResult<Output> {
    let output = run(cmd, label)?;
    if !output.status.success() {
        return Err(ToolError::CommandFailed {
            command: label.to_string(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}
