//! Git operations for the version branch.
//!
//! Shells out to `git` for all operations so the runner's checkout, auth
//! helpers, and `~/.netrc` apply unchanged. Every command runs in an
//! explicit repository root rather than the process working directory.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "push").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Working-copy operations the version handler needs.
pub trait GitWorkspace {
    /// Check out `branch`, creating it from `HEAD` if it does not exist.
    fn switch_to_maybe_existing_branch(&self, branch: &str) -> GitResult<()>;
    /// Hard-reset the working copy to `rev`.
    fn reset_hard(&self, rev: &str) -> GitResult<()>;
    /// Whether the working tree has no changes.
    fn is_clean(&self) -> GitResult<bool>;
    /// Stage everything and commit.
    fn commit_all(&self, message: &str) -> GitResult<()>;
    /// Force-push `HEAD` to `branch` on `origin`.
    fn push_force(&self, branch: &str) -> GitResult<()>;
}

/// [`GitWorkspace`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    root: Utf8PathBuf,
}

impl SystemGit {
    /// Operate on the repository at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl GitWorkspace for SystemGit {
    #[instrument(skip(self))]
    fn switch_to_maybe_existing_branch(&self, branch: &str) -> GitResult<()> {
        match git(&self.root, &["checkout", branch]) {
            Ok(_) => {
                debug!(%branch, "checked out existing branch");
                Ok(())
            }
            Err(GitError::Command { stderr, .. }) if stderr.contains("did not match any") => {
                git(&self.root, &["checkout", "-b", branch])?;
                debug!(%branch, "created branch");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    fn reset_hard(&self, rev: &str) -> GitResult<()> {
        git(&self.root, &["reset", "--hard", rev])?;
        Ok(())
    }

    fn is_clean(&self) -> GitResult<bool> {
        is_clean(&self.root)
    }

    #[instrument(skip(self))]
    fn commit_all(&self, message: &str) -> GitResult<()> {
        git(&self.root, &["add", "."])?;
        git(&self.root, &["commit", "-m", message])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn push_force(&self, branch: &str) -> GitResult<()> {
        let refspec = format!("HEAD:{branch}");
        git(&self.root, &["push", "origin", &refspec, "--force"])?;
        Ok(())
    }
}

/// Set a repository-local config value.
#[instrument]
pub fn set_config(root: &Utf8Path, key: &str, value: &str) -> GitResult<()> {
    git(root, &["config", key, value])?;
    Ok(())
}

/// Check whether the working tree is clean (no uncommitted changes).
#[instrument]
pub fn is_clean(root: &Utf8Path) -> GitResult<bool> {
    let output = git(root, &["status", "--porcelain"])?;
    let clean = output.trim().is_empty();
    debug!(clean, "working tree status");
    Ok(clean)
}

/// Get the current branch name.
///
/// Returns `None` if in a detached HEAD state.
#[instrument]
pub fn current_branch(root: &Utf8Path) -> GitResult<Option<String>> {
    let output = git(root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = output.trim().to_string();
    if branch == "HEAD" {
        debug!("detached HEAD");
        Ok(None)
    } else {
        Ok(Some(branch))
    }
}

/// Full hash of `HEAD`.
#[instrument]
pub fn head_sha(root: &Utf8Path) -> GitResult<String> {
    Ok(git(root, &["rev-parse", "HEAD"])?.trim().to_string())
}

/// Get the URL of a named remote.
#[instrument]
pub fn remote_url(root: &Utf8Path, remote: &str) -> GitResult<Option<String>> {
    match git(root, &["remote", "get-url", remote]) {
        Ok(url) => Ok(Some(url.trim().to_string())),
        Err(GitError::Command { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parse owner and repo from a git remote URL.
///
/// Handles both HTTPS and SSH formats:
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let path = url.strip_prefix("git@").map_or_else(
        || {
            url.split("//")
                .nth(1)
                .and_then(|after_scheme| after_scheme.split_once('/').map(|(_, path)| path))
        },
        |rest| rest.split_once(':').map(|(_, path)| path),
    )?;

    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;

    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

/// Run a git command in `root` and return its stdout.
fn git(root: &Utf8Path, args: &[&str]) -> GitResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root.as_std_path())
        .output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepo);
        }

        Err(GitError::Command {
            command: args.first().unwrap_or(&"").to_string(),
            stderr,
        })
    }
}
