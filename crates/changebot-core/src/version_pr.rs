//! The version pull request handler.
//!
//! Applies pending changesets on a dedicated branch, force-pushes it, and
//! opens a pull request into the base branch, or updates the one already
//! open so repeated runs converge on a single pull request.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::changelog::{self, MAX_BODY_CHARS};
use crate::changeset::ChangesetState;
use crate::error::ActionResult;
use crate::git::GitWorkspace;
use crate::github::{GitHost, PullRequest, PullRequestDraft};
use crate::packages::PackageChange;
use crate::tools::VersionTool;

/// Settings for one version pull request run.
#[derive(Debug, Clone)]
pub struct VersionPrRequest<'a> {
    /// Branch the pull request targets.
    pub base_branch: &'a str,
    /// Commit the version branch is reset to.
    pub sha: &'a str,
    /// Prefix of the version branch name.
    pub branch_prefix: &'a str,
    /// Pull request title before any pre-release suffix.
    pub title: &'a str,
    /// Commit message before any pre-release suffix.
    pub commit_message: &'a str,
}

impl VersionPrRequest<'_> {
    /// `<prefix>/<base>`.
    pub fn version_branch(&self) -> String {
        format!("{}/{}", self.branch_prefix, self.base_branch)
    }
}

/// What the handler did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionPrOutcome {
    /// The version branch.
    pub branch: String,
    /// The created or updated pull request.
    pub pull_request: PullRequest,
    /// `true` when an open pull request was updated rather than created.
    pub updated: bool,
    /// Whether a new commit was pushed.
    pub committed: bool,
    /// Packages whose version changed.
    pub changed: Vec<PackageChange>,
}

/// Append ` (<tag>)` in pre-release mode.
pub fn with_pre_suffix(text: &str, pre_tag: Option<&str>) -> String {
    match pre_tag {
        Some(tag) => format!("{text} ({tag})"),
        None => text.to_string(),
    }
}

/// Version packages on the release branch and open or update its pull request.
#[instrument(skip_all, fields(base = request.base_branch))]
pub fn run_version_pr(
    request: &VersionPrRequest<'_>,
    state: &ChangesetState,
    git: &dyn GitWorkspace,
    tool: &dyn VersionTool,
    host: &dyn GitHost,
) -> ActionResult<VersionPrOutcome> {
    let branch = request.version_branch();
    git.switch_to_maybe_existing_branch(&branch)?;
    git.reset_hard(request.sha)?;
    debug!(%branch, sha = request.sha, "version branch reset");

    let changed = tool.bump(state)?;

    let pre_tag = state.pre_tag();
    let notes = changelog::collect_release_notes(&changed)?;
    let draft = PullRequestDraft {
        title: with_pre_suffix(request.title, pre_tag),
        body: changelog::version_pr_body(request.base_branch, pre_tag, &notes, MAX_BODY_CHARS),
    };
    let commit_message = with_pre_suffix(request.commit_message, pre_tag);

    let committed = !git.is_clean()?;
    if committed {
        git.commit_all(&commit_message)?;
    } else {
        debug!("nothing to commit after versioning");
    }
    git.push_force(&branch)?;

    let (pull_request, updated) =
        match host.find_open_pull_request(&branch, request.base_branch)? {
            Some(existing) => {
                let pr = host.update_pull_request(existing.number, &draft)?;
                info!(number = pr.number, "updated version pull request");
                (pr, true)
            }
            None => {
                let pr = host.create_pull_request(&branch, request.base_branch, &draft)?;
                info!(number = pr.number, "created version pull request");
                (pr, false)
            }
        };

    Ok(VersionPrOutcome {
        branch,
        pull_request,
        updated,
        committed,
        changed,
    })
}
