//! GitHub pull requests and releases.
//!
//! Calls the REST API through `gh api` with the action's token in
//! `GH_TOKEN`, so proxy, enterprise host, and retry settings configured for
//! `gh` on the runner apply. Request bodies go through a temporary JSON file
//! passed as `--input`.

use std::io::Write;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::env::{Credentials, RepoSlug};

/// Errors from GitHub API calls.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// `gh` could not be spawned.
    #[error("failed to run gh: {0}")]
    Exec(#[source] std::io::Error),

    /// The request body could not be staged.
    #[error("failed to write request body: {0}")]
    Body(#[source] std::io::Error),

    /// The API returned an error.
    #[error("GitHub API {method} {endpoint} failed: {message}")]
    Api {
        /// HTTP method.
        method: &'static str,
        /// Endpoint path.
        endpoint: String,
        /// Message printed by `gh`.
        message: String,
    },

    /// The response was not the expected JSON.
    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        /// Endpoint path.
        endpoint: String,
        /// JSON error.
        source: serde_json::Error,
    },
}

/// Result alias for GitHub calls.
pub type GitHubResult<T> = Result<T, GitHubError>;

/// A pull request as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// Browser URL.
    #[serde(default)]
    pub html_url: String,
}

/// Fields for creating or updating a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestDraft {
    /// Title.
    pub title: String,
    /// Markdown body.
    pub body: String,
}

/// A release to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRelease {
    /// Git tag, created at `target_commitish` if it does not exist.
    pub tag_name: String,
    /// Display name (same as the tag).
    pub name: String,
    /// Markdown notes.
    pub body: String,
    /// Commit the tag points at.
    pub target_commitish: String,
    /// Mark as a prerelease.
    pub prerelease: bool,
}

/// A created release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Release id.
    pub id: u64,
    /// Browser URL.
    #[serde(default)]
    pub html_url: String,
}

/// Pull request and release operations on the hosting service.
pub trait GitHost {
    /// Find the open pull request from `head` (a branch in this repository) into `base`.
    fn find_open_pull_request(&self, head: &str, base: &str) -> GitHubResult<Option<PullRequest>>;
    /// Open a pull request from `head` into `base`.
    fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        draft: &PullRequestDraft,
    ) -> GitHubResult<PullRequest>;
    /// Replace the title and body of pull request `number`.
    fn update_pull_request(&self, number: u64, draft: &PullRequestDraft) -> GitHubResult<PullRequest>;
    /// Whether a release exists for `tag`.
    fn release_exists(&self, tag: &str) -> GitHubResult<bool>;
    /// Create a release.
    fn create_release(&self, release: &NewRelease) -> GitHubResult<Release>;
}

/// [`GitHost`] backed by `gh api`.
#[derive(Clone)]
pub struct GhCli {
    slug: RepoSlug,
    token: String,
    root: Utf8PathBuf,
}

impl std::fmt::Debug for GhCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhCli")
            .field("slug", &self.slug)
            .field("token", &"<redacted>")
            .field("root", &self.root)
            .finish()
    }
}

impl GhCli {
    /// Talk to `slug` with `credentials`, running `gh` in `root`.
    pub fn new(slug: RepoSlug, credentials: &Credentials, root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            slug,
            token: credentials.token().to_string(),
            root: root.into(),
        }
    }

    fn repo_path(&self, rest: &str) -> String {
        format!("repos/{}/{}/{rest}", self.slug.owner, self.slug.repo)
    }

    fn call<T: DeserializeOwned, B: Serialize>(
        &self,
        method: &'static str,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> GitHubResult<T> {
        let mut cmd = Command::new("gh");
        cmd.args(["api", "-X", method, endpoint])
            .args(["-H", "Accept: application/vnd.github+json"])
            .env("GH_TOKEN", &self.token)
            .env("GH_PROMPT_DISABLED", "1")
            .current_dir(self.root.as_std_path());
        for (key, value) in query {
            cmd.arg("-f").arg(format!("{key}={value}"));
        }

        // The file must outlive the command.
        let staged = body.map(stage_body).transpose()?;
        if let Some(file) = &staged {
            cmd.arg("--input").arg(file.path());
        }

        debug!(method, endpoint, "GitHub API request");
        let output = cmd.output().map_err(GitHubError::Exec)?;
        if !output.status.success() {
            return Err(GitHubError::Api {
                method,
                endpoint: endpoint.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|source| GitHubError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

fn stage_body<B: Serialize>(body: &B) -> GitHubResult<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new().map_err(GitHubError::Body)?;
    let json = serde_json::to_vec(body).map_err(|e| GitHubError::Body(e.into()))?;
    file.write_all(&json).map_err(GitHubError::Body)?;
    file.flush().map_err(GitHubError::Body)?;
    Ok(file)
}

/// Percent-encode a value for use as one URL path segment.
pub fn encode_path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn is_not_found(err: &GitHubError) -> bool {
    matches!(err, GitHubError::Api { message, .. } if message.contains("HTTP 404"))
}

#[derive(Serialize)]
struct CreatePull<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

impl GitHost for GhCli {
    #[instrument(skip(self))]
    fn find_open_pull_request(&self, head: &str, base: &str) -> GitHubResult<Option<PullRequest>> {
        let head = format!("{}:{head}", self.slug.owner);
        let pulls: Vec<PullRequest> = self.call(
            "GET",
            &self.repo_path("pulls"),
            &[("state", "open"), ("head", &head), ("base", base)],
            None::<&()>,
        )?;
        Ok(pulls.into_iter().next())
    }

    #[instrument(skip(self, draft))]
    fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        draft: &PullRequestDraft,
    ) -> GitHubResult<PullRequest> {
        let body = CreatePull {
            title: &draft.title,
            body: &draft.body,
            head,
            base,
        };
        self.call("POST", &self.repo_path("pulls"), &[], Some(&body))
    }

    #[instrument(skip(self, draft))]
    fn update_pull_request(&self, number: u64, draft: &PullRequestDraft) -> GitHubResult<PullRequest> {
        self.call(
            "PATCH",
            &self.repo_path(&format!("pulls/{number}")),
            &[],
            Some(draft),
        )
    }

    #[instrument(skip(self))]
    fn release_exists(&self, tag: &str) -> GitHubResult<bool> {
        let endpoint = self.repo_path(&format!("releases/tags/{}", encode_path_segment(tag)));
        let found: GitHubResult<serde_json::Value> = self.call("GET", &endpoint, &[], None::<&()>);
        match found {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, release), fields(tag = %release.tag_name))]
    fn create_release(&self, release: &NewRelease) -> GitHubResult<Release> {
        self.call("POST", &self.repo_path("releases"), &[], Some(release))
    }
}

/// Resolve the repository from `GITHUB_REPOSITORY`, falling back to the `origin` remote.
pub fn resolve_repo_slug(
    from_env: Option<crate::env::EnvResult<RepoSlug>>,
    root: &Utf8Path,
) -> crate::error::ActionResult<RepoSlug> {
    if let Some(slug) = from_env {
        return Ok(slug?);
    }
    let url = crate::git::remote_url(root, "origin")?;
    url.as_deref()
        .and_then(crate::git::parse_owner_repo)
        .map(|(owner, repo)| RepoSlug { owner, repo })
        .ok_or_else(|| crate::env::EnvError::MissingRepository.into())
}
