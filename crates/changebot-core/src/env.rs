//! Process environment captured once at startup.
//!
//! Nothing below this module reads `std::env` directly. The CLI builds a
//! [`RunEnvironment`] from the real environment and the core receives it by
//! value, which keeps every stage testable with a fixed lookup table.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Event name GitHub uses for manually triggered workflows.
pub const MANUAL_DISPATCH_EVENT: &str = "workflow_dispatch";

/// Errors from environment validation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    /// `GITHUB_TOKEN` is unset or empty.
    #[error("GITHUB_TOKEN is not set; pass `env: GITHUB_TOKEN: ${{{{ secrets.GITHUB_TOKEN }}}}` to the step")]
    MissingToken,

    /// `HOME` is unset, so the credential file has nowhere to go.
    #[error("HOME is not set; cannot locate the per-user credential file")]
    MissingHome,

    /// The repository slug could not be determined.
    #[error("cannot determine the repository; set GITHUB_REPOSITORY to `owner/repo`")]
    MissingRepository,

    /// `GITHUB_REPOSITORY` is not of the form `owner/repo`.
    #[error("GITHUB_REPOSITORY must look like `owner/repo`, got `{0}`")]
    InvalidRepository(String),

    /// The base branch could not be determined.
    #[error("cannot determine the current branch; set GITHUB_REF_NAME")]
    MissingBranch,
}

/// Result alias for environment lookups.
pub type EnvResult<T> = Result<T, EnvError>;

/// The credential validated by the first stage of a run.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// The GitHub token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***")
            .finish()
    }
}

/// The trigger that started this run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerContext {
    /// `GITHUB_EVENT_NAME`, empty when unknown.
    pub event_name: String,
}

impl TriggerContext {
    /// Whether a user started the workflow by hand.
    pub fn is_manual_dispatch(&self) -> bool {
        self.event_name == MANUAL_DISPATCH_EVENT
    }
}

/// `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepoSlug {
    /// Parse `owner/repo`.
    pub fn parse(value: &str) -> EnvResult<Self> {
        match value.trim().split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(EnvError::InvalidRepository(value.to_string())),
        }
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Snapshot of every environment variable a run consults.
#[derive(Clone, Default)]
pub struct RunEnvironment {
    github_token: Option<String>,
    /// `HOME`.
    pub home: Option<Utf8PathBuf>,
    /// Trigger context from `GITHUB_EVENT_NAME`.
    pub trigger: TriggerContext,
    /// `GITHUB_REPOSITORY`.
    pub repository: Option<String>,
    /// `GITHUB_REF_NAME`, or `GITHUB_REF` without `refs/heads/`.
    pub ref_name: Option<String>,
    /// `GITHUB_SHA`.
    pub sha: Option<String>,
    /// `GITHUB_OUTPUT` file path.
    pub output_path: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for RunEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEnvironment")
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .field("home", &self.home)
            .field("trigger", &self.trigger)
            .field("repository", &self.repository)
            .field("ref_name", &self.ref_name)
            .field("sha", &self.sha)
            .field("output_path", &self.output_path)
            .finish()
    }
}

impl RunEnvironment {
    /// Capture the real process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup function. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ref_name = get("GITHUB_REF_NAME").or_else(|| {
            get("GITHUB_REF").map(|r| {
                r.strip_prefix("refs/heads/")
                    .map(str::to_string)
                    .unwrap_or(r)
            })
        });

        Self {
            github_token: get("GITHUB_TOKEN"),
            home: get("HOME").map(Utf8PathBuf::from),
            trigger: TriggerContext {
                event_name: get("GITHUB_EVENT_NAME").unwrap_or_default(),
            },
            repository: get("GITHUB_REPOSITORY"),
            ref_name,
            sha: get("GITHUB_SHA"),
            output_path: get("GITHUB_OUTPUT").map(Utf8PathBuf::from),
        }
    }

    /// Validate that the required credential is present.
    pub fn credentials(&self) -> EnvResult<Credentials> {
        self.github_token
            .clone()
            .map(|token| Credentials { token })
            .ok_or(EnvError::MissingToken)
    }

    /// Repository slug from `GITHUB_REPOSITORY`, if set.
    pub fn repo_slug(&self) -> Option<EnvResult<RepoSlug>> {
        self.repository.as_deref().map(RepoSlug::parse)
    }
}
