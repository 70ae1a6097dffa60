//! Error types for changebot-core

use thiserror::Error;

/// Errors that can occur when working with configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Every way a run can fail.
///
/// The first three variants are configuration problems and are raised before
/// any output is written. The rest abort the run after outputs may already
/// hold their defaults.
#[derive(Error, Debug)]
pub enum ActionError {
    /// Configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Required environment is missing.
    #[error(transparent)]
    Env(#[from] crate::env::EnvError),

    /// An action input could not be parsed.
    #[error(transparent)]
    Input(#[from] crate::inputs::InputError),

    /// Committer identity or credential setup failed.
    #[error(transparent)]
    Identity(#[from] crate::identity::IdentityError),

    /// The changeset directory could not be read.
    #[error(transparent)]
    StateRead(#[from] crate::changeset::StateReadError),

    /// Package manifests could not be read.
    #[error(transparent)]
    Packages(#[from] crate::packages::PackagesError),

    /// A changelog could not be read.
    #[error(transparent)]
    Changelog(#[from] crate::changelog::ChangelogError),

    /// The version or publish tool failed.
    #[error(transparent)]
    Tool(#[from] crate::tools::ToolError),

    /// A git command failed.
    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    /// A GitHub API call failed.
    #[error(transparent)]
    GitHub(#[from] crate::github::GitHubError),

    /// Writing an action output failed.
    #[error(transparent)]
    Output(#[from] crate::outputs::OutputError),
}

impl ActionError {
    /// Whether this error is a configuration problem (no outputs are set).
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Env(_) | Self::Input(_))
    }
}

/// Result alias for a whole run.
pub type ActionResult<T> = Result<T, ActionError>;
