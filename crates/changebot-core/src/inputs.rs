//! Action inputs.
//!
//! GitHub passes `with:` values as `INPUT_<NAME>` environment variables; the
//! CLI maps each one onto a flag. Values arrive here as raw optional strings
//! and are normalized once: empty strings become `None`, and booleans follow
//! the YAML 1.2 core schema the runner itself uses.

use thiserror::Error;

use crate::config::Config;

/// Errors from input parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputError {
    /// A boolean input had a value outside the YAML 1.2 core schema.
    #[error(
        "input `{name}` does not meet the YAML 1.2 \"Core Schema\": `{value}` \
         (support boolean input list: true | True | TRUE | false | False | FALSE)"
    )]
    InvalidBoolean {
        /// Input name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Result alias for input parsing.
pub type InputResult<T> = Result<T, InputError>;

/// Raw input values as received from flags or `INPUT_*` variables.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    /// `setupGitUser`.
    pub setup_git_user: Option<String>,
    /// `version`.
    pub version: Option<String>,
    /// `title`.
    pub title: Option<String>,
    /// `commit`.
    pub commit: Option<String>,
    /// `publish`.
    pub publish: Option<String>,
    /// `createGithubReleases`.
    pub create_github_releases: Option<String>,
}

/// Parsed and defaulted action inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInputs {
    /// Configure the committer identity and credential file.
    pub setup_git_user: bool,
    /// Script that replaces `changeset version`.
    pub version_script: Option<String>,
    /// Version pull request title.
    pub pr_title: String,
    /// Version commit message.
    pub commit_message: String,
    /// Script that publishes packages; selects the publish-script variant.
    pub publish_script: Option<String>,
    /// Create a GitHub release for each package the publish script reports.
    pub create_github_releases: bool,
}

impl ActionInputs {
    /// Parse raw inputs, falling back to config values and built-in defaults.
    pub fn parse(raw: RawInputs, config: &Config) -> InputResult<Self> {
        Ok(Self {
            setup_git_user: parse_boolean("setupGitUser", raw.setup_git_user, true)?,
            version_script: optional(raw.version),
            pr_title: optional(raw.title).unwrap_or_else(|| config.pr_title().to_string()),
            commit_message: optional(raw.commit)
                .unwrap_or_else(|| config.commit_message().to_string()),
            publish_script: optional(raw.publish),
            create_github_releases: parse_boolean(
                "createGithubReleases",
                raw.create_github_releases,
                true,
            )?,
        })
    }

    /// Whether a publish script was configured.
    pub const fn has_publish_script(&self) -> bool {
        self.publish_script.is_some()
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a boolean input; an absent or empty value yields `default`.
pub fn parse_boolean(
    name: &'static str,
    value: Option<String>,
    default: bool,
) -> InputResult<bool> {
    let Some(value) = optional(value) else {
        return Ok(default);
    };
    match value.trim() {
        "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        _ => Err(InputError::InvalidBoolean { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PullRequestConfig;

    #[test]
    fn defaults_when_nothing_given() {
        let inputs = ActionInputs::parse(RawInputs::default(), &Config::default()).unwrap();
        assert!(inputs.setup_git_user);
        assert!(inputs.create_github_releases);
        assert_eq!(inputs.pr_title, "Version Packages");
        assert_eq!(inputs.commit_message, "Version Packages");
        assert!(inputs.version_script.is_none());
        assert!(!inputs.has_publish_script());
    }

    #[test]
    fn empty_strings_are_absent() {
        let raw = RawInputs {
            version: Some(String::new()),
            title: Some("   ".into()),
            publish: Some(String::new()),
            setup_git_user: Some(String::new()),
            ..RawInputs::default()
        };
        let inputs = ActionInputs::parse(raw, &Config::default()).unwrap();
        assert!(inputs.version_script.is_none());
        assert!(inputs.publish_script.is_none());
        assert_eq!(inputs.pr_title, "Version Packages");
        assert!(inputs.setup_git_user);
    }

    #[test]
    fn inputs_override_config() {
        let config = Config {
            pull_request: Some(PullRequestConfig {
                title: Some("From config".into()),
                commit: Some("config commit".into()),
            }),
            ..Config::default()
        };
        let raw = RawInputs {
            title: Some("From input".into()),
            ..RawInputs::default()
        };
        let inputs = ActionInputs::parse(raw, &config).unwrap();
        assert_eq!(inputs.pr_title, "From input");
        assert_eq!(inputs.commit_message, "config commit");
    }

    #[test]
    fn strict_boolean_parsing() {
        for v in ["true", "True", "TRUE"] {
            assert_eq!(parse_boolean("x", Some(v.into()), false), Ok(true));
        }
        for v in ["false", "False", "FALSE"] {
            assert_eq!(parse_boolean("x", Some(v.into()), true), Ok(false));
        }
        for v in ["yes", "1", "tRuE", "on"] {
            assert!(parse_boolean("x", Some(v.into()), true).is_err(), "{v}");
        }
    }

    #[test]
    fn invalid_boolean_names_the_input() {
        let raw = RawInputs {
            setup_git_user: Some("yes".into()),
            ..RawInputs::default()
        };
        let err = ActionInputs::parse(raw, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("setupGitUser"));
    }
}
