//! Action outputs.
//!
//! Outputs are appended to the file named by `GITHUB_OUTPUT`. Later lines
//! for the same key win, which lets the defaults be written early and
//! overwritten once a publish reports.

use std::fs::OpenOptions;
use std::io::Write;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

use crate::tools::PublishedPackage;

/// Errors from writing outputs.
#[derive(Error, Debug)]
pub enum OutputError {
    /// The output file could not be opened or written.
    #[error("failed to write output `{key}` to {path}: {source}")]
    Write {
        /// Output key.
        key: String,
        /// Output file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An output value could not be serialized.
    #[error("failed to serialize output `{key}`: {source}")]
    Serialize {
        /// Output key.
        key: &'static str,
        /// JSON error.
        source: serde_json::Error,
    },
}

/// Result alias for output writes.
pub type OutputResult<T> = Result<T, OutputError>;

/// Output names.
pub mod keys {
    /// `true` when at least one package was newly published.
    pub const PUBLISHED: &str = "published";
    /// JSON array of `{name, version}`.
    pub const PUBLISHED_PACKAGES: &str = "publishedPackages";
    /// `true` when pending changesets exist.
    pub const HAS_CHANGESETS: &str = "hasChangesets";
    /// Number of the version pull request.
    pub const PULL_REQUEST_NUMBER: &str = "pullRequestNumber";
}

/// Destination for action outputs.
pub trait OutputSink {
    /// Set `key` to `value`.
    fn set(&self, key: &str, value: &str) -> OutputResult<()>;
}

/// [`OutputSink`] writing to the `GITHUB_OUTPUT` file, or the log when unset.
#[derive(Debug, Clone, Default)]
pub struct GithubOutput {
    path: Option<Utf8PathBuf>,
}

impl GithubOutput {
    /// Append to `path`; `None` only logs.
    pub fn new(path: Option<Utf8PathBuf>) -> Self {
        Self { path }
    }
}

impl OutputSink for GithubOutput {
    fn set(&self, key: &str, value: &str) -> OutputResult<()> {
        let Some(path) = &self.path else {
            info!(key, value, "output (GITHUB_OUTPUT unset)");
            return Ok(());
        };

        let write_err = |source: std::io::Error| OutputError::Write {
            key: key.to_string(),
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(write_err)?;
        file.write_all(format_entry(key, value).as_bytes())
            .map_err(write_err)?;
        Ok(())
    }
}

/// Render one entry, using the heredoc form for multi-line values.
pub fn format_entry(key: &str, value: &str) -> String {
    if !value.contains('\n') {
        return format!("{key}={value}\n");
    }
    let mut delimiter = String::from("ghadelimiter");
    while value.contains(&delimiter) {
        delimiter.push('_');
    }
    format!("{key}<<{delimiter}\n{value}\n{delimiter}\n")
}

/// The three outputs every run past state reading sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutputs {
    /// A package was newly published.
    pub published: bool,
    /// Newly published packages.
    pub published_packages: Vec<PublishedPackage>,
    /// Pending changesets exist.
    pub has_changesets: bool,
}

impl ActionOutputs {
    /// Defaults for a run with or without pending changesets.
    pub fn defaults(has_changesets: bool) -> Self {
        Self {
            has_changesets,
            ..Self::default()
        }
    }

    /// Write every output to `sink`.
    pub fn write(&self, sink: &dyn OutputSink) -> OutputResult<()> {
        self.write_published(sink)?;
        sink.set(keys::HAS_CHANGESETS, bool_str(self.has_changesets))
    }

    /// Write `published` and `publishedPackages` only.
    pub fn write_published(&self, sink: &dyn OutputSink) -> OutputResult<()> {
        let packages = serde_json::to_string(&self.published_packages).map_err(|source| {
            OutputError::Serialize {
                key: keys::PUBLISHED_PACKAGES,
                source,
            }
        })?;
        sink.set(keys::PUBLISHED, bool_str(self.published))?;
        sink.set(keys::PUBLISHED_PACKAGES, &packages)
    }
}

const fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<(String, String)>>);

    impl OutputSink for Recorder {
        fn set(&self, key: &str, value: &str) -> OutputResult<()> {
            self.0.borrow_mut().push((key.into(), value.into()));
            Ok(())
        }
    }

    #[test]
    fn defaults_are_false_and_empty() {
        let sink = Recorder::default();
        ActionOutputs::defaults(true).write(&sink).unwrap();
        assert_eq!(
            sink.0.into_inner(),
            vec![
                ("published".to_string(), "false".to_string()),
                ("publishedPackages".to_string(), "[]".to_string()),
                ("hasChangesets".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn published_packages_are_json() {
        let sink = Recorder::default();
        let outputs = ActionOutputs {
            published: true,
            published_packages: vec![PublishedPackage {
                name: "@scope/a".into(),
                version: "1.0.0".into(),
            }],
            has_changesets: false,
        };
        outputs.write_published(&sink).unwrap();
        let recorded = sink.0.into_inner();
        assert_eq!(recorded[0].1, "true");
        assert_eq!(recorded[1].1, r#"[{"name":"@scope/a","version":"1.0.0"}]"#);
    }

    #[test]
    fn github_output_appends() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("output")).unwrap();
        let sink = GithubOutput::new(Some(path.clone()));
        sink.set("a", "1").unwrap();
        sink.set("a", "2").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a=1\na=2\n");
    }

    #[test]
    fn unset_output_only_logs() {
        GithubOutput::new(None).set("a", "1").unwrap();
    }

    #[test]
    fn multiline_values_use_heredoc() {
        assert_eq!(
            format_entry("body", "one\ntwo"),
            "body<<ghadelimiter\none\ntwo\nghadelimiter\n"
        );
        assert_eq!(
            format_entry("x", "ghadelimiter\n"),
            "x<<ghadelimiter_\nghadelimiter\n\nghadelimiter_\n"
        );
    }
}
