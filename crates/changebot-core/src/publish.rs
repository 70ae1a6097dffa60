//! The publish handler.
//!
//! Two publishers share one handler. With a `publish` script, the script
//! publishes and its `New tag:` lines say what happened; GitHub releases are
//! then created for those packages. Without one, [`GitHubReleasePublisher`]
//! creates a release for every candidate whose tag has none yet.

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::changelog;
use crate::error::ActionResult;
use crate::github::{GitHost, NewRelease};
use crate::packages::ReleaseCandidate;
use crate::tools::{PublishReport, PublishTool, PublishedPackage, ToolError, ToolResult};

/// Settings for one publish run.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    /// Commit new release tags point at.
    pub sha: &'a str,
    /// Create GitHub releases for what the publisher reports.
    ///
    /// Only meaningful for script publishers; [`GitHubReleasePublisher`]
    /// creates its releases itself.
    pub create_releases_for_published: bool,
}

/// What the handler did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    /// Publisher report.
    pub report: PublishReport,
    /// Tags of releases created after a script publish.
    pub releases: Vec<String>,
    /// Tags whose release could not be created after a script publish.
    pub release_failures: Vec<String>,
}

impl PublishOutcome {
    /// Whether anything was newly published.
    pub fn published(&self) -> bool {
        self.report.any_published()
    }
}

/// Run `publisher` over `candidates`, then create releases if requested.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn run_publish(
    request: PublishRequest<'_>,
    candidates: &[ReleaseCandidate],
    publisher: &dyn PublishTool,
    host: &dyn GitHost,
) -> ActionResult<PublishOutcome> {
    let report = publisher.publish(candidates)?;
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "some packages were not published");
    }

    let mut outcome = PublishOutcome::default();
    if request.create_releases_for_published {
        for package in &report.published {
            let release = release_for_published(package, candidates, request.sha);
            create_missing_release(host, release, &mut outcome);
        }
    }
    if !outcome.release_failures.is_empty() {
        warn!(failed = ?outcome.release_failures, "packages published without a GitHub release");
    }

    info!(published = report.published.len(), "publish finished");
    outcome.report = report;
    Ok(outcome)
}

// Release problems never fail a run whose packages are already published.
fn create_missing_release(host: &dyn GitHost, release: NewRelease, outcome: &mut PublishOutcome) {
    let tag = release.tag_name.clone();
    match host.release_exists(&tag) {
        Ok(true) => {
            debug!(%tag, "release exists, skipping");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            warn!(%tag, error = %e, "could not check for an existing release");
            outcome.release_failures.push(tag);
            return;
        }
    }
    match host.create_release(&release) {
        Ok(_) => {
            info!(%tag, "created release");
            outcome.releases.push(tag);
        }
        Err(e) => {
            warn!(%tag, error = %e, "failed to create release");
            outcome.release_failures.push(tag);
        }
    }
}

fn release_for_published(
    package: &PublishedPackage,
    candidates: &[ReleaseCandidate],
    sha: &str,
) -> NewRelease {
    let candidate = candidates
        .iter()
        .find(|c| c.name == package.name && c.version == package.version);
    let tag = candidate.map_or_else(
        || format!("{}@{}", package.name, package.version),
        |c| c.tag.clone(),
    );
    let body = candidate.map_or_else(String::new, |c| release_body(&c.dir, &c.version));
    let prerelease =
        semver::Version::parse(&package.version).is_ok_and(|v| !v.pre.is_empty());

    NewRelease {
        name: tag.clone(),
        tag_name: tag,
        body,
        target_commitish: sha.to_string(),
        prerelease,
    }
}

fn release_body(dir: &Utf8Path, version: &str) -> String {
    match changelog::read_entry(dir, version) {
        Ok(Some(entry)) => entry.content,
        Ok(None) => String::new(),
        Err(e) => {
            warn!(error = %e, "release notes unavailable");
            String::new()
        }
    }
}

/// [`PublishTool`] that turns each unreleased candidate into a GitHub release.
pub struct GitHubReleasePublisher<'a> {
    host: &'a dyn GitHost,
    sha: String,
}

impl<'a> GitHubReleasePublisher<'a> {
    /// Create releases through `host`, tagging `sha`.
    pub fn new(host: &'a dyn GitHost, sha: impl Into<String>) -> Self {
        Self {
            host,
            sha: sha.into(),
        }
    }
}

impl PublishTool for GitHubReleasePublisher<'_> {
    fn publish(&self, candidates: &[ReleaseCandidate]) -> ToolResult<PublishReport> {
        let mut report = PublishReport::default();
        let mut attempted = 0usize;

        for candidate in candidates {
            if self.host.release_exists(&candidate.tag)? {
                debug!(tag = %candidate.tag, "release exists, skipping");
                continue;
            }
            attempted += 1;

            let release = NewRelease {
                tag_name: candidate.tag.clone(),
                name: candidate.tag.clone(),
                body: release_body(&candidate.dir, &candidate.version),
                target_commitish: self.sha.clone(),
                prerelease: candidate.is_prerelease(),
            };
            match self.host.create_release(&release) {
                Ok(_) => {
                    info!(tag = %candidate.tag, "created release");
                    report.published.push(PublishedPackage {
                        name: candidate.name.clone(),
                        version: candidate.version.clone(),
                    });
                }
                Err(e) => {
                    warn!(tag = %candidate.tag, error = %e, "failed to create release");
                    report.failed.push(candidate.tag.clone());
                }
            }
        }

        if attempted > 0 && report.published.is_empty() {
            return Err(ToolError::AllReleasesFailed(report.failed));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, FakePublisher};
    use camino::Utf8PathBuf;

    fn candidate(name: &str, version: &str) -> ReleaseCandidate {
        ReleaseCandidate {
            name: name.into(),
            version: version.into(),
            dir: Utf8PathBuf::from(format!("/nonexistent/{name}")),
            tag: format!("{name}@{version}"),
        }
    }

    fn three() -> Vec<ReleaseCandidate> {
        vec![
            candidate("a", "1.0.0"),
            candidate("b", "2.0.0-next.1"),
            candidate("c", "3.0.0"),
        ]
    }

    const RELEASES: PublishRequest<'static> = PublishRequest {
        sha: "abc123",
        create_releases_for_published: false,
    };

    #[test]
    fn release_publisher_skips_existing_tags() {
        let host = FakeHost::with_existing_tags(&["a@1.0.0"]);
        let publisher = GitHubReleasePublisher::new(&host, "abc123");

        let outcome = run_publish(RELEASES, &three(), &publisher, &host).unwrap();
        let names: Vec<&str> = outcome
            .report
            .published
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(host.release_tags(), ["b@2.0.0-next.1", "c@3.0.0"]);

        let releases = host.releases.borrow();
        assert!(releases[0].prerelease);
        assert!(!releases[1].prerelease);
        assert_eq!(releases[0].target_commitish, "abc123");
    }

    #[test]
    fn two_of_three_published_is_partial_success() {
        let host = FakeHost::default().failing_on(&["b@2.0.0-next.1"]);
        let publisher = GitHubReleasePublisher::new(&host, "abc123");

        let outcome = run_publish(RELEASES, &three(), &publisher, &host).unwrap();
        assert!(outcome.published());
        assert_eq!(outcome.report.published.len(), 2);
        assert_eq!(outcome.report.failed, ["b@2.0.0-next.1"]);
    }

    #[test]
    fn all_failures_is_an_error() {
        let host = FakeHost::default().failing_on(&["a@1.0.0", "b@2.0.0-next.1", "c@3.0.0"]);
        let publisher = GitHubReleasePublisher::new(&host, "abc123");
        assert!(run_publish(RELEASES, &three(), &publisher, &host).is_err());
    }

    #[test]
    fn nothing_to_release_is_not_published() {
        let host = FakeHost::with_existing_tags(&["a@1.0.0", "b@2.0.0-next.1", "c@3.0.0"]);
        let publisher = GitHubReleasePublisher::new(&host, "abc123");
        let outcome = run_publish(RELEASES, &three(), &publisher, &host).unwrap();
        assert!(!outcome.published());
    }

    #[test]
    fn script_publish_creates_releases_when_asked() {
        let host = FakeHost::default();
        let publisher = FakePublisher::publishing(&["a", "c"]);
        let request = PublishRequest {
            sha: "abc123",
            create_releases_for_published: true,
        };

        let outcome = run_publish(request, &three(), &publisher, &host).unwrap();
        assert_eq!(outcome.releases, ["a@1.0.0", "c@3.0.0"]);
        assert_eq!(host.release_tags(), ["a@1.0.0", "c@3.0.0"]);
    }

    #[test]
    fn release_failure_after_script_publish_keeps_published_packages() {
        let host = FakeHost::default().failing_on(&["c@3.0.0"]);
        let publisher = FakePublisher::publishing(&["a", "c"]);
        let request = PublishRequest {
            sha: "abc123",
            create_releases_for_published: true,
        };

        let outcome = run_publish(request, &three(), &publisher, &host).unwrap();
        assert!(outcome.published());
        assert_eq!(outcome.report.published.len(), 2);
        assert_eq!(outcome.releases, ["a@1.0.0"]);
        assert_eq!(outcome.release_failures, ["c@3.0.0"]);
    }

    #[test]
    fn script_publish_skips_tags_that_already_have_releases() {
        let host = FakeHost::with_existing_tags(&["a@1.0.0"]);
        let publisher = FakePublisher::publishing(&["a", "c"]);
        let request = PublishRequest {
            sha: "abc123",
            create_releases_for_published: true,
        };

        let outcome = run_publish(request, &three(), &publisher, &host).unwrap();
        assert_eq!(outcome.releases, ["c@3.0.0"]);
        assert!(outcome.release_failures.is_empty());
        assert_eq!(host.release_tags(), ["c@3.0.0"]);
    }

    #[test]
    fn script_publish_without_releases() {
        let host = FakeHost::default();
        let publisher = FakePublisher::publishing(&["a"]);
        let outcome = run_publish(RELEASES, &three(), &publisher, &host).unwrap();
        assert_eq!(publisher.calls.get(), 1);
        assert!(outcome.releases.is_empty());
        assert!(host.release_tags().is_empty());
    }

    #[test]
    fn release_body_comes_from_changelog() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        std::fs::write(
            dir.join("CHANGELOG.md"),
            "# a\n\n## 1.0.0\n\n### Major Changes\n\n- first\n",
        )
        .unwrap();
        let mut c = candidate("a", "1.0.0");
        c.dir = dir;

        let release = release_for_published(
            &PublishedPackage {
                name: "a".into(),
                version: "1.0.0".into(),
            },
            &[c],
            "abc123",
        );
        assert_eq!(release.body, "### Major Changes\n\n- first");
        assert_eq!(release.tag_name, "a@1.0.0");
    }
}
