//! In-memory doubles for the git, tool, host, and output seams.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use camino::Utf8PathBuf;

use crate::changeset::ChangesetState;
use crate::git::{GitResult, GitWorkspace};
use crate::github::{
    GitHost, GitHubError, GitHubResult, NewRelease, PullRequest, PullRequestDraft, Release,
};
use crate::outputs::{OutputResult, OutputSink};
use crate::packages::{PackageChange, ReleaseCandidate};
use crate::tools::{PublishReport, PublishTool, PublishedPackage, ToolError, ToolResult, VersionTool};

/// Records every working-copy call as a short label.
#[derive(Default)]
pub(crate) struct FakeGit {
    calls: RefCell<Vec<String>>,
    dirty: bool,
}

impl FakeGit {
    pub(crate) fn dirty() -> Self {
        Self {
            dirty: true,
            ..Self::default()
        }
    }

    pub(crate) fn clean() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, label: String) -> GitResult<()> {
        self.calls.borrow_mut().push(label);
        Ok(())
    }
}

impl GitWorkspace for FakeGit {
    fn switch_to_maybe_existing_branch(&self, branch: &str) -> GitResult<()> {
        self.record(format!("switch {branch}"))
    }

    fn reset_hard(&self, rev: &str) -> GitResult<()> {
        self.record(format!("reset {rev}"))
    }

    fn is_clean(&self) -> GitResult<bool> {
        Ok(!self.dirty)
    }

    fn commit_all(&self, message: &str) -> GitResult<()> {
        self.record(format!("commit {message}"))
    }

    fn push_force(&self, branch: &str) -> GitResult<()> {
        self.record(format!("push {branch}"))
    }
}

/// Version tool returning a fixed change list.
#[derive(Default)]
pub(crate) struct FakeVersionTool {
    pub(crate) calls: Cell<usize>,
    changes: Vec<PackageChange>,
    fail: bool,
}

impl FakeVersionTool {
    pub(crate) fn changing(changes: &[(&str, &str)]) -> Self {
        Self {
            changes: changes
                .iter()
                .map(|(name, version)| PackageChange {
                    name: (*name).into(),
                    version: (*version).into(),
                    dir: Utf8PathBuf::from(format!("/nonexistent/{name}")),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl VersionTool for FakeVersionTool {
    fn bump(&self, _state: &ChangesetState) -> ToolResult<Vec<PackageChange>> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(ToolError::CommandFailed {
                command: "changeset version".into(),
                exit_code: Some(1),
                stderr: "boom".into(),
            });
        }
        Ok(self.changes.clone())
    }
}

/// Publisher that reports the named candidates as published.
#[derive(Default)]
pub(crate) struct FakePublisher {
    pub(crate) calls: Cell<usize>,
    publish: Vec<String>,
}

impl FakePublisher {
    pub(crate) fn publishing(names: &[&str]) -> Self {
        Self {
            publish: names.iter().map(|n| (*n).to_string()).collect(),
            ..Self::default()
        }
    }
}

impl PublishTool for FakePublisher {
    fn publish(&self, candidates: &[ReleaseCandidate]) -> ToolResult<PublishReport> {
        self.calls.set(self.calls.get() + 1);
        let (published, failed): (Vec<_>, Vec<_>) = candidates
            .iter()
            .partition(|c| self.publish.contains(&c.name));
        Ok(PublishReport {
            published: published
                .into_iter()
                .map(|c| PublishedPackage {
                    name: c.name.clone(),
                    version: c.version.clone(),
                })
                .collect(),
            failed: failed.into_iter().map(|c| c.tag.clone()).collect(),
        })
    }
}

/// A pull request held by [`FakeHost`].
#[derive(Debug, Clone)]
pub(crate) struct FakePull {
    pub(crate) number: u64,
    pub(crate) head: String,
    pub(crate) base: String,
    pub(crate) draft: PullRequestDraft,
}

/// In-memory pull requests and releases.
#[derive(Default)]
pub(crate) struct FakeHost {
    pub(crate) pulls: RefCell<Vec<FakePull>>,
    pub(crate) releases: RefCell<Vec<NewRelease>>,
    pub(crate) existing_tags: RefCell<BTreeSet<String>>,
    pub(crate) failing_tags: BTreeSet<String>,
}

impl FakeHost {
    pub(crate) fn with_existing_tags(tags: &[&str]) -> Self {
        let host = Self::default();
        host.existing_tags
            .borrow_mut()
            .extend(tags.iter().map(|t| (*t).to_string()));
        host
    }

    pub(crate) fn failing_on(mut self, tags: &[&str]) -> Self {
        self.failing_tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }

    pub(crate) fn open_pull_requests(&self) -> usize {
        self.pulls.borrow().len()
    }

    pub(crate) fn release_tags(&self) -> Vec<String> {
        self.releases
            .borrow()
            .iter()
            .map(|r| r.tag_name.clone())
            .collect()
    }
}

impl GitHost for FakeHost {
    fn find_open_pull_request(&self, head: &str, base: &str) -> GitHubResult<Option<PullRequest>> {
        Ok(self
            .pulls
            .borrow()
            .iter()
            .find(|p| p.head == head && p.base == base)
            .map(|p| PullRequest {
                number: p.number,
                html_url: String::new(),
            }))
    }

    fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        draft: &PullRequestDraft,
    ) -> GitHubResult<PullRequest> {
        let mut pulls = self.pulls.borrow_mut();
        let number = pulls.len() as u64 + 1;
        pulls.push(FakePull {
            number,
            head: head.into(),
            base: base.into(),
            draft: draft.clone(),
        });
        Ok(PullRequest {
            number,
            html_url: String::new(),
        })
    }

    fn update_pull_request(&self, number: u64, draft: &PullRequestDraft) -> GitHubResult<PullRequest> {
        let mut pulls = self.pulls.borrow_mut();
        let pull = pulls
            .iter_mut()
            .find(|p| p.number == number)
            .ok_or_else(|| GitHubError::Api {
                method: "PATCH",
                endpoint: format!("pulls/{number}"),
                message: "HTTP 404".into(),
            })?;
        pull.draft = draft.clone();
        Ok(PullRequest {
            number,
            html_url: String::new(),
        })
    }

    fn release_exists(&self, tag: &str) -> GitHubResult<bool> {
        Ok(self.existing_tags.borrow().contains(tag))
    }

    fn create_release(&self, release: &NewRelease) -> GitHubResult<Release> {
        if self.failing_tags.contains(&release.tag_name) {
            return Err(GitHubError::Api {
                method: "POST",
                endpoint: "releases".into(),
                message: "HTTP 422".into(),
            });
        }
        self.existing_tags
            .borrow_mut()
            .insert(release.tag_name.clone());
        let mut releases = self.releases.borrow_mut();
        releases.push(release.clone());
        Ok(Release {
            id: releases.len() as u64,
            html_url: String::new(),
        })
    }
}

/// Records outputs in write order.
#[derive(Default)]
pub(crate) struct RecordingOutputs(pub(crate) RefCell<Vec<(String, String)>>);

impl RecordingOutputs {
    /// The last value written for `key`.
    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.0
            .borrow()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl OutputSink for RecordingOutputs {
    fn set(&self, key: &str, value: &str) -> OutputResult<()> {
        self.0.borrow_mut().push((key.into(), value.into()));
        Ok(())
    }
}
