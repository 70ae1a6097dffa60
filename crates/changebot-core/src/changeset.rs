//! Changeset state reader.
//!
//! A changeset is a markdown file in the changeset directory whose YAML
//! front matter maps package names to bump types:
//!
//! ```text
//! ---
//! "@scope/pkg-a": minor
//! pkg-b: patch
//! ---
//!
//! Add a `--dry-run` flag.
//! ```
//!
//! `config.json`, `README.md`, and anything that is not markdown are part of
//! the directory's scaffolding and are skipped. `pre.json`, when present,
//! describes an active pre-release.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const PRE_STATE_FILE: &str = "pre.json";
const README_FILE: &str = "README.md";

/// Errors from reading changeset storage.
#[derive(Error, Debug)]
pub enum StateReadError {
    /// The changeset directory does not exist.
    #[error("changeset directory {0} does not exist; run `changeset init` first")]
    MissingDir(Utf8PathBuf),

    /// Listing or reading a file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File or directory that failed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A changeset file is not well formed.
    #[error("malformed changeset {path}: {reason}")]
    Malformed {
        /// The offending file.
        path: Utf8PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// `pre.json` is not well formed.
    #[error("malformed pre-release state {path}: {source}")]
    MalformedPreState {
        /// Path to `pre.json`.
        path: Utf8PathBuf,
        /// JSON error.
        source: serde_json::Error,
    },
}

/// Result alias for state reads.
pub type StateReadResult<T> = Result<T, StateReadError>;

/// Semver bump requested for one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    /// Listed but not bumped.
    None,
    /// Patch release.
    Patch,
    /// Minor release.
    Minor,
    /// Major release.
    Major,
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

/// One package entry of a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    /// Package name.
    pub name: String,
    /// Requested bump.
    #[serde(rename = "type")]
    pub bump: BumpType,
}

/// A pending changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetRef {
    /// File stem, e.g. `brave-lions-dance`.
    pub id: String,
    /// Packages and their bumps, in name order.
    pub releases: Vec<Release>,
    /// Markdown summary after the front matter.
    pub summary: String,
}

/// Pre-release mode recorded in `pre.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreMode {
    /// Pre-release is active.
    Pre,
    /// Pre-release is being exited on the next version.
    Exit,
}

/// Contents of `pre.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreState {
    /// Current mode.
    pub mode: PreMode,
    /// Dist tag, e.g. `next` or `beta`.
    pub tag: String,
    /// Package versions when pre mode was entered.
    #[serde(default)]
    pub initial_versions: BTreeMap<String, String>,
    /// Changeset ids already consumed by earlier pre-releases.
    #[serde(default)]
    pub changesets: Vec<String>,
}

/// Everything the dispatcher needs to know about pending changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangesetState {
    /// Pending changesets, ordered by id.
    pub changesets: Vec<ChangesetRef>,
    /// Active pre-release state (only when `mode` is `pre`).
    pub pre_state: Option<PreState>,
}

impl ChangesetState {
    /// Whether anything is pending.
    pub const fn has_changesets(&self) -> bool {
        !self.changesets.is_empty()
    }

    /// Pre-release tag, when pre mode is active.
    pub fn pre_tag(&self) -> Option<&str> {
        self.pre_state.as_ref().map(|p| p.tag.as_str())
    }
}

/// Read `<root>/<dir>` into a [`ChangesetState`].
///
/// Changesets already consumed by an active pre-release are filtered out.
#[instrument(skip_all, fields(%root, %dir))]
pub fn read_changeset_state(root: &Utf8Path, dir: &Utf8Path) -> StateReadResult<ChangesetState> {
    let dir = root.join(dir);
    if !dir.is_dir() {
        return Err(StateReadError::MissingDir(dir));
    }

    let mut changesets = read_changesets(&dir)?;
    let pre_state = read_pre_state(&dir)?.filter(|p| p.mode == PreMode::Pre);

    if let Some(ref pre) = pre_state {
        let consumed: BTreeSet<&str> = pre.changesets.iter().map(String::as_str).collect();
        let before = changesets.len();
        changesets.retain(|c| !consumed.contains(c.id.as_str()));
        debug!(
            tag = %pre.tag,
            filtered = before - changesets.len(),
            "pre-release mode active"
        );
    }

    debug!(count = changesets.len(), "read changeset state");
    Ok(ChangesetState {
        changesets,
        pre_state,
    })
}

fn read_changesets(dir: &Utf8Path) -> StateReadResult<Vec<ChangesetRef>> {
    let io_err = |path: &Utf8Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| StateReadError::Io { path, source }
    };

    let mut changesets = Vec::new();
    for entry in dir.read_dir_utf8().map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        if !is_changeset_file(path) {
            continue;
        }
        let contents = std::fs::read_to_string(path).map_err(io_err(path))?;
        let id = changeset_id(path)?;
        changesets.push(parse_changeset(id, &contents).map_err(|reason| {
            StateReadError::Malformed {
                path: path.to_path_buf(),
                reason,
            }
        })?);
    }

    changesets.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(changesets)
}

fn changeset_id(path: &Utf8Path) -> StateReadResult<&str> {
    path.file_stem()
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| StateReadError::Malformed {
            path: path.to_path_buf(),
            reason: "file name has no changeset id".into(),
        })
}

fn is_changeset_file(path: &Utf8Path) -> bool {
    path.is_file() && path.extension() == Some("md") && path.file_name() != Some(README_FILE)
}

fn read_pre_state(dir: &Utf8Path) -> StateReadResult<Option<PreState>> {
    let path = dir.join(PRE_STATE_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| StateReadError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StateReadError::MalformedPreState { path, source })
}

/// Parse one changeset file body. Errors are returned as a reason string.
pub fn parse_changeset(id: &str, contents: &str) -> Result<ChangesetRef, String> {
    let mut lines = contents.trim_start().lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return Err("missing `---` front matter".into());
    }

    let mut front = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        front.push(line);
    }
    if !closed {
        return Err("front matter is not terminated by `---`".into());
    }

    let front = front.join("\n");
    let releases: BTreeMap<String, BumpType> = if front.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_saphyr::from_str(&front).map_err(|e| format!("invalid front matter: {e}"))?
    };

    let summary = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    Ok(ChangesetRef {
        id: id.to_string(),
        releases: releases
            .into_iter()
            .map(|(name, bump)| Release { name, bump })
            .collect(),
        summary,
    })
}
