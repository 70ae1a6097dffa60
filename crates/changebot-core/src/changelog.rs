//! CHANGELOG entries and version pull request bodies.
//!
//! The changesets tool writes one `## <version>` section per release, with
//! `### Major Changes` / `### Minor Changes` / `### Patch Changes`
//! subsections. The entry for a version is everything between its heading
//! and the next heading of level one or two.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::changeset::BumpType;
use crate::packages::PackageChange;

/// Largest body GitHub accepts for a pull request, with some headroom.
pub const MAX_BODY_CHARS: usize = 60_000;

const CHANGELOG_FILE: &str = "CHANGELOG.md";

const BODY_HEADER: &str = "This PR was opened by changebot. When you're ready to do a release, \
you can merge this and the packages will be published automatically. If you're not ready to do \
a release yet, that's fine; whenever you add more changesets to the base branch, this PR will be \
updated.";

const CONTENT_OMITTED: &str = "> The changelog information of each package has been omitted \
from this message, as the content exceeds the size limit.";

const RELEASES_OMITTED: &str = "> All release information has been omitted from this message, \
as the content exceeds the size limit.";

/// Errors from reading changelogs.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// The changelog exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Changelog path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for changelog reads.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// One version's section of a changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    /// Markdown between the version heading and the next release heading.
    pub content: String,
    /// Highest bump named by a `### <Level> Changes` subsection.
    pub highest_level: BumpType,
}

/// Extract the entry for `version` from changelog markdown.
pub fn entry_for(markdown: &str, version: &str) -> Option<ChangelogEntry> {
    let mut lines = markdown.lines();
    lines.by_ref().find(|line| {
        heading_level(line) == Some(2) && line.trim_start_matches('#').trim() == version
    })?;

    let mut body = Vec::new();
    let mut highest_level = BumpType::None;
    for line in lines {
        match heading_level(line) {
            Some(1 | 2) => break,
            Some(3) => {
                let title = line.trim_start_matches('#').trim();
                let level = match title {
                    "Major Changes" => BumpType::Major,
                    "Minor Changes" => BumpType::Minor,
                    "Patch Changes" => BumpType::Patch,
                    _ => BumpType::None,
                };
                highest_level = highest_level.max(level);
            }
            _ => {}
        }
        body.push(line);
    }

    Some(ChangelogEntry {
        content: body.join("\n").trim().to_string(),
        highest_level,
    })
}

fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    let rest = &line[hashes..];
    (hashes > 0 && (rest.is_empty() || rest.starts_with(' '))).then_some(hashes)
}

/// Read the entry for `version` from `<dir>/CHANGELOG.md`.
///
/// A missing changelog or a missing version section yields `None`.
pub fn read_entry(dir: &Utf8Path, version: &str) -> ChangelogResult<Option<ChangelogEntry>> {
    let path = dir.join(CHANGELOG_FILE);
    let markdown = match std::fs::read_to_string(&path) {
        Ok(markdown) => markdown,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(%path, "no changelog");
            return Ok(None);
        }
        Err(source) => return Err(ChangelogError::Io { path, source }),
    };

    let entry = entry_for(&markdown, version);
    if entry.is_none() {
        warn!(%path, %version, "changelog has no entry for version");
    }
    Ok(entry)
}

// ──────────────────────────────────────────────
// Version PR body
// ──────────────────────────────────────────────

/// A changed package together with its changelog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseNotes {
    /// Package name.
    pub name: String,
    /// New version.
    pub version: String,
    /// Changelog entry, if one was found.
    pub entry: Option<ChangelogEntry>,
}

impl ReleaseNotes {
    fn level(&self) -> BumpType {
        self.entry.as_ref().map_or(BumpType::None, |e| e.highest_level)
    }
}

/// Collect release notes for each changed package.
pub fn collect_release_notes(changes: &[PackageChange]) -> ChangelogResult<Vec<ReleaseNotes>> {
    changes
        .iter()
        .map(|change| {
            Ok(ReleaseNotes {
                name: change.name.clone(),
                version: change.version.clone(),
                entry: read_entry(&change.dir, &change.version)?,
            })
        })
        .collect()
}

/// Build the body of the version pull request.
///
/// Releases are ordered by highest bump (major first), then by name. When the
/// body would exceed `max_chars`, changelog contents are dropped first, then
/// the whole releases section.
pub fn version_pr_body(
    base_branch: &str,
    pre_tag: Option<&str>,
    notes: &[ReleaseNotes],
    max_chars: usize,
) -> String {
    let mut sorted: Vec<&ReleaseNotes> = notes.iter().collect();
    sorted.sort_by(|a, b| b.level().cmp(&a.level()).then_with(|| a.name.cmp(&b.name)));

    let mut intro = vec![BODY_HEADER.to_string()];
    if pre_tag.is_some() {
        intro.push(pre_mode_warning(base_branch));
    }

    let full = render(&intro, &sorted, true);
    if full.chars().count() <= max_chars {
        return full;
    }

    debug!("pull request body too long, omitting changelog contents");
    let mut short_intro = intro.clone();
    short_intro.push(CONTENT_OMITTED.to_string());
    let headings_only = render(&short_intro, &sorted, false);
    if headings_only.chars().count() <= max_chars {
        return headings_only;
    }

    debug!("pull request body still too long, omitting releases");
    intro.push(RELEASES_OMITTED.to_string());
    intro.join("\n\n")
}

fn pre_mode_warning(base_branch: &str) -> String {
    format!(
        "⚠️⚠️⚠️⚠️⚠️⚠️\n\n`{base_branch}` is currently in **pre mode** so this branch has \
         prereleases rather than normal releases. If you want to exit prereleases, run \
         `changeset pre exit` on `{base_branch}`.\n\n⚠️⚠️⚠️⚠️⚠️⚠️"
    )
}

fn render(intro: &[String], notes: &[&ReleaseNotes], with_content: bool) -> String {
    let mut sections = intro.to_vec();
    sections.push("# Releases".to_string());
    for note in notes {
        let heading = format!("## {}@{}", note.name, note.version);
        match note.entry.as_ref().filter(|_| with_content) {
            Some(entry) if !entry.content.is_empty() => {
                sections.push(format!("{heading}\n\n{}", entry.content));
            }
            _ => sections.push(heading),
        }
    }
    sections.join("\n\n")
}
