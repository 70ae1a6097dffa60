//! Package discovery.
//!
//! Every `package.json` outside `node_modules` and dot-directories is a
//! package. In a monorepo the root manifest only describes the workspace and
//! is not released itself.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

const MANIFEST: &str = "package.json";

/// Errors from package discovery.
#[derive(Error, Debug)]
pub enum PackagesError {
    /// Walking the repository failed.
    #[error("failed to scan {root} for packages: {source}")]
    Walk {
        /// Repository root.
        root: Utf8PathBuf,
        /// Underlying walk error.
        source: walkdir::Error,
    },

    /// A manifest could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A manifest is not valid JSON.
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        /// Manifest path.
        path: Utf8PathBuf,
        /// JSON error.
        source: serde_json::Error,
    },

    /// A path under the repository is not UTF-8.
    #[error("non UTF-8 path under {0}")]
    NonUtf8(Utf8PathBuf),
}

/// Result alias for package discovery.
pub type PackagesResult<T> = Result<T, PackagesError>;

#[derive(Deserialize)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    private: bool,
}

/// A package found in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// `name` from the manifest.
    pub name: String,
    /// `version` from the manifest.
    pub version: String,
    /// Private packages are never published.
    pub private: bool,
    /// Directory containing the manifest.
    pub dir: Utf8PathBuf,
    /// The manifest is the repository root's, so the repo is a single package.
    pub root: bool,
}

/// A package that may be released, with its git tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseCandidate {
    /// Package name.
    pub name: String,
    /// Version to release.
    pub version: String,
    /// Package directory (holds `CHANGELOG.md`).
    pub dir: Utf8PathBuf,
    /// `v<version>` for single-package repos, `<name>@<version>` otherwise.
    pub tag: String,
}

impl ReleaseCandidate {
    /// Whether the version carries a semver prerelease component.
    pub fn is_prerelease(&self) -> bool {
        semver::Version::parse(&self.version).is_ok_and(|v| !v.pre.is_empty())
    }
}

/// A package whose version changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageChange {
    /// Package name.
    pub name: String,
    /// Version after the bump.
    pub version: String,
    /// Package directory.
    pub dir: Utf8PathBuf,
}

/// Find every package under `root`, sorted by name.
#[instrument]
pub fn discover(root: &Utf8Path) -> PackagesResult<Vec<Package>> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0 || !is_ignored_dir(e.file_name().to_str().unwrap_or_default())
    });

    let mut packages = Vec::new();
    let mut root_package = None;
    for entry in walker {
        let entry = entry.map_err(|source| PackagesError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST {
            continue;
        }
        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| PackagesError::NonUtf8(root.to_path_buf()))?;
        let is_root = entry.depth() == 1;
        let Some(package) = read_manifest(path, is_root)? else {
            continue;
        };
        if is_root {
            root_package = Some(package);
        } else {
            packages.push(package);
        }
    }

    // A lone root manifest is the package; otherwise it is the workspace root.
    if packages.is_empty() {
        packages.extend(root_package);
    }
    packages.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = packages.len(), "discovered packages");
    Ok(packages)
}

fn is_ignored_dir(name: &str) -> bool {
    name == "node_modules" || name.starts_with('.')
}

fn read_manifest(path: &Utf8Path, root: bool) -> PackagesResult<Option<Package>> {
    let contents = std::fs::read_to_string(path).map_err(|source| PackagesError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: Manifest =
        serde_json::from_str(&contents).map_err(|source| PackagesError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;

    let (Some(name), Some(version)) = (manifest.name, manifest.version) else {
        debug!(%path, "skipping manifest without name or version");
        return Ok(None);
    };
    Ok(Some(Package {
        name,
        version,
        private: manifest.private,
        dir: path.parent().unwrap_or(path).to_path_buf(),
        root,
    }))
}

/// Non-private packages with the tag each would be released under.
///
/// Only a repository whose root manifest is the package uses `v<version>`;
/// workspace packages are tagged `<name>@<version>` even when there is one.
pub fn release_candidates(packages: &[Package]) -> Vec<ReleaseCandidate> {
    let single = packages.iter().any(|p| p.root);
    packages
        .iter()
        .filter(|p| !p.private)
        .map(|p| ReleaseCandidate {
            name: p.name.clone(),
            version: p.version.clone(),
            dir: p.dir.clone(),
            tag: if single {
                format!("v{}", p.version)
            } else {
                format!("{}@{}", p.name, p.version)
            },
        })
        .collect()
}

/// Packages whose version differs between two snapshots.
pub fn changed_packages(before: &[Package], after: &[Package]) -> Vec<PackageChange> {
    let previous: BTreeMap<&str, &str> = before
        .iter()
        .map(|p| (p.name.as_str(), p.version.as_str()))
        .collect();

    after
        .iter()
        .filter(|p| previous.get(p.name.as_str()) != Some(&p.version.as_str()))
        .map(|p| PackageChange {
            name: p.name.clone(),
            version: p.version.clone(),
            dir: p.dir.clone(),
        })
        .collect()
}
