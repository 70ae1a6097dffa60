//! Core library for changebot.
//!
//! This crate holds every stage of a changesets release run and the
//! handlers it dispatches to. The `changebot` CLI is a thin shell around
//! [`action::run`].
//!
//! # Modules
//!
//! - [`action`] - Run orchestration and the [`action::Backend`] seam
//! - [`changelog`] - CHANGELOG entries and version pull request bodies
//! - [`changeset`] - Reading `.changeset/` and pre-release state
//! - [`config`] - Configuration loading and management
//! - [`dispatch`] - The dispatch decision table
//! - [`env`] - Captured process environment and credentials
//! - [`error`] - Error types and result aliases
//! - [`git`] - Git operations for the version branch
//! - [`github`] - Pull requests and releases via `gh api`
//! - [`identity`] - Committer identity and `.netrc`
//! - [`inputs`] - Action input parsing
//! - [`outputs`] - Action outputs
//! - [`packages`] - `package.json` discovery and release tags
//! - [`publish`] - The publish handler
//! - [`tools`] - The changesets CLI and publish scripts
//! - [`version_pr`] - The version pull request handler
//!
//! # Quick Start
//!
//! ```no_run
//! use changebot_core::{ConfigLoader, dispatch};
//! use changebot_core::changeset::read_changeset_state;
//! use camino::Utf8Path;
//!
//! let config = ConfigLoader::new()
//!     .with_user_config(true)
//!     .load()
//!     .expect("Failed to load configuration");
//!
//! let state = read_changeset_state(Utf8Path::new("."), config.changeset_dir())
//!     .expect("Failed to read changesets");
//! println!("{}", dispatch::decide(state.has_changesets(), false, false));
//! ```
#![deny(unsafe_code)]

pub mod action;

pub mod changelog;

pub mod changeset;

pub mod config;

pub mod dispatch;

pub mod env;

pub mod error;

pub mod git;

pub mod github;

pub mod identity;

pub mod inputs;

pub mod outputs;

pub mod packages;

pub mod publish;

pub mod tools;

pub mod version_pr;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ActionError, ActionResult, ConfigError, ConfigResult};

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;
