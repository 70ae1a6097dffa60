//! Committer identity and host credentials for the CI bot.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::GitIdentityConfig;
use crate::env::Credentials;
use crate::git::{self, GitError};

/// Default committer name.
pub const BOT_NAME: &str = "github-actions[bot]";

/// Default committer email.
pub const BOT_EMAIL: &str = "github-actions[bot]@users.noreply.github.com";

/// Host the credential line is scoped to.
pub const GIT_HOST: &str = "github.com";

/// Errors from identity setup.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// `git config` failed.
    #[error("failed to configure git user: {0}")]
    Git(#[from] GitError),

    /// The credential file could not be written.
    #[error("failed to write credentials to {path}: {source}")]
    WriteCredentials {
        /// Target file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for identity setup.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Set `user.name` / `user.email` in the repository at `root`.
#[instrument(skip(overrides))]
pub fn setup_git_user(root: &Utf8Path, overrides: Option<&GitIdentityConfig>) -> IdentityResult<()> {
    let name = overrides
        .and_then(|o| o.name.as_deref())
        .unwrap_or(BOT_NAME);
    let email = overrides
        .and_then(|o| o.email.as_deref())
        .unwrap_or(BOT_EMAIL);

    git::set_config(root, "user.name", name)?;
    git::set_config(root, "user.email", email)?;
    info!(%name, %email, "configured git user");
    Ok(())
}

/// Render the `.netrc` body granting the bot access to the git host.
pub fn netrc_contents(credentials: &Credentials) -> String {
    format!(
        "machine {GIT_HOST}\nlogin {BOT_NAME}\npassword {}",
        credentials.token()
    )
}

/// Write `<home>/.netrc`, replacing any existing file.
#[instrument(skip(credentials))]
pub fn write_netrc(home: &Utf8Path, credentials: &Credentials) -> IdentityResult<Utf8PathBuf> {
    let path = home.join(".netrc");
    std::fs::write(&path, netrc_contents(credentials)).map_err(|source| {
        IdentityError::WriteCredentials {
            path: path.clone(),
            source,
        }
    })?;
    info!(%path, "wrote GitHub credentials");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RunEnvironment;
    use tempfile::TempDir;

    fn creds() -> Credentials {
        RunEnvironment::from_lookup(|k| (k == "GITHUB_TOKEN").then(|| "ghs_abc".to_string()))
            .credentials()
            .unwrap()
    }

    #[test]
    fn netrc_has_machine_login_password() {
        assert_eq!(
            netrc_contents(&creds()),
            "machine github.com\nlogin github-actions[bot]\npassword ghs_abc"
        );
    }

    #[test]
    fn write_netrc_to_home() {
        let tmp = TempDir::new().unwrap();
        let home = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();

        let path = write_netrc(&home, &creds()).unwrap();
        assert_eq!(path, home.join(".netrc"));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("password ghs_abc"));
    }

    #[test]
    fn write_netrc_fails_for_missing_home() {
        let tmp = TempDir::new().unwrap();
        let home = Utf8PathBuf::try_from(tmp.path().join("does-not-exist")).unwrap();

        let err = write_netrc(&home, &creds()).unwrap_err();
        assert!(matches!(err, IdentityError::WriteCredentials { .. }));
    }
}
