//! Credentials for git commands that reach the remote.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::config::CliConfig;
use crate::error::GitError;

/// How git authenticates against the remote.
#[derive(Debug, Clone, Default)]
pub enum GitAuth {
    /// Rely on the ambient git configuration.
    #[default]
    None,
    /// HTTPS personal access token, supplied through `GIT_ASKPASS`.
    Token(SecretString),
    /// SSH private key, optionally pinned to a known-hosts file.
    SshKey {
        key_path: String,
        known_hosts: Option<PathBuf>,
    },
}

impl GitAuth {
    /// SSH key auth when a private key is configured, ambient auth otherwise.
    pub fn from_cli_config(cli: &CliConfig) -> Self {
        match &cli.git_private_key_file {
            Some(key) => GitAuth::SshKey {
                key_path: key.display().to_string(),
                known_hosts: cli.git_known_hosts_file.clone(),
            },
            None => GitAuth::None,
        }
    }
}

/// Escapes a value for use inside single quotes in a shell script.
pub fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

fn shell_quote_path(path: &str) -> String {
    let escaped = shell_escape(path);
    if escaped.starts_with('-') {
        format!("'./{escaped}'")
    } else {
        format!("'{escaped}'")
    }
}

/// Deletes the askpass script when dropped.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(error = %e, "failed to clean up askpass script");
            }
        }
    }
}

/// Environment for one authenticated git command.
///
/// Must outlive the command so the askpass script stays on disk.
#[derive(Debug)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    _cleanup: AskpassCleanup,
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_default()
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

/// Builds the environment variables that authenticate a git command.
pub fn build_auth_env(auth: &GitAuth) -> Result<AuthEnv, GitError> {
    match auth {
        GitAuth::None => Ok(AuthEnv {
            env_vars: Vec::new(),
            _cleanup: AskpassCleanup::empty(),
        }),
        GitAuth::Token(token) => {
            let path = std::env::temp_dir()
                .join(format!(".git-askpass-{}.sh", uuid::Uuid::new_v4()));
            let script = format!("#!/bin/sh\necho '{}'\n", shell_escape(token.expose_secret()));

            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                let mut file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o700)
                    .open(&path)?;
                std::io::Write::write_all(&mut file, script.as_bytes())?;
            }

            #[cfg(not(unix))]
            std::fs::write(&path, &script)?;

            let cleanup = AskpassCleanup::new(path.clone());
            let path = path
                .to_str()
                .ok_or_else(|| {
                    GitError::Auth("temp directory path contains non-UTF8 characters".to_string())
                })?
                .to_string();

            Ok(AuthEnv {
                env_vars: vec![
                    ("GIT_ASKPASS".to_string(), path),
                    ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
                ],
                _cleanup: cleanup,
            })
        }
        GitAuth::SshKey {
            key_path,
            known_hosts,
        } => {
            let key = expand_tilde(key_path);
            if !key.exists() {
                return Err(GitError::Auth(format!(
                    "SSH key file not found: {}",
                    key.display()
                )));
            }

            let mut command = format!("ssh -i {}", shell_quote_path(&key.display().to_string()));
            match known_hosts {
                Some(hosts) => {
                    command.push_str(&format!(
                        " -o UserKnownHostsFile={} -o StrictHostKeyChecking=yes",
                        shell_quote_path(&hosts.display().to_string())
                    ));
                }
                None => command.push_str(" -o StrictHostKeyChecking=accept-new"),
            }

            Ok(AuthEnv {
                env_vars: vec![("GIT_SSH_COMMAND".to_string(), command)],
                _cleanup: AskpassCleanup::empty(),
            })
        }
    }
}
