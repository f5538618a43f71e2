//! [`LocalGitClient`] over the `git` binary.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;

use super::auth::{build_auth_env, GitAuth};
use super::LocalGitClient;
use crate::error::{classify_git_error, GitError};
use crate::sync::GIT_DIR;

const DEFAULT_REMOTE: &str = "origin";

/// Formats a failed git command with both stdout and stderr.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{stderr}\n{stdout}"),
    }
}

/// Git working copy driven through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
    remote_url: String,
    auth: GitAuth,
    user_name: String,
    user_email: String,
    timeout: Option<Duration>,
}

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote_url: remote_url.into(),
            auth: GitAuth::None,
            user_name: "EKS-A CLI".to_string(),
            user_email: "eksa-cli@localhost".to_string(),
            timeout: None,
        }
    }

    pub fn with_auth(mut self, auth: GitAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Author used for commits made by this client.
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.user_name = name.into();
        self.user_email = email.into();
        self
    }

    /// Limits how long a network command may run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn ensure_repo(&self) -> Result<(), GitError> {
        if self.repo_path.join(GIT_DIR).exists() {
            Ok(())
        } else {
            Err(GitError::NotARepository(self.repo_path.clone()))
        }
    }

    fn command(&self, args: &[&str]) -> TokioCommand {
        let mut cmd = TokioCommand::new("git");
        cmd.current_dir(&self.repo_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawns `cmd` and waits for it. The child is killed when `cancel`
    /// fires or `timeout` elapses.
    async fn wait(
        cancel: &CancellationToken,
        mut cmd: TokioCommand,
        timeout: Option<Duration>,
    ) -> Result<Output, GitError> {
        let child = cmd.spawn()?;
        let wait = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                    .await
                    .map_err(|_| GitError::Timeout(limit.as_secs()))?
                    .map_err(GitError::from),
                None => child.wait_with_output().await.map_err(GitError::from),
            }
        };

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GitError::Cancelled),
            output = wait => output?,
        };

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Runs a local git command in the working copy.
    async fn run_git(&self, cancel: &CancellationToken, args: &[&str]) -> Result<Output, GitError> {
        Self::wait(cancel, self.command(args), None).await
    }

    /// Runs a git command that talks to the remote, with credentials and the
    /// configured timeout.
    async fn run_remote(
        &self,
        cancel: &CancellationToken,
        args: &[&str],
    ) -> Result<Output, GitError> {
        let auth = build_auth_env(&self.auth)?;
        let mut cmd = self.command(args);
        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let output = Self::wait(cancel, cmd, self.timeout).await;
        drop(auth);
        output
    }

    async fn configure_author(&self, cancel: &CancellationToken) -> Result<(), GitError> {
        self.run_git(cancel, &["config", "user.name", &self.user_name])
            .await?;
        self.run_git(cancel, &["config", "user.email", &self.user_email])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LocalGitClient for GitCli {
    async fn clone_repo(&self, cancel: &CancellationToken) -> Result<(), GitError> {
        tokio::fs::create_dir_all(&self.repo_path).await?;

        let output = self
            .run_remote(cancel, &["clone", &self.remote_url, "."])
            .await?;

        // Cloning an empty remote succeeds with a warning and leaves nothing to branch from.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if matches!(classify_git_error(&stderr), GitError::RepositoryEmpty) {
            tokio::fs::remove_dir_all(self.repo_path.join(GIT_DIR)).await?;
            return Err(GitError::RepositoryEmpty);
        }

        self.configure_author(cancel).await
    }

    async fn init(&self, cancel: &CancellationToken) -> Result<(), GitError> {
        tokio::fs::create_dir_all(&self.repo_path).await?;
        self.run_git(cancel, &["init"]).await?;
        self.run_git(cancel, &["remote", "add", DEFAULT_REMOTE, &self.remote_url])
            .await?;
        self.configure_author(cancel).await
    }

    async fn branch(&self, cancel: &CancellationToken, name: &str) -> Result<(), GitError> {
        self.ensure_repo()?;

        match self.run_git(cancel, &["checkout", name]).await {
            Ok(_) => Ok(()),
            Err(GitError::Cancelled) => Err(GitError::Cancelled),
            Err(_) => {
                self.run_git(cancel, &["checkout", "-b", name]).await?;
                Ok(())
            }
        }
    }

    async fn add(&self, cancel: &CancellationToken, path: &str) -> Result<(), GitError> {
        self.ensure_repo()?;
        self.run_git(cancel, &["add", "--", path]).await?;
        Ok(())
    }

    async fn remove(&self, cancel: &CancellationToken, path: &str) -> Result<(), GitError> {
        self.ensure_repo()?;
        self.run_git(cancel, &["rm", "-r", "--", path]).await?;
        Ok(())
    }

    async fn commit(&self, cancel: &CancellationToken, message: &str) -> Result<(), GitError> {
        self.ensure_repo()?;
        self.run_git(cancel, &["commit", "--allow-empty", "-m", message])
            .await?;
        Ok(())
    }

    async fn push(&self, cancel: &CancellationToken) -> Result<(), GitError> {
        self.ensure_repo()?;
        self.run_remote(cancel, &["push", "--set-upstream", DEFAULT_REMOTE, "HEAD"])
            .await?;
        Ok(())
    }

    async fn pull(&self, cancel: &CancellationToken, branch: &str) -> Result<(), GitError> {
        self.ensure_repo()?;
        self.run_remote(cancel, &["pull", "--ff-only", DEFAULT_REMOTE, branch])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn bare_remote(dir: &Path) -> String {
        let status = TokioCommand::new("git")
            .args(["init", "--bare", "-q"])
            .arg(dir)
            .status()
            .await
            .unwrap();
        assert!(status.success());
        dir.display().to_string()
    }

    fn head_subject(repo: &Path) -> String {
        let output = std::process::Command::new("git")
            .current_dir(repo)
            .args(["log", "-1", "--format=%s"])
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[tokio::test]
    async fn test_clone_of_empty_remote_reports_empty() {
        let temp = TempDir::new().unwrap();
        let remote = bare_remote(&temp.path().join("remote.git")).await;
        let work = temp.path().join("work");

        let git = GitCli::new(&work, remote);
        let err = git.clone_repo(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, GitError::RepositoryEmpty));
        assert!(!work.join(GIT_DIR).exists());
    }

    #[tokio::test]
    async fn test_init_commit_push_then_clone() {
        let temp = TempDir::new().unwrap();
        let remote = bare_remote(&temp.path().join("remote.git")).await;
        let cancel = CancellationToken::new();

        let first = GitCli::new(temp.path().join("first"), remote.clone());
        first.init(&cancel).await.unwrap();
        first.commit(&cancel, "initializing repository").await.unwrap();
        first.branch(&cancel, "main").await.unwrap();
        std::fs::create_dir_all(temp.path().join("first/clusters/mgmt")).unwrap();
        std::fs::write(temp.path().join("first/clusters/mgmt/a.yaml"), "a: 1\n").unwrap();
        first.add(&cancel, "clusters").await.unwrap();
        first.commit(&cancel, "add cluster").await.unwrap();
        first.push(&cancel).await.unwrap();

        let second = GitCli::new(temp.path().join("second"), remote);
        second.clone_repo(&cancel).await.unwrap();
        second.branch(&cancel, "main").await.unwrap();
        assert!(temp.path().join("second/clusters/mgmt/a.yaml").exists());
        assert_eq!(head_subject(&temp.path().join("second")), "add cluster");

        second.remove(&cancel, "clusters/mgmt").await.unwrap();
        second.commit(&cancel, "remove cluster").await.unwrap();
        second.push(&cancel).await.unwrap();

        first.pull(&cancel, "main").await.unwrap();
        assert!(!temp.path().join("first/clusters/mgmt/a.yaml").exists());
    }

    #[tokio::test]
    async fn test_local_operations_require_repository() {
        let temp = TempDir::new().unwrap();
        let git = GitCli::new(temp.path(), "unused");
        let cancel = CancellationToken::new();
        assert!(matches!(
            git.commit(&cancel, "x").await,
            Err(GitError::NotARepository(_))
        ));
        assert!(matches!(
            git.branch(&cancel, "main").await,
            Err(GitError::NotARepository(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_clone() {
        let temp = TempDir::new().unwrap();
        let git = GitCli::new(temp.path().join("work"), "https://example.invalid/repo.git");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = git.clone_repo(&cancel).await.unwrap_err();
        assert!(matches!(err, GitError::Cancelled));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancelled_local_command() {
        let temp = TempDir::new().unwrap();
        let git = GitCli::new(temp.path(), "unused");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = git.init(&cancel).await.unwrap_err();
        assert!(matches!(err, GitError::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn test_format_git_error_prefers_both_streams() {
        use std::os::unix::process::ExitStatusExt;
        let output = Output {
            status: std::process::ExitStatus::from_raw(256),
            stdout: b"out".to_vec(),
            stderr: b"err".to_vec(),
        };
        assert_eq!(format_git_error(&output), "err\nout");
    }
}
