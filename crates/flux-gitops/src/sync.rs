//! Keeps the local working copy on the target branch and pushes commits.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::OperationContext;
use crate::error::{FluxError, GitError, Result};
use crate::git::LocalGitClient;
use crate::logging::Logger;
use crate::manifest::ManifestWriter;
use crate::retry::RetryPolicy;

/// Marker directory of an initialized or cloned working copy.
pub const GIT_DIR: &str = ".git";

/// Local working-copy synchronization.
#[derive(Clone)]
pub struct SyncEngine {
    git: Arc<dyn LocalGitClient>,
    writer: ManifestWriter,
    retry: RetryPolicy,
    logger: Logger,
}

impl SyncEngine {
    pub fn new(
        git: Arc<dyn LocalGitClient>,
        writer: ManifestWriter,
        retry: RetryPolicy,
        logger: Logger,
    ) -> Self {
        Self {
            git,
            writer,
            retry,
            logger: logger.named("sync"),
        }
    }

    pub fn git(&self) -> &Arc<dyn LocalGitClient> {
        &self.git
    }

    pub fn writer(&self) -> &ManifestWriter {
        &self.writer
    }

    /// Returns true once the working copy has git metadata.
    pub fn has_local_repo(&self) -> bool {
        self.writer.exists(GIT_DIR)
    }

    /// Makes sure a working copy exists and is on the configured branch.
    ///
    /// Clones when there is no working copy yet. An existing one is only
    /// switched to the branch; it is not pulled.
    pub async fn sync_local_state(
        &self,
        cancel: &CancellationToken,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        self.logger
            .scope("sync_local_state", async {
                if !self.has_local_repo() {
                    return self
                        .clone_and_branch(cancel, ctx.branch())
                        .await
                        .map_err(|source| FluxError::SyncLocalState { source });
                }

                tracing::debug!(branch = ctx.branch(), "switching local repository branch");
                self.git
                    .branch(cancel, ctx.branch())
                    .await
                    .map_err(|source| FluxError::SyncLocalState { source })
            })
            .await
    }

    /// Clones the remote with retry, then creates or switches to `branch`.
    ///
    /// An empty remote is reported immediately as [`GitError::RepositoryEmpty`].
    pub async fn clone_and_branch(
        &self,
        cancel: &CancellationToken,
        branch: &str,
    ) -> std::result::Result<(), GitError> {
        tracing::debug!("cloning remote repository");
        self.retry
            .retry_if("clone", GitError::is_retryable, || self.git.clone_repo(cancel))
            .await?;

        tracing::debug!(branch, "creating branch");
        self.git.branch(cancel, branch).await
    }

    /// Commits staged changes and pushes them.
    ///
    /// The commit is local and attempted once. The push is retried.
    pub async fn commit_and_push(
        &self,
        cancel: &CancellationToken,
        path: &str,
        message: &str,
    ) -> Result<()> {
        self.git
            .commit(cancel, message)
            .await
            .map_err(|e| FluxError::version_control(format!("committing {path} to git"), e))?;

        self.retry
            .retry_if("push", GitError::is_retryable, || self.git.push(cancel))
            .await
            .map_err(|e| FluxError::version_control(format!("pushing {path} to git"), e))?;

        tracing::debug!(path, "pushed changes to remote");
        Ok(())
    }

    /// Pulls `branch` with retry.
    pub async fn pull(
        &self,
        cancel: &CancellationToken,
        branch: &str,
    ) -> std::result::Result<(), GitError> {
        self.retry
            .retry_if("pull", GitError::is_retryable, || self.git.pull(cancel, branch))
            .await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("dir", &self.writer.dir())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
