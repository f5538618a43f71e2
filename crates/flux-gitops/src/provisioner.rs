//! Brings the remote and local configuration repository to a ready state.
//!
//! | remote              | local `.git` | action                          | outcome                   |
//! |---------------------|--------------|---------------------------------|---------------------------|
//! | exists              | present      | switch branch                   | `AlreadyPresent`          |
//! | exists, empty       | absent       | init, seed commit, branch       | `EmptyRemoteInitialized`  |
//! | exists, has commits | absent       | clone, branch                   | `Cloned`                  |
//! | missing             | any          | create, init, seed commit, branch | `CreatedAndInitialized` |
//!
//! A clone that discovers an empty remote falls back to local initialization.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::OperationContext;
use crate::error::{FluxError, GitError, ProviderError, Result};
use crate::logging::Logger;
use crate::provider::{CreateRepoOpts, RemoteRepositoryProvider};
use crate::retry::RetryPolicy;
use crate::sync::SyncEngine;

/// Description given to repositories created on the hosting provider.
pub const REPOSITORY_DESCRIPTION: &str = "EKS-A cluster configuration repository";
/// Message of the first commit in a freshly initialized repository.
pub const SEED_COMMIT_MESSAGE: &str = "initializing repository";

/// How the repository reached the ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Cloned,
    EmptyRemoteInitialized,
    CreatedAndInitialized,
    AlreadyPresent,
}

/// Repository provisioning state machine for hosted repositories.
#[derive(Clone)]
pub struct RepositoryProvisioner {
    provider: Arc<dyn RemoteRepositoryProvider>,
    sync: SyncEngine,
    retry: RetryPolicy,
    logger: Logger,
}

impl RepositoryProvisioner {
    pub fn new(
        provider: Arc<dyn RemoteRepositoryProvider>,
        sync: SyncEngine,
        retry: RetryPolicy,
        logger: Logger,
    ) -> Self {
        Self {
            provider,
            sync,
            retry,
            logger: logger.named("provisioner"),
        }
    }

    /// Ensures the remote repository exists and a local working copy is on
    /// the configured branch. Safe to call repeatedly.
    pub async fn ensure_repository(
        &self,
        cancel: &CancellationToken,
        ctx: &OperationContext<'_>,
    ) -> Result<ProvisionOutcome> {
        self.logger
            .scope("ensure_repository", self.provision(cancel, ctx))
            .await
    }

    async fn provision(
        &self,
        cancel: &CancellationToken,
        ctx: &OperationContext<'_>,
    ) -> Result<ProvisionOutcome> {
        let remote = self
            .retry
            .retry_if("describe repository", ProviderError::is_retryable, || {
                self.provider.get_repo(cancel)
            })
            .await
            .map_err(|source| FluxError::RemoteDescribe { source })?;

        let Some(remote) = remote else {
            self.create_remote(cancel, ctx).await?;
            self.initialize_local(cancel, ctx).await?;
            return Ok(ProvisionOutcome::CreatedAndInitialized);
        };

        if self.sync.has_local_repo() {
            tracing::debug!(
                repository = %remote.name,
                "local repository already present, switching branch"
            );
            self.sync
                .git()
                .branch(cancel, ctx.branch())
                .await
                .map_err(|e| FluxError::version_control("creating branch", e))?;
            return Ok(ProvisionOutcome::AlreadyPresent);
        }

        if remote.empty {
            tracing::debug!(
                repository = %remote.name,
                "remote repository has no commits, initializing locally"
            );
            self.initialize_local(cancel, ctx).await?;
            return Ok(ProvisionOutcome::EmptyRemoteInitialized);
        }

        match self.sync.clone_and_branch(cancel, ctx.branch()).await {
            Ok(()) => Ok(ProvisionOutcome::Cloned),
            Err(GitError::RepositoryEmpty) => {
                tracing::debug!(
                    "remote repository is empty and can't be cloned; will initialize locally"
                );
                self.initialize_local(cancel, ctx).await?;
                Ok(ProvisionOutcome::EmptyRemoteInitialized)
            }
            Err(e) => Err(FluxError::version_control("cloning repository", e)),
        }
    }

    async fn create_remote(
        &self,
        cancel: &CancellationToken,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        let opts = CreateRepoOpts {
            name: ctx.repository(),
            owner: ctx.owner().to_string(),
            description: REPOSITORY_DESCRIPTION.to_string(),
            personal: ctx.personal(),
            private: ctx.gitops().private,
        };
        tracing::debug!(
            repo = %opts.name,
            owner = %opts.owner,
            "remote repository does not exist; will create and initialize"
        );

        let created = self
            .retry
            .retry_if("create repository", ProviderError::is_retryable, || {
                self.provider.create_repo(cancel, &opts)
            })
            .await
            .map_err(|e| FluxError::version_control("could not create repo", e))?;

        tracing::info!(clone_url = %created.clone_url, "created remote repository");
        Ok(())
    }

    /// Initializes the working copy with a seed commit so the branch can be
    /// created. An existing working copy only has its branch switched.
    async fn initialize_local(
        &self,
        cancel: &CancellationToken,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        let git = self.sync.git();

        if self.sync.has_local_repo() {
            tracing::debug!("local repository already initialized, skipping seed commit");
        } else {
            git.init(cancel)
                .await
                .map_err(|e| FluxError::version_control("could not initialize repo", e))?;
            git.commit(cancel, SEED_COMMIT_MESSAGE)
                .await
                .map_err(|e| FluxError::version_control("initializing repository", e))?;
        }

        git.branch(cancel, ctx.branch())
            .await
            .map_err(|e| FluxError::version_control("creating branch", e))
    }
}

impl std::fmt::Debug for RepositoryProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryProvisioner")
            .field("sync", &self.sync)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
