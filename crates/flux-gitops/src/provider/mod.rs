//! Remote repository hosting providers.

pub mod github;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

pub use github::GithubProvider;

/// Description of a repository on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub owner: String,
    pub name: String,
    pub clone_url: String,
    /// The repository has no commits and cannot be cloned.
    #[serde(default)]
    pub empty: bool,
}

/// Options for creating a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRepoOpts {
    pub name: String,
    pub owner: String,
    pub description: String,
    pub personal: bool,
    pub private: bool,
}

/// A repository hosting provider bound to one owner/repository pair.
#[async_trait]
pub trait RemoteRepositoryProvider: Send + Sync {
    /// Describes the configured repository. `None` when it does not exist.
    async fn get_repo(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteRepository>, ProviderError>;

    async fn create_repo(
        &self,
        cancel: &CancellationToken,
        opts: &CreateRepoOpts,
    ) -> Result<RemoteRepository, ProviderError>;

    /// Returns true when `path` exists on `branch`.
    async fn path_exists(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool, ProviderError>;
}
