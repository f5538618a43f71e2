//! Local working-copy operations.

pub mod auth;
pub mod cli;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::GitError;

pub use auth::GitAuth;
pub use cli::GitCli;

/// A local git working copy bound to one remote.
///
/// Every call takes the operation's cancellation token.
#[async_trait]
pub trait LocalGitClient: Send + Sync {
    /// Clones the remote into the working directory.
    ///
    /// Fails with [`GitError::RepositoryEmpty`] when the remote has no commits.
    async fn clone_repo(&self, cancel: &CancellationToken) -> Result<(), GitError>;

    /// Initializes an empty repository pointing at the remote.
    async fn init(&self, cancel: &CancellationToken) -> Result<(), GitError>;

    /// Switches to `name`, creating it when it does not exist.
    async fn branch(&self, cancel: &CancellationToken, name: &str) -> Result<(), GitError>;

    /// Stages a repository-relative path.
    async fn add(&self, cancel: &CancellationToken, path: &str) -> Result<(), GitError>;

    /// Removes a repository-relative path from the index and working tree.
    async fn remove(&self, cancel: &CancellationToken, path: &str) -> Result<(), GitError>;

    async fn commit(&self, cancel: &CancellationToken, message: &str) -> Result<(), GitError>;

    async fn push(&self, cancel: &CancellationToken) -> Result<(), GitError>;

    async fn pull(&self, cancel: &CancellationToken, branch: &str) -> Result<(), GitError>;
}
