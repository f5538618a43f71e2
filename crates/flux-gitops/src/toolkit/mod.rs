//! The reconciliation toolkit running inside the cluster.

pub mod flux_cli;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterContext;
use crate::config::{CliConfig, GitOpsConfig};
use crate::error::ToolkitError;

pub use flux_cli::FluxCli;

#[async_trait]
pub trait ToolkitClient: Send + Sync {
    /// Bootstraps the toolkit against a hosted repository.
    async fn bootstrap_hosted(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError>;

    /// Bootstraps the toolkit against a generic git repository.
    async fn bootstrap_generic(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
        cli_config: &CliConfig,
    ) -> Result<(), ToolkitError>;

    /// Removes the toolkit components from the cluster.
    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError>;

    /// Pauses reconciliation of the root kustomization.
    async fn suspend(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError>;

    async fn resume(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError>;

    /// Makes the toolkit fetch the latest commit of its git source.
    async fn force_reconcile(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        namespace: &str,
    ) -> Result<(), ToolkitError>;

    async fn delete_system_secret(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        namespace: &str,
    ) -> Result<(), ToolkitError>;
}
