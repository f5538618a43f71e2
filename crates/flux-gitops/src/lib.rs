//! GitOps repository provisioning and Flux toolkit installation.
//!
//! This crate turns a cluster's GitOps configuration into:
//! - a remote configuration repository, created when missing
//! - a local working copy on the configured branch
//! - committed and pushed cluster manifests
//! - a bootstrapped, suspendable toolkit inside the cluster
//!
//! Git, the hosting provider and the toolkit are reached through the
//! [`LocalGitClient`], [`RemoteRepositoryProvider`] and [`ToolkitClient`]
//! traits. [`GitCli`], [`GithubProvider`] and [`FluxCli`] implement them over
//! the real tools.

pub mod cluster;
pub mod config;
pub mod error;
pub mod git;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod provider;
pub mod provisioner;
pub mod retry;
pub mod sync;
pub mod toolkit;

pub use cluster::{ClusterContext, ClusterSpec, OperationContext, ToolkitImages};
pub use config::{
    load_flux_config, load_flux_config_from_str, CliConfig, FluxConfig, FluxConfigSpec,
    GitOpsConfig, RepositoryIdentity, RetrySettings,
};
pub use error::{
    ConfigError, FluxError, GitError, ManifestError, ProviderError, Result, ToolkitError,
    ValidationError,
};
pub use git::{GitAuth, GitCli, LocalGitClient};
pub use installer::{GitTools, ToolkitInstaller, ValidationResult};
pub use logging::{LogConfig, Logger};
pub use manifest::{ManifestGenerator, ManifestWriter};
pub use provider::{CreateRepoOpts, GithubProvider, RemoteRepository, RemoteRepositoryProvider};
pub use provisioner::{ProvisionOutcome, RepositoryProvisioner};
pub use retry::RetryPolicy;
pub use sync::SyncEngine;
pub use toolkit::{FluxCli, ToolkitClient};

/// Re-exported so callers can build tokens without a direct dependency.
pub use tokio_util::sync::CancellationToken;
