//! Installs the toolkit and version-controls cluster configuration.
//!
//! Every public operation is a logged no-op when no git tooling is configured.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterContext, ClusterSpec, OperationContext};
use crate::config::{CliConfig, RepositoryIdentity};
use crate::error::{ConfigError, FluxError, Result, ToolkitError, ValidationError};
use crate::git::LocalGitClient;
use crate::logging::Logger;
use crate::manifest::{ManifestGenerator, ManifestWriter};
use crate::provider::RemoteRepositoryProvider;
use crate::provisioner::RepositoryProvisioner;
use crate::retry::RetryPolicy;
use crate::sync::SyncEngine;
use crate::toolkit::ToolkitClient;

pub const INITIAL_COMMIT_MESSAGE: &str =
    "Initial commit of cluster configuration; generated by EKS-A CLI";
pub const UPDATE_COMMIT_MESSAGE: &str =
    "Update commit of cluster configuration; generated by EKS-A CLI";
pub const DELETE_COMMIT_MESSAGE: &str =
    "Delete commit of cluster configuration; generated by EKS-A CLI";

pub const FLUX_PATH_VALIDATION: &str = "Flux path";
pub const FLUX_PATH_REMEDIATION: &str = "Please provide a different path or different cluster name";

/// Git collaborators used when GitOps is configured.
#[derive(Clone)]
pub struct GitTools {
    pub client: Arc<dyn LocalGitClient>,
    /// Hosting provider. Required for hosted repositories.
    pub provider: Option<Arc<dyn RemoteRepositoryProvider>>,
    /// Writer rooted at the local working copy.
    pub writer: ManifestWriter,
}

/// Outcome of one pre-flight check.
#[derive(Debug)]
pub struct ValidationResult {
    pub name: String,
    pub remediation: String,
    pub error: Option<ValidationError>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

struct Configured {
    provider: Option<Arc<dyn RemoteRepositoryProvider>>,
    sync: SyncEngine,
    provisioner: Option<RepositoryProvisioner>,
}

/// Drives toolkit installation and the configuration repository.
pub struct ToolkitInstaller {
    toolkit: Arc<dyn ToolkitClient>,
    configured: Option<Configured>,
    cli_config: CliConfig,
    retry: RetryPolicy,
    manifests: ManifestGenerator,
    logger: Logger,
}

impl ToolkitInstaller {
    /// Creates an installer. `tools` is `None` when GitOps is not configured.
    pub fn new(
        toolkit: Arc<dyn ToolkitClient>,
        tools: Option<GitTools>,
        cli_config: CliConfig,
        logger: Logger,
    ) -> Result<Self> {
        let mut installer = Self {
            toolkit,
            configured: None,
            cli_config,
            retry: RetryPolicy::default(),
            manifests: ManifestGenerator::new()?,
            logger: logger.named("installer"),
        };
        installer.configure(tools);
        Ok(installer)
    }

    /// Replaces the retry policy used for every retried call.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        let tools = self.configured.take().map(|c| GitTools {
            client: Arc::clone(c.sync.git()),
            provider: c.provider,
            writer: c.sync.writer().clone(),
        });
        self.configure(tools);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.configured.is_some()
    }

    fn configure(&mut self, tools: Option<GitTools>) {
        self.configured = tools.map(|tools| {
            let sync = SyncEngine::new(
                tools.client,
                tools.writer,
                self.retry,
                self.logger.clone(),
            );
            let provisioner = tools.provider.as_ref().map(|provider| {
                RepositoryProvisioner::new(
                    Arc::clone(provider),
                    sync.clone(),
                    self.retry,
                    self.logger.clone(),
                )
            });
            Configured {
                provider: tools.provider,
                sync,
                provisioner,
            }
        });
    }

    /// Sets up the repository, commits the cluster configuration and
    /// bootstraps the toolkit.
    pub async fn install(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
        datacenter: Option<&serde_yaml::Value>,
        machines: &[serde_yaml::Value],
    ) -> Result<()> {
        let Some(configured) = &self.configured else {
            self.logger
                .in_scope(|| tracing::info!("GitOps field not specified, bootstrap flux skipped"));
            return Ok(());
        };

        let ctx = OperationContext::new(spec, cluster).with_provider_config(datacenter, machines);
        self.logger
            .scope("install", self.run_install(cancel, configured, &ctx))
            .await
    }

    async fn run_install(
        &self,
        cancel: &CancellationToken,
        configured: &Configured,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        self.setup_repository(cancel, configured, ctx).await?;
        self.commit_configuration(cancel, configured, ctx).await?;

        if ctx.cluster().existing_management {
            tracing::debug!("existing management cluster, skipping toolkit bootstrap");
        } else {
            self.bootstrap(cancel, ctx).await?;
        }

        tracing::debug!(
            branch = ctx.branch(),
            "pulling from remote after toolkit bootstrap"
        );
        if let Err(e) = configured.sync.pull(cancel, ctx.branch()).await {
            tracing::error!(
                branch = ctx.branch(),
                error = %e,
                "error when pulling from remote repository after toolkit bootstrap; \
                 ensure local repository is up-to-date with remote (git pull)"
            );
        }
        Ok(())
    }

    async fn setup_repository(
        &self,
        cancel: &CancellationToken,
        configured: &Configured,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        match &ctx.gitops().repository {
            RepositoryIdentity::Github { .. } => {
                let provisioner = configured
                    .provisioner
                    .as_ref()
                    .ok_or(ConfigError::MissingProvider)?;
                let outcome = provisioner.ensure_repository(cancel, ctx).await?;
                tracing::debug!(?outcome, "repository ready");
            }
            RepositoryIdentity::Git { repository_url, .. } => {
                tracing::debug!(url = %repository_url, "cloning generic git repository");
                configured
                    .sync
                    .clone_and_branch(cancel, ctx.branch())
                    .await
                    .map_err(|e| FluxError::version_control("cloning repository", e))?;
            }
        }
        Ok(())
    }

    async fn commit_configuration(
        &self,
        cancel: &CancellationToken,
        configured: &Configured,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        tracing::info!("Adding cluster configuration files to Git");
        let writer = configured.sync.writer();

        if ctx.is_self_managed() && writer.exists(ctx.path()) {
            return Err(ValidationError::LocalConfigPathExists {
                path: writer.dir().join(ctx.path()),
            }
            .into());
        }

        self.manifests.write_eksa_system_files(writer, ctx)?;

        if ctx.is_self_managed() {
            self.manifests.write_flux_system_files(writer, ctx)?;
        } else {
            tracing::debug!("Skipping flux custom manifest files");
        }

        let stage = ctx.stage_dir();
        configured
            .sync
            .git()
            .add(cancel, &stage)
            .await
            .map_err(|e| FluxError::version_control(format!("adding {stage} to git"), e))?;

        configured
            .sync
            .commit_and_push(cancel, &stage, INITIAL_COMMIT_MESSAGE)
            .await?;
        tracing::debug!("Finished pushing cluster config and flux custom manifest files to git");
        Ok(())
    }

    async fn bootstrap(&self, cancel: &CancellationToken, ctx: &OperationContext<'_>) -> Result<()> {
        let cluster = ctx.cluster();
        let config = ctx.gitops();

        let result = match &config.repository {
            RepositoryIdentity::Github { .. } => {
                self.retry
                    .retry_if("bootstrap", ToolkitError::is_retryable, || {
                        self.toolkit.bootstrap_hosted(cancel, cluster, config)
                    })
                    .await
            }
            RepositoryIdentity::Git { .. } => {
                self.retry
                    .retry_if("bootstrap", ToolkitError::is_retryable, || {
                        self.toolkit
                            .bootstrap_generic(cancel, cluster, config, &self.cli_config)
                    })
                    .await
            }
        };

        if let Err(source) = result {
            if let Err(e) = self.uninstall(cancel, ctx).await {
                tracing::info!(error = %e, "Could not uninstall flux components");
            }
            tracing::warn!("configuration commit was pushed before the failed bootstrap and is kept");
            return Err(FluxError::ToolkitBootstrap { source });
        }
        Ok(())
    }

    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        ctx: &OperationContext<'_>,
    ) -> std::result::Result<(), ToolkitError> {
        self.retry
            .retry_if("uninstall", ToolkitError::is_retryable, || {
                self.toolkit.uninstall(cancel, ctx.cluster(), ctx.gitops())
            })
            .await
    }

    /// Writes the updated cluster configuration and pushes it.
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
        datacenter: Option<&serde_yaml::Value>,
        machines: &[serde_yaml::Value],
    ) -> Result<()> {
        let Some(configured) = &self.configured else {
            self.logger
                .in_scope(|| tracing::info!("GitOps field not specified, update git repo skipped"));
            return Ok(());
        };

        let ctx = OperationContext::new(spec, cluster).with_provider_config(datacenter, machines);
        self.logger
            .scope("update", self.run_update(cancel, configured, &ctx))
            .await
    }

    async fn run_update(
        &self,
        cancel: &CancellationToken,
        configured: &Configured,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        configured.sync.sync_local_state(cancel, ctx).await?;
        self.manifests
            .write_eksa_system_files(configured.sync.writer(), ctx)?;

        let path = ctx.eksa_system_dir();
        configured
            .sync
            .git()
            .add(cancel, &path)
            .await
            .map_err(|e| FluxError::version_control(format!("adding {path} to git"), e))?;

        configured
            .sync
            .commit_and_push(cancel, &path, UPDATE_COMMIT_MESSAGE)
            .await?;
        tracing::debug!(
            repository = %ctx.repository(),
            "Finished pushing updated cluster config file to git"
        );
        Ok(())
    }

    /// Removes the cluster's files from the repository.
    ///
    /// Workload clusters remove their eksa-system directory; self-managed
    /// clusters remove the whole configuration path.
    pub async fn cleanup(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
    ) -> Result<()> {
        let Some(configured) = &self.configured else {
            self.logger
                .in_scope(|| tracing::info!("GitOps field not specified, clean up git repo skipped"));
            return Ok(());
        };

        let ctx = OperationContext::new(spec, cluster);
        self.logger
            .scope("cleanup", self.run_cleanup(cancel, configured, &ctx))
            .await
    }

    async fn run_cleanup(
        &self,
        cancel: &CancellationToken,
        configured: &Configured,
        ctx: &OperationContext<'_>,
    ) -> Result<()> {
        configured.sync.sync_local_state(cancel, ctx).await?;

        let path = if ctx.is_self_managed() {
            ctx.path().to_string()
        } else {
            ctx.eksa_system_dir()
        };

        if !configured.sync.writer().exists(&path) {
            tracing::debug!(path = %path, "cluster dir does not exist in git, skip clean up");
            return Ok(());
        }

        configured
            .sync
            .git()
            .remove(cancel, &path)
            .await
            .map_err(|e| FluxError::version_control(format!("removing {path} in git"), e))?;

        configured
            .sync
            .commit_and_push(cancel, &path, DELETE_COMMIT_MESSAGE)
            .await?;
        tracing::debug!(
            repository = %ctx.repository(),
            "Finished cleaning up cluster files in git"
        );
        Ok(())
    }

    /// Pauses reconciliation of the root kustomization.
    pub async fn suspend(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
    ) -> Result<()> {
        if !self.is_configured() {
            self.logger.in_scope(|| {
                tracing::info!("GitOps field not specified, pause flux kustomization skipped")
            });
            return Ok(());
        }

        self.logger
            .scope("suspend", async {
                tracing::debug!(
                    namespace = %spec.gitops.system_namespace,
                    "pause reconciliation of all Kustomization"
                );
                self.retry
                    .retry_if("suspend", ToolkitError::is_retryable, || {
                        self.toolkit.suspend(cancel, cluster, &spec.gitops)
                    })
                    .await
                    .map_err(FluxError::from)
            })
            .await
    }

    /// Resumes reconciliation of the root kustomization.
    pub async fn resume(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
    ) -> Result<()> {
        if !self.is_configured() {
            self.logger.in_scope(|| {
                tracing::info!("GitOps field not specified, resume flux kustomization skipped")
            });
            return Ok(());
        }

        self.logger
            .scope("resume", async {
                tracing::debug!(
                    namespace = %spec.gitops.system_namespace,
                    "resume reconciliation of all Kustomization"
                );
                self.retry
                    .retry_if("resume", ToolkitError::is_retryable, || {
                        self.toolkit.resume(cancel, cluster, &spec.gitops)
                    })
                    .await
                    .map_err(FluxError::from)
            })
            .await
    }

    /// Makes the toolkit fetch the latest commit. Attempted once.
    pub async fn force_reconcile(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
    ) -> Result<()> {
        if !self.is_configured() {
            self.logger.in_scope(|| {
                tracing::info!("GitOps not configured, force reconcile flux git repo skipped")
            });
            return Ok(());
        }

        self.logger
            .scope("force_reconcile", async {
                self.toolkit
                    .force_reconcile(cancel, cluster, &spec.gitops.system_namespace)
                    .await
                    .map_err(FluxError::from)
            })
            .await
    }

    /// Deletes the toolkit's git credentials secret. Attempted once.
    pub async fn delete_system_secret(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
    ) -> Result<()> {
        if !self.is_configured() {
            self.logger.in_scope(|| {
                tracing::info!("GitOps not configured, delete flux system secret skipped")
            });
            return Ok(());
        }

        self.logger
            .scope("delete_system_secret", async {
                self.toolkit
                    .delete_system_secret(cancel, cluster, &spec.gitops.system_namespace)
                    .await
                    .map_err(FluxError::from)
            })
            .await
    }

    /// Pre-flight checks. Empty when GitOps is not configured.
    pub async fn validations(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        spec: &ClusterSpec,
    ) -> Vec<ValidationResult> {
        let Some(configured) = &self.configured else {
            return Vec::new();
        };

        let ctx = OperationContext::new(spec, cluster);
        let error = self
            .logger
            .scope("validations", remote_path_check(cancel, configured, &ctx))
            .await;

        vec![ValidationResult {
            name: FLUX_PATH_VALIDATION.to_string(),
            remediation: FLUX_PATH_REMEDIATION.to_string(),
            error,
        }]
    }
}

async fn remote_path_check(
    cancel: &CancellationToken,
    configured: &Configured,
    ctx: &OperationContext<'_>,
) -> Option<ValidationError> {
    if !ctx.is_self_managed() {
        return None;
    }
    let provider = configured.provider.as_ref()?;

    match provider
        .path_exists(cancel, ctx.owner(), &ctx.repository(), ctx.branch(), ctx.path())
        .await
    {
        Ok(true) => Some(ValidationError::RemoteConfigPathExists {
            path: ctx.path().to_string(),
        }),
        Ok(false) => None,
        Err(source) => Some(ValidationError::RemotePathCheck { source }),
    }
}

impl std::fmt::Debug for ToolkitInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolkitInstaller")
            .field("configured", &self.is_configured())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
