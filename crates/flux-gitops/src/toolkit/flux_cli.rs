//! [`ToolkitClient`] over the `flux` and `kubectl` binaries.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;

use super::ToolkitClient;
use crate::cluster::ClusterContext;
use crate::config::{CliConfig, GitOpsConfig, RepositoryIdentity};
use crate::error::ToolkitError;

/// Name of the toolkit's own git source, kustomization and secret.
pub const FLUX_SYSTEM: &str = "flux-system";

const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const SSH_KNOWN_HOSTS_ENV: &str = "SSH_KNOWN_HOSTS";

/// Toolkit client shelling out to `flux` and `kubectl`.
#[derive(Debug, Clone)]
pub struct FluxCli {
    flux: PathBuf,
    kubectl: PathBuf,
    github_token: Option<SecretString>,
}

impl Default for FluxCli {
    fn default() -> Self {
        Self::new()
    }
}

impl FluxCli {
    pub fn new() -> Self {
        Self {
            flux: PathBuf::from("flux"),
            kubectl: PathBuf::from("kubectl"),
            github_token: None,
        }
    }

    pub fn with_flux_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.flux = path.into();
        self
    }

    pub fn with_kubectl_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubectl = path.into();
        self
    }

    /// Token handed to `flux bootstrap github`.
    pub fn with_github_token(mut self, token: SecretString) -> Self {
        self.github_token = Some(token);
        self
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        program: &Path,
        args: Vec<String>,
        env: Vec<(&'static str, String)>,
    ) -> Result<(), ToolkitError> {
        let command = format!(
            "{} {}",
            program.display(),
            args.first().map(String::as_str).unwrap_or_default()
        );
        tracing::debug!(command = %command, "executing toolkit command");

        let mut cmd = TokioCommand::new(program);
        cmd.args(&args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ToolkitError::Spawn {
            command: command.clone(),
            source: e,
        })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolkitError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| ToolkitError::Spawn {
                command: command.clone(),
                source: e,
            })?,
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exit code {}", output.status.code().unwrap_or(-1))
        } else {
            stderr
        };
        Err(ToolkitError::CommandFailed { command, message })
    }
}

fn kubeconfig_args(cluster: &ClusterContext) -> [String; 2] {
    [
        "--kubeconfig".to_string(),
        cluster.kubeconfig().display().to_string(),
    ]
}

/// Arguments for `flux bootstrap github`.
pub fn bootstrap_github_args(cluster: &ClusterContext, config: &GitOpsConfig) -> Vec<String> {
    let mut args = vec![
        "bootstrap".to_string(),
        "github".to_string(),
        "--repository".to_string(),
        config.repository_name(),
        "--owner".to_string(),
        config.owner().to_string(),
        "--path".to_string(),
        config.cluster_config_path.clone(),
        "--branch".to_string(),
        config.branch.clone(),
        "--namespace".to_string(),
        config.system_namespace.clone(),
    ];
    if config.personal() {
        args.push("--personal".to_string());
    }
    if !config.private {
        args.push("--private=false".to_string());
    }
    args.extend(kubeconfig_args(cluster));
    args
}

/// Arguments for `flux bootstrap git`.
pub fn bootstrap_git_args(
    cluster: &ClusterContext,
    config: &GitOpsConfig,
    cli: &CliConfig,
) -> Vec<String> {
    let mut args = vec!["bootstrap".to_string(), "git".to_string()];
    if let RepositoryIdentity::Git {
        repository_url,
        ssh_key_algorithm,
    } = &config.repository
    {
        args.extend(["--url".to_string(), repository_url.clone()]);
        if let Some(algorithm) = ssh_key_algorithm {
            args.extend(["--ssh-key-algorithm".to_string(), algorithm.clone()]);
        }
    }
    args.extend([
        "--path".to_string(),
        config.cluster_config_path.clone(),
        "--branch".to_string(),
        config.branch.clone(),
        "--namespace".to_string(),
        config.system_namespace.clone(),
        "--silent".to_string(),
    ]);
    if let Some(key) = &cli.git_private_key_file {
        args.extend(["--private-key-file".to_string(), key.display().to_string()]);
    }
    args.extend(kubeconfig_args(cluster));
    args
}

fn namespaced(mut args: Vec<String>, namespace: &str, cluster: &ClusterContext) -> Vec<String> {
    args.extend(["--namespace".to_string(), namespace.to_string()]);
    args.extend(kubeconfig_args(cluster));
    args
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[async_trait]
impl ToolkitClient for FluxCli {
    async fn bootstrap_hosted(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        let mut env = Vec::new();
        if let Some(token) = &self.github_token {
            env.push((GITHUB_TOKEN_ENV, token.expose_secret().to_string()));
        }
        self.execute(cancel, &self.flux, bootstrap_github_args(cluster, config), env)
            .await
    }

    async fn bootstrap_generic(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
        cli_config: &CliConfig,
    ) -> Result<(), ToolkitError> {
        let mut args = bootstrap_git_args(cluster, config, cli_config);
        if let Some(passphrase) = &cli_config.git_ssh_key_passphrase {
            args.extend(["--password".to_string(), passphrase.expose_secret().to_string()]);
        }

        let mut env = Vec::new();
        if let Some(hosts) = &cli_config.git_known_hosts_file {
            env.push((SSH_KNOWN_HOSTS_ENV, hosts.display().to_string()));
        }
        self.execute(cancel, &self.flux, args, env).await
    }

    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        let args = namespaced(
            strings(&["uninstall", "--silent"]),
            &config.system_namespace,
            cluster,
        );
        self.execute(cancel, &self.flux, args, Vec::new()).await
    }

    async fn suspend(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        let args = namespaced(
            strings(&["suspend", "ks", FLUX_SYSTEM]),
            &config.system_namespace,
            cluster,
        );
        self.execute(cancel, &self.flux, args, Vec::new()).await
    }

    async fn resume(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        let args = namespaced(
            strings(&["resume", "ks", FLUX_SYSTEM]),
            &config.system_namespace,
            cluster,
        );
        self.execute(cancel, &self.flux, args, Vec::new()).await
    }

    async fn force_reconcile(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        namespace: &str,
    ) -> Result<(), ToolkitError> {
        let args = namespaced(
            strings(&["reconcile", "source", "git", FLUX_SYSTEM]),
            namespace,
            cluster,
        );
        self.execute(cancel, &self.flux, args, Vec::new()).await
    }

    async fn delete_system_secret(
        &self,
        cancel: &CancellationToken,
        cluster: &ClusterContext,
        namespace: &str,
    ) -> Result<(), ToolkitError> {
        let args = namespaced(
            strings(&["delete", "secret", FLUX_SYSTEM, "--ignore-not-found"]),
            namespace,
            cluster,
        );
        self.execute(cancel, &self.kubectl, args, Vec::new()).await
    }
}
