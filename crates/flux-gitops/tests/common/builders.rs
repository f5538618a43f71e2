//! Builders for cluster specs and a wired-up installer harness.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flux_gitops::{
    ClusterContext, ClusterSpec, CliConfig, GitOpsConfig, GitTools, Logger, ManifestWriter,
    RepositoryIdentity, RetryPolicy, ToolkitInstaller,
};
use tempfile::TempDir;

use super::fakes::{CallLog, FakeGit, FakeProvider, FakeToolkit};

pub const CLUSTER_PATH: &str = "clusters/mgmt";

pub fn github_gitops() -> GitOpsConfig {
    GitOpsConfig {
        branch: "main".to_string(),
        cluster_config_path: CLUSTER_PATH.to_string(),
        system_namespace: "flux-system".to_string(),
        repository: RepositoryIdentity::Github {
            owner: "acme".to_string(),
            repository: "fleet".to_string(),
            personal: false,
        },
        private: true,
    }
}

pub fn git_gitops() -> GitOpsConfig {
    GitOpsConfig {
        repository: RepositoryIdentity::Git {
            repository_url: "ssh://git@git.example.com/platform/fleet.git".to_string(),
            ssh_key_algorithm: None,
        },
        ..github_gitops()
    }
}

pub fn cluster_spec(gitops: GitOpsConfig) -> ClusterSpec {
    let cluster = serde_yaml::from_str(
        "apiVersion: anywhere.eks.amazonaws.com/v1alpha1\n\
         kind: Cluster\n\
         metadata:\n  name: mgmt\n",
    )
    .unwrap();
    ClusterSpec::new(gitops, cluster)
}

pub fn datacenter() -> serde_yaml::Value {
    serde_yaml::from_str(
        "apiVersion: anywhere.eks.amazonaws.com/v1alpha1\n\
         kind: VSphereDatacenterConfig\n\
         metadata:\n  name: mgmt\n",
    )
    .unwrap()
}

pub fn machine(name: &str) -> serde_yaml::Value {
    serde_yaml::from_str(&format!(
        "apiVersion: anywhere.eks.amazonaws.com/v1alpha1\n\
         kind: VSphereMachineConfig\n\
         metadata:\n  name: {name}\n"
    ))
    .unwrap()
}

pub fn self_managed() -> ClusterContext {
    ClusterContext::new("mgmt", "/tmp/mgmt.kubeconfig")
}

pub fn workload() -> ClusterContext {
    ClusterContext::new("w01", "/tmp/w01.kubeconfig").managed_by("mgmt")
}

/// Fakes wired into an installer over a temporary working copy.
pub struct Harness {
    pub temp: TempDir,
    pub log: CallLog,
    pub git: Arc<FakeGit>,
    pub provider: Arc<FakeProvider>,
    pub toolkit: Arc<FakeToolkit>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(|p| p)
    }

    /// Harness whose provider is adjusted by `configure` before wiring.
    pub fn with_provider(configure: impl FnOnce(FakeProvider) -> FakeProvider) -> Self {
        let temp = TempDir::new().unwrap();
        let log = CallLog::default();
        Self {
            git: Arc::new(FakeGit::new(temp.path(), log.clone())),
            provider: Arc::new(configure(FakeProvider::new(log.clone()))),
            toolkit: Arc::new(FakeToolkit::new(log.clone())),
            temp,
            log,
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.temp.path()
    }

    pub fn writer(&self) -> ManifestWriter {
        ManifestWriter::new(self.temp.path())
    }

    pub fn tools(&self) -> GitTools {
        GitTools {
            client: self.git.clone(),
            provider: Some(self.provider.clone()),
            writer: self.writer(),
        }
    }

    /// Installer with retries that never sleep.
    pub fn installer(&self) -> ToolkitInstaller {
        self.installer_with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    pub fn installer_with_retry(&self, retry: RetryPolicy) -> ToolkitInstaller {
        ToolkitInstaller::new(
            self.toolkit.clone(),
            Some(self.tools()),
            CliConfig::default(),
            Logger::discard(),
        )
        .unwrap()
        .with_retry_policy(retry)
    }

    pub fn unconfigured_installer(&self) -> ToolkitInstaller {
        ToolkitInstaller::new(
            self.toolkit.clone(),
            None,
            CliConfig::default(),
            Logger::discard(),
        )
        .unwrap()
    }

    /// Creates `.git` as if a working copy were already present.
    pub fn seed_working_copy(&self) {
        std::fs::create_dir_all(self.temp.path().join(".git")).unwrap();
    }

    pub fn seed_dir(&self, relative: &str) {
        std::fs::create_dir_all(self.temp.path().join(relative)).unwrap();
    }
}
