//! Cluster model and the per-call operation context.

use std::path::{Path, PathBuf};

use crate::config::GitOpsConfig;

/// Directory holding the cluster's own resources under its configuration path.
pub const EKSA_SYSTEM_DIR_NAME: &str = "eksa-system";

/// The cluster an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    pub name: String,
    pub kubeconfig: PathBuf,
    /// Name of the management cluster. `None` for a self-managed cluster.
    pub managed_by: Option<String>,
    /// The cluster is an already-running management cluster; bootstrap is skipped.
    pub existing_management: bool,
}

impl ClusterContext {
    /// A self-managed cluster.
    pub fn new(name: impl Into<String>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kubeconfig: kubeconfig.into(),
            managed_by: None,
            existing_management: false,
        }
    }

    /// Marks the cluster as a workload cluster managed by `management`.
    pub fn managed_by(mut self, management: impl Into<String>) -> Self {
        self.managed_by = Some(management.into());
        self
    }

    pub fn with_existing_management(mut self, existing: bool) -> Self {
        self.existing_management = existing;
        self
    }

    pub fn is_self_managed(&self) -> bool {
        self.managed_by.is_none()
    }

    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }
}

/// Toolkit controller images written into the controller patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitImages {
    pub source_controller: String,
    pub kustomize_controller: String,
    pub helm_controller: String,
    pub notification_controller: String,
}

impl Default for ToolkitImages {
    fn default() -> Self {
        Self {
            source_controller: "ghcr.io/fluxcd/source-controller:v1.2.4".to_string(),
            kustomize_controller: "ghcr.io/fluxcd/kustomize-controller:v1.2.2".to_string(),
            helm_controller: "ghcr.io/fluxcd/helm-controller:v0.37.4".to_string(),
            notification_controller: "ghcr.io/fluxcd/notification-controller:v1.2.4"
                .to_string(),
        }
    }
}

/// Everything known about the desired cluster.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub gitops: GitOpsConfig,
    /// The cluster resource document written to `eksa-cluster.yaml`.
    pub cluster: serde_yaml::Value,
    pub toolkit_images: ToolkitImages,
}

impl ClusterSpec {
    pub fn new(gitops: GitOpsConfig, cluster: serde_yaml::Value) -> Self {
        Self {
            gitops,
            cluster,
            toolkit_images: ToolkitImages::default(),
        }
    }

    pub fn with_toolkit_images(mut self, images: ToolkitImages) -> Self {
        self.toolkit_images = images;
        self
    }
}

/// Borrowed view over one cluster operation.
///
/// Built fresh for every public call and never stored.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    spec: &'a ClusterSpec,
    cluster: &'a ClusterContext,
    datacenter: Option<&'a serde_yaml::Value>,
    machines: &'a [serde_yaml::Value],
}

impl<'a> OperationContext<'a> {
    pub fn new(spec: &'a ClusterSpec, cluster: &'a ClusterContext) -> Self {
        Self {
            spec,
            cluster,
            datacenter: None,
            machines: &[],
        }
    }

    /// Attaches the infrastructure provider's documents.
    pub fn with_provider_config(
        mut self,
        datacenter: Option<&'a serde_yaml::Value>,
        machines: &'a [serde_yaml::Value],
    ) -> Self {
        self.datacenter = datacenter;
        self.machines = machines;
        self
    }

    pub fn spec(&self) -> &'a ClusterSpec {
        self.spec
    }

    pub fn cluster(&self) -> &'a ClusterContext {
        self.cluster
    }

    pub fn gitops(&self) -> &'a GitOpsConfig {
        &self.spec.gitops
    }

    pub fn datacenter(&self) -> Option<&'a serde_yaml::Value> {
        self.datacenter
    }

    pub fn machines(&self) -> &'a [serde_yaml::Value] {
        self.machines
    }

    /// True when datacenter or machine documents were supplied.
    pub fn has_provider_config(&self) -> bool {
        self.datacenter.is_some() || !self.machines.is_empty()
    }

    pub fn branch(&self) -> &'a str {
        &self.spec.gitops.branch
    }

    pub fn namespace(&self) -> &'a str {
        &self.spec.gitops.system_namespace
    }

    /// Base configuration path inside the repository.
    pub fn path(&self) -> &'a str {
        &self.spec.gitops.cluster_config_path
    }

    pub fn repository(&self) -> String {
        self.spec.gitops.repository_name()
    }

    pub fn owner(&self) -> &'a str {
        self.spec.gitops.owner()
    }

    pub fn personal(&self) -> bool {
        self.spec.gitops.personal()
    }

    pub fn is_self_managed(&self) -> bool {
        self.cluster.is_self_managed()
    }

    /// `{path}/{cluster}/eksa-system`
    pub fn eksa_system_dir(&self) -> String {
        join_repo_path(&[self.path(), &self.cluster.name, EKSA_SYSTEM_DIR_NAME])
    }

    /// `{path}/{namespace}`
    pub fn flux_system_dir(&self) -> String {
        join_repo_path(&[self.path(), self.namespace()])
    }

    /// Directory staged after writing manifests: the parent of the base path.
    pub fn stage_dir(&self) -> String {
        parent_repo_path(self.path())
    }
}

/// Joins repository-relative path segments with `/`, skipping empty ones.
pub fn join_repo_path(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent of a repository-relative path, `.` when there is none.
pub fn parent_repo_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => ".".to_string(),
    }
}
