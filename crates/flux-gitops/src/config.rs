//! GitOps configuration: the `FluxConfig` resource and its resolved form.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::{RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};

/// API version of the `FluxConfig` resource.
pub const API_VERSION: &str = "anywhere.eks.amazonaws.com/v1alpha1";
/// Kind of the `FluxConfig` resource.
pub const FLUX_CONFIG_KIND: &str = "FluxConfig";

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "flux-system";
pub const DEFAULT_CLUSTER_CONFIG_DIR: &str = "clusters";

pub const ENV_GIT_PRIVATE_KEY: &str = "EKSA_GIT_PRIVATE_KEY";
pub const ENV_GIT_KNOWN_HOSTS: &str = "EKSA_GIT_KNOWN_HOSTS";
pub const ENV_GIT_SSH_KEY_PASSPHRASE: &str = "EKSA_GIT_SSH_KEY_PASSPHRASE";

const REPO_NAME_PATTERN: &str = r"^[A-Za-z0-9_.-]+$";
const BRANCH_PATTERN: &str = r"^[A-Za-z0-9._/-]+$";

fn matches_pattern(pattern: &str, value: &str) -> Result<bool, ConfigError> {
    let re = Regex::new(pattern)
        .map_err(|e| ConfigError::Validation(format!("invalid pattern '{pattern}': {e}")))?;
    Ok(re.is_match(value))
}

/// Resource metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// The `FluxConfig` resource as written by users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: FluxConfigSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxConfigSpec {
    /// Namespace the toolkit controllers run in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_namespace: String,

    /// Repository path holding cluster configuration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_config_path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitProviderConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubProviderConfig {
    pub owner: String,
    pub repository: String,
    /// The owner is a user account rather than an organization.
    #[serde(default)]
    pub personal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitProviderConfig {
    pub repository_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_algorithm: Option<String>,
}

/// Loads a `FluxConfig` from a YAML file.
pub fn load_flux_config<P: AsRef<Path>>(path: P) -> Result<FluxConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_flux_config_from_str(&content)
}

/// Parses and validates a `FluxConfig` document.
pub fn load_flux_config_from_str(content: &str) -> Result<FluxConfig, ConfigError> {
    let config: FluxConfig = serde_yaml::from_str(content)?;
    validate_flux_config(&config)?;
    Ok(config)
}

fn validate_flux_config(config: &FluxConfig) -> Result<(), ConfigError> {
    if config.api_version != API_VERSION {
        return Err(ConfigError::InvalidApiVersion {
            version: config.api_version.clone(),
            expected: API_VERSION.to_string(),
        });
    }
    if config.kind != FLUX_CONFIG_KIND {
        return Err(ConfigError::InvalidKind {
            kind: config.kind.clone(),
        });
    }

    let spec = &config.spec;
    match (&spec.github, &spec.git) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::Validation(
                "must specify only one provider: github or git".to_string(),
            ))
        }
        (None, None) => {
            return Err(ConfigError::Validation(
                "must specify a provider: github or git".to_string(),
            ))
        }
        (Some(github), None) => {
            if github.owner.is_empty() {
                return Err(ConfigError::Validation(
                    "github owner must be specified".to_string(),
                ));
            }
            if !matches_pattern(REPO_NAME_PATTERN, &github.repository)? {
                return Err(ConfigError::Validation(format!(
                    "invalid github repository name '{}'",
                    github.repository
                )));
            }
        }
        (None, Some(git)) => {
            if git.repository_url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "git repositoryUrl must be specified".to_string(),
                ));
            }
        }
    }

    if !spec.branch.is_empty() {
        validate_branch_name(&spec.branch)?;
    }

    Ok(())
}

fn validate_branch_name(branch: &str) -> Result<(), ConfigError> {
    let invalid = !matches_pattern(BRANCH_PATTERN, branch)?
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("//");
    if invalid {
        return Err(ConfigError::Validation(format!(
            "invalid branch name '{branch}'"
        )));
    }
    Ok(())
}

/// Where the configuration repository is hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryIdentity {
    /// A repository on a hosting provider that can be described and created.
    Github {
        owner: String,
        repository: String,
        personal: bool,
    },
    /// A pre-existing repository reachable at a git URL.
    Git {
        repository_url: String,
        ssh_key_algorithm: Option<String>,
    },
}

/// Resolved GitOps configuration, immutable for the duration of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOpsConfig {
    pub branch: String,
    pub cluster_config_path: String,
    pub system_namespace: String,
    pub repository: RepositoryIdentity,
    pub private: bool,
}

impl GitOpsConfig {
    /// Resolves a validated `FluxConfig`, filling defaults for `cluster_name`.
    pub fn from_flux_config(config: &FluxConfig, cluster_name: &str) -> Result<Self, ConfigError> {
        validate_flux_config(config)?;
        let spec = &config.spec;

        let repository = match (&spec.github, &spec.git) {
            (Some(github), _) => RepositoryIdentity::Github {
                owner: github.owner.clone(),
                repository: github.repository.clone(),
                personal: github.personal,
            },
            (None, Some(git)) => RepositoryIdentity::Git {
                repository_url: git.repository_url.clone(),
                ssh_key_algorithm: git.ssh_key_algorithm.clone(),
            },
            (None, None) => {
                return Err(ConfigError::Validation(
                    "must specify a provider: github or git".to_string(),
                ))
            }
        };

        Ok(Self {
            branch: non_empty_or(&spec.branch, DEFAULT_BRANCH),
            cluster_config_path: non_empty_or(
                &spec.cluster_config_path,
                &format!("{DEFAULT_CLUSTER_CONFIG_DIR}/{cluster_name}"),
            ),
            system_namespace: non_empty_or(&spec.system_namespace, DEFAULT_SYSTEM_NAMESPACE),
            repository,
            private: true,
        })
    }

    /// Returns true when the repository lives on a hosting provider.
    pub fn is_hosted(&self) -> bool {
        matches!(self.repository, RepositoryIdentity::Github { .. })
    }

    /// Repository name. For generic URLs this is the last path segment
    /// without its extension.
    pub fn repository_name(&self) -> String {
        match &self.repository {
            RepositoryIdentity::Github { repository, .. } => repository.clone(),
            RepositoryIdentity::Git { repository_url, .. } => repo_name_from_url(repository_url),
        }
    }

    /// Repository owner. Empty for generic URLs.
    pub fn owner(&self) -> &str {
        match &self.repository {
            RepositoryIdentity::Github { owner, .. } => owner,
            RepositoryIdentity::Git { .. } => "",
        }
    }

    pub fn personal(&self) -> bool {
        match &self.repository {
            RepositoryIdentity::Github { personal, .. } => *personal,
            RepositoryIdentity::Git { .. } => false,
        }
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn repo_name_from_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    let last_segment_start = url.rfind('/').map(|i| i + 1).unwrap_or(0);
    let without_ext = match url[last_segment_start..].rfind('.') {
        Some(dot) => &url[..last_segment_start + dot],
        None => url,
    };
    without_ext
        .rsplit('/')
        .next()
        .unwrap_or(without_ext)
        .to_string()
}

/// Credentials for bootstrapping against a generic git repository.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub git_private_key_file: Option<PathBuf>,
    pub git_known_hosts_file: Option<PathBuf>,
    pub git_ssh_key_passphrase: Option<SecretString>,
}

impl CliConfig {
    /// Reads the generic git credentials from the environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            git_private_key_file: var(ENV_GIT_PRIVATE_KEY).map(PathBuf::from),
            git_known_hosts_file: var(ENV_GIT_KNOWN_HOSTS).map(PathBuf::from),
            git_ssh_key_passphrase: var(ENV_GIT_SSH_KEY_PASSPHRASE).map(SecretString::from),
        }
    }
}

/// Retry settings as they appear in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_secs() -> u64 {
    DEFAULT_DELAY.as_secs()
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl RetrySettings {
    pub fn into_policy(self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    const GITHUB_CONFIG: &str = r#"
apiVersion: anywhere.eks.amazonaws.com/v1alpha1
kind: FluxConfig
metadata:
  name: mgmt-flux
spec:
  github:
    owner: acme
    repository: fleet-infra
    personal: true
"#;

    const GIT_CONFIG: &str = r#"
apiVersion: anywhere.eks.amazonaws.com/v1alpha1
kind: FluxConfig
metadata:
  name: mgmt-flux
spec:
  branch: production
  clusterConfigPath: infra/clusters
  systemNamespace: gitops
  git:
    repositoryUrl: ssh://git@git.example.com/platform/fleet.git
    sshKeyAlgorithm: ecdsa
"#;

    #[test]
    fn test_github_config_defaults() {
        let flux = load_flux_config_from_str(GITHUB_CONFIG).unwrap();
        let config = GitOpsConfig::from_flux_config(&flux, "mgmt").unwrap();

        assert_eq!(config.branch, "main");
        assert_eq!(config.system_namespace, "flux-system");
        assert_eq!(config.cluster_config_path, "clusters/mgmt");
        assert!(config.is_hosted());
        assert!(config.personal());
        assert!(config.private);
        assert_eq!(config.owner(), "acme");
        assert_eq!(config.repository_name(), "fleet-infra");
    }

    #[test]
    fn test_git_config_explicit_values() {
        let flux = load_flux_config_from_str(GIT_CONFIG).unwrap();
        let config = GitOpsConfig::from_flux_config(&flux, "mgmt").unwrap();

        assert_eq!(config.branch, "production");
        assert_eq!(config.cluster_config_path, "infra/clusters");
        assert_eq!(config.system_namespace, "gitops");
        assert!(!config.is_hosted());
        assert_eq!(config.owner(), "");
        assert!(!config.personal());
        assert_eq!(config.repository_name(), "fleet");
    }

    #[test]
    fn test_repo_name_from_scp_style_url() {
        assert_eq!(repo_name_from_url("git@github.com:acme/fleet.git"), "fleet");
        assert_eq!(repo_name_from_url("https://example.com/acme/fleet/"), "fleet");
        assert_eq!(repo_name_from_url("https://example.com/acme/fleet"), "fleet");
    }

    #[test]
    fn test_rejects_both_providers() {
        let yaml = r#"
apiVersion: anywhere.eks.amazonaws.com/v1alpha1
kind: FluxConfig
spec:
  github: { owner: acme, repository: fleet }
  git: { repositoryUrl: "ssh://git@example.com/fleet.git" }
"#;
        let err = load_flux_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("only one provider"));
    }

    #[test]
    fn test_rejects_missing_provider() {
        let yaml = r#"
apiVersion: anywhere.eks.amazonaws.com/v1alpha1
kind: FluxConfig
spec:
  branch: main
"#;
        assert!(matches!(
            load_flux_config_from_str(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_api_version() {
        let yaml = GITHUB_CONFIG.replace("v1alpha1", "v1beta9");
        assert!(matches!(
            load_flux_config_from_str(&yaml),
            Err(ConfigError::InvalidApiVersion { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_branch() {
        for branch in ["-main", "feature..x", "a b", "topic.lock", "trailing/"] {
            let yaml = format!("{GITHUB_CONFIG}  branch: \"{branch}\"\n");
            assert!(
                load_flux_config_from_str(&yaml).is_err(),
                "branch {branch:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flux.yaml");
        std::fs::write(&path, GIT_CONFIG).unwrap();

        let flux = load_flux_config(&path).unwrap();
        assert_eq!(flux.metadata.name, "mgmt-flux");

        let missing = load_flux_config(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_retry_settings() {
        let settings: RetrySettings = serde_yaml::from_str("maxAttempts: 2").unwrap();
        assert_eq!(settings.delay_secs, 5);
        let policy = settings.into_policy();
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_cli_config_from_env() {
        std::env::set_var(ENV_GIT_PRIVATE_KEY, "/keys/id_ecdsa");
        std::env::set_var(ENV_GIT_KNOWN_HOSTS, "/keys/known_hosts");
        std::env::set_var(ENV_GIT_SSH_KEY_PASSPHRASE, "hunter2");

        let cli = CliConfig::from_env();
        assert_eq!(cli.git_private_key_file, Some(PathBuf::from("/keys/id_ecdsa")));
        assert_eq!(cli.git_known_hosts_file, Some(PathBuf::from("/keys/known_hosts")));
        assert_eq!(
            cli.git_ssh_key_passphrase.as_ref().map(|s| s.expose_secret()),
            Some("hunter2")
        );

        std::env::remove_var(ENV_GIT_PRIVATE_KEY);
        std::env::remove_var(ENV_GIT_KNOWN_HOSTS);
        std::env::remove_var(ENV_GIT_SSH_KEY_PASSPHRASE);

        let cli = CliConfig::from_env();
        assert!(cli.git_private_key_file.is_none());
        assert!(cli.git_ssh_key_passphrase.is_none());
    }
}
