//! Error taxonomy for GitOps provisioning and toolkit installation.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used where a failure may come from any collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while provisioning the repository or driving the toolkit.
#[derive(Error, Debug)]
pub enum FluxError {
    #[error("failed to describe repo: {source}")]
    RemoteDescribe {
        #[source]
        source: ProviderError,
    },

    #[error("Encountered an error when attempting to version control cluster config: {action}: {source}")]
    ConfigVersionControlFailed {
        action: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to bootstrap GitOps toolkit: {source}")]
    ToolkitBootstrap {
        #[source]
        source: ToolkitError,
    },

    #[error("failed syncing local git repository: {source}")]
    SyncLocalState {
        #[source]
        source: GitError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),
}

impl FluxError {
    /// Wraps a failure that blocked version-controlling the cluster configuration.
    pub fn version_control(action: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FluxError::ConfigVersionControlFailed {
            action: action.into(),
            source: source.into(),
        }
    }

    /// Returns true for failures that left the configuration un-versioned.
    pub fn is_version_control_failure(&self) -> bool {
        matches!(self, FluxError::ConfigVersionControlFailed { .. })
    }
}

/// Failures reported by a [`LocalGitClient`](crate::git::LocalGitClient).
#[derive(Error, Debug)]
pub enum GitError {
    #[error("remote repository is empty and can't be cloned")]
    RepositoryEmpty,

    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Git network error: {0}")]
    Network(String),

    #[error("Git authentication failed: {0}")]
    Auth(String),

    #[error("Git operation timed out after {0}s")]
    Timeout(u64),

    #[error("Git operation failed: {0}")]
    Operation(String),

    #[error("Git operation cancelled")]
    Cancelled,

    #[error("Git I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Returns true if the operation may succeed when attempted again.
    ///
    /// An empty remote and a cancelled call are terminal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GitError::RepositoryEmpty | GitError::Cancelled)
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitError {
    let lower = stderr.to_lowercase();

    if lower.contains("you appear to have cloned an empty repository")
        || lower.contains("remote repository is empty")
    {
        return GitError::RepositoryEmpty;
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitError::Network(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
    {
        return GitError::Auth(stderr.trim().to_string());
    }

    GitError::Operation(stderr.trim().to_string())
}

/// Failures reported by a [`RemoteRepositoryProvider`](crate::provider::RemoteRepositoryProvider).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("remote repository provider error: {0}")]
    Other(String),

    #[error("remote repository request cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Cancelled)
    }
}

/// Failures reported by a [`ToolkitClient`](crate::toolkit::ToolkitClient).
#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("toolkit call cancelled")]
    Cancelled,
}

impl ToolkitError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ToolkitError::Cancelled)
    }
}

/// Pre-flight validation failures.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("a cluster configuration file already exists at path {}", path.display())]
    LocalConfigPathExists { path: PathBuf },

    #[error("flux path {path} already exists in remote repository")]
    RemoteConfigPathExists { path: String },

    #[error("failed validating remote flux config path: {source}")]
    RemotePathCheck {
        #[source]
        source: ProviderError,
    },
}

/// Manifest generation failures.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("creating {} directory: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {} file into {}: {source}", description, path.display())]
    WriteFile {
        description: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rendering template '{template}': {reason}")]
    Render { template: String, reason: String },

    #[error("marshalling cluster spec: {0}")]
    Marshal(#[from] serde_yaml::Error),
}

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse FluxConfig YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Invalid API version '{version}', expected '{expected}'")]
    InvalidApiVersion { version: String, expected: String },

    #[error("Invalid kind '{kind}', expected 'FluxConfig'")]
    InvalidKind { kind: String },

    #[error("FluxConfig validation failed: {0}")]
    Validation(String),

    #[error("a hosted repository requires a remote repository provider")]
    MissingProvider,

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for GitOps operations.
pub type Result<T> = std::result::Result<T, FluxError>;
