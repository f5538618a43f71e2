//! Recording fakes for the collaborator traits.
//!
//! All fakes share one [`CallLog`] so tests can assert on the exact order of
//! calls across git, the hosting provider and the toolkit.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flux_gitops::{
    ClusterContext, CliConfig, CreateRepoOpts, GitError, GitOpsConfig, LocalGitClient,
    ProviderError, RemoteRepository, RemoteRepositoryProvider, ToolkitClient, ToolkitError,
};
use tokio_util::sync::CancellationToken;

/// Ordered record of collaborator calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Scripted failures: queued ones are consumed first, then `always` applies.
pub struct Failures<E> {
    queued: Mutex<VecDeque<fn() -> E>>,
    always: Mutex<Option<fn() -> E>>,
}

impl<E> Default for Failures<E> {
    fn default() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
        }
    }
}

impl<E> Failures<E> {
    pub fn push(&self, err: fn() -> E) {
        self.queued.lock().unwrap().push_back(err);
    }

    pub fn always(&self, err: fn() -> E) {
        *self.always.lock().unwrap() = Some(err);
    }

    fn next(&self) -> Result<(), E> {
        if let Some(err) = self.queued.lock().unwrap().pop_front() {
            return Err(err());
        }
        match *self.always.lock().unwrap() {
            Some(err) => Err(err()),
            None => Ok(()),
        }
    }
}

pub fn network_error() -> GitError {
    GitError::Network("connection refused".to_string())
}

pub fn empty_repository() -> GitError {
    GitError::RepositoryEmpty
}

pub fn toolkit_failure() -> ToolkitError {
    ToolkitError::CommandFailed {
        command: "flux bootstrap".to_string(),
        message: "timed out waiting for controllers".to_string(),
    }
}

pub fn provider_failure() -> ProviderError {
    ProviderError::Status {
        url: "https://api.github.com/repos/acme/fleet".to_string(),
        status: 502,
        message: "bad gateway".to_string(),
    }
}

/// Git client that records calls and mimics `.git` creation on disk.
pub struct FakeGit {
    dir: PathBuf,
    log: CallLog,
    pub clone_failures: Failures<GitError>,
    pub branch_failures: Failures<GitError>,
    pub commit_failures: Failures<GitError>,
    pub push_failures: Failures<GitError>,
    pub pull_failures: Failures<GitError>,
}

impl FakeGit {
    pub fn new(dir: impl Into<PathBuf>, log: CallLog) -> Self {
        Self {
            dir: dir.into(),
            log,
            clone_failures: Failures::default(),
            branch_failures: Failures::default(),
            commit_failures: Failures::default(),
            push_failures: Failures::default(),
            pull_failures: Failures::default(),
        }
    }

    fn create_git_dir(&self) {
        std::fs::create_dir_all(self.dir.join(".git")).unwrap();
    }
}

#[async_trait]
impl LocalGitClient for FakeGit {
    async fn clone_repo(&self, _cancel: &CancellationToken) -> Result<(), GitError> {
        self.log.record("git.clone");
        self.clone_failures.next()?;
        self.create_git_dir();
        Ok(())
    }

    async fn init(&self, _cancel: &CancellationToken) -> Result<(), GitError> {
        self.log.record("git.init");
        self.create_git_dir();
        Ok(())
    }

    async fn branch(&self, _cancel: &CancellationToken, name: &str) -> Result<(), GitError> {
        self.log.record(format!("git.branch({name})"));
        self.branch_failures.next()
    }

    async fn add(&self, _cancel: &CancellationToken, path: &str) -> Result<(), GitError> {
        self.log.record(format!("git.add({path})"));
        Ok(())
    }

    async fn remove(&self, _cancel: &CancellationToken, path: &str) -> Result<(), GitError> {
        self.log.record(format!("git.remove({path})"));
        let target = self.dir.join(path);
        if target.exists() {
            std::fs::remove_dir_all(target)?;
        }
        Ok(())
    }

    async fn commit(&self, _cancel: &CancellationToken, message: &str) -> Result<(), GitError> {
        self.log.record(format!("git.commit({message})"));
        self.commit_failures.next()
    }

    async fn push(&self, _cancel: &CancellationToken) -> Result<(), GitError> {
        self.log.record("git.push");
        self.push_failures.next()
    }

    async fn pull(&self, _cancel: &CancellationToken, branch: &str) -> Result<(), GitError> {
        self.log.record(format!("git.pull({branch})"));
        self.pull_failures.next()
    }
}

/// Hosting provider holding at most one repository.
pub struct FakeProvider {
    log: CallLog,
    repo: Mutex<Option<RemoteRepository>>,
    remote_paths: Mutex<Vec<String>>,
    pub get_failures: Failures<ProviderError>,
    pub create_failures: Failures<ProviderError>,
    pub path_failures: Failures<ProviderError>,
}

impl FakeProvider {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            repo: Mutex::new(None),
            remote_paths: Mutex::new(Vec::new()),
            get_failures: Failures::default(),
            create_failures: Failures::default(),
            path_failures: Failures::default(),
        }
    }

    pub fn with_repo(self, empty: bool) -> Self {
        *self.repo.lock().unwrap() = Some(RemoteRepository {
            owner: "acme".to_string(),
            name: "fleet".to_string(),
            clone_url: "https://github.com/acme/fleet.git".to_string(),
            empty,
        });
        self
    }

    pub fn with_remote_path(self, path: &str) -> Self {
        self.remote_paths.lock().unwrap().push(path.to_string());
        self
    }

    pub fn repo(&self) -> Option<RemoteRepository> {
        self.repo.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteRepositoryProvider for FakeProvider {
    async fn get_repo(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Option<RemoteRepository>, ProviderError> {
        self.log.record("provider.get_repo");
        self.get_failures.next()?;
        Ok(self.repo())
    }

    async fn create_repo(
        &self,
        _cancel: &CancellationToken,
        opts: &CreateRepoOpts,
    ) -> Result<RemoteRepository, ProviderError> {
        self.log.record(format!(
            "provider.create_repo({}/{}, personal={}, private={}, {})",
            opts.owner, opts.name, opts.personal, opts.private, opts.description
        ));
        self.create_failures.next()?;
        let repo = RemoteRepository {
            owner: opts.owner.clone(),
            name: opts.name.clone(),
            clone_url: format!("https://github.com/{}/{}.git", opts.owner, opts.name),
            empty: true,
        };
        *self.repo.lock().unwrap() = Some(repo.clone());
        Ok(repo)
    }

    async fn path_exists(
        &self,
        _cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool, ProviderError> {
        self.log.record(format!(
            "provider.path_exists({owner}/{repo}@{branch}:{path})"
        ));
        self.path_failures.next()?;
        Ok(self.remote_paths.lock().unwrap().iter().any(|p| p == path))
    }
}

/// Toolkit client that records calls.
pub struct FakeToolkit {
    log: CallLog,
    pub bootstrap_failures: Failures<ToolkitError>,
    pub uninstall_failures: Failures<ToolkitError>,
    pub suspend_failures: Failures<ToolkitError>,
    pub reconcile_failures: Failures<ToolkitError>,
}

impl FakeToolkit {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            bootstrap_failures: Failures::default(),
            uninstall_failures: Failures::default(),
            suspend_failures: Failures::default(),
            reconcile_failures: Failures::default(),
        }
    }
}

#[async_trait]
impl ToolkitClient for FakeToolkit {
    async fn bootstrap_hosted(
        &self,
        _cancel: &CancellationToken,
        cluster: &ClusterContext,
        _config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        self.log
            .record(format!("toolkit.bootstrap_hosted({})", cluster.name));
        self.bootstrap_failures.next()
    }

    async fn bootstrap_generic(
        &self,
        _cancel: &CancellationToken,
        cluster: &ClusterContext,
        _config: &GitOpsConfig,
        _cli_config: &CliConfig,
    ) -> Result<(), ToolkitError> {
        self.log
            .record(format!("toolkit.bootstrap_generic({})", cluster.name));
        self.bootstrap_failures.next()
    }

    async fn uninstall(
        &self,
        _cancel: &CancellationToken,
        cluster: &ClusterContext,
        _config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        self.log.record(format!("toolkit.uninstall({})", cluster.name));
        self.uninstall_failures.next()
    }

    async fn suspend(
        &self,
        _cancel: &CancellationToken,
        cluster: &ClusterContext,
        _config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        self.log.record(format!("toolkit.suspend({})", cluster.name));
        self.suspend_failures.next()
    }

    async fn resume(
        &self,
        _cancel: &CancellationToken,
        cluster: &ClusterContext,
        _config: &GitOpsConfig,
    ) -> Result<(), ToolkitError> {
        self.log.record(format!("toolkit.resume({})", cluster.name));
        Ok(())
    }

    async fn force_reconcile(
        &self,
        _cancel: &CancellationToken,
        _cluster: &ClusterContext,
        namespace: &str,
    ) -> Result<(), ToolkitError> {
        self.log
            .record(format!("toolkit.force_reconcile({namespace})"));
        self.reconcile_failures.next()
    }

    async fn delete_system_secret(
        &self,
        _cancel: &CancellationToken,
        _cluster: &ClusterContext,
        namespace: &str,
    ) -> Result<(), ToolkitError> {
        self.log
            .record(format!("toolkit.delete_system_secret({namespace})"));
        Ok(())
    }
}
