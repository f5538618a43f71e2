//! GitHub REST adapter for [`RemoteRepositoryProvider`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{CreateRepoOpts, RemoteRepository, RemoteRepositoryProvider};
use crate::error::ProviderError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
/// Environment variable holding the GitHub personal access token.
pub const GITHUB_TOKEN_ENV: &str = "EKSA_GITHUB_TOKEN";

const USER_AGENT: &str = concat!("flux-gitops/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn sanitize_error_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    owner: RepoOwner,
    clone_url: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

/// GitHub repository provider bound to one owner/repository pair.
#[derive(Debug, Clone)]
pub struct GithubProvider {
    client: Client,
    base_url: String,
    owner: String,
    repository: String,
    token: SecretString,
}

impl GithubProvider {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        token: SecretString,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Other(format!("building http client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_API_URL.to_string(),
            owner: owner.into(),
            repository: repository.into(),
            token,
        })
    }

    /// Reads the token from [`GITHUB_TOKEN_ENV`].
    pub fn from_env(
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let token = std::env::var(GITHUB_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::Other(format!("{GITHUB_TOKEN_ENV} is not set"))
            })?;
        Self::new(owner, repository, SecretString::from(token.trim()))
    }

    /// Points the provider at another API endpoint, e.g. GitHub Enterprise.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, ProviderError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            response = self.authorized(request).send() => response.map_err(|e| ProviderError::Http {
                url: url.to_string(),
                source: e,
            }),
        }
    }

    async fn status_error(url: &str, response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ProviderError::Status {
            url: url.to_string(),
            status,
            message: sanitize_error_body(&body),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        url: &str,
        response: Response,
    ) -> Result<T, ProviderError> {
        response.json::<T>().await.map_err(|e| ProviderError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn is_empty(&self, cancel: &CancellationToken) -> Result<bool, ProviderError> {
        let url = self.url(&format!(
            "/repos/{}/{}/commits?per_page=1",
            self.owner, self.repository
        ));
        let response = self.send(cancel, &url, self.client.get(&url)).await?;
        match response.status() {
            StatusCode::CONFLICT => Ok(true),
            status if status.is_success() => Ok(false),
            _ => Err(Self::status_error(&url, response).await),
        }
    }
}

#[async_trait]
impl RemoteRepositoryProvider for GithubProvider {
    async fn get_repo(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteRepository>, ProviderError> {
        let url = self.url(&format!("/repos/{}/{}", self.owner, self.repository));
        let response = self.send(cancel, &url, self.client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(owner = %self.owner, repo = %self.repository, "repository not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(&url, response).await);
        }

        let repo: RepoResponse = Self::decode(&url, response).await?;
        let empty = self.is_empty(cancel).await?;

        Ok(Some(RemoteRepository {
            owner: repo.owner.login,
            name: repo.name,
            clone_url: repo.clone_url,
            empty,
        }))
    }

    async fn create_repo(
        &self,
        cancel: &CancellationToken,
        opts: &CreateRepoOpts,
    ) -> Result<RemoteRepository, ProviderError> {
        let url = if opts.personal {
            self.url("/user/repos")
        } else {
            self.url(&format!("/orgs/{}/repos", opts.owner))
        };
        let body = CreateRepoRequest {
            name: &opts.name,
            description: &opts.description,
            private: opts.private,
            auto_init: false,
        };

        let response = self
            .send(cancel, &url, self.client.post(&url).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(&url, response).await);
        }

        let repo: RepoResponse = Self::decode(&url, response).await?;
        Ok(RemoteRepository {
            owner: repo.owner.login,
            name: repo.name,
            clone_url: repo.clone_url,
            empty: true,
        })
    }

    async fn path_exists(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool, ProviderError> {
        let url = self.url(&format!(
            "/repos/{owner}/{repo}/contents/{}",
            path.trim_matches('/')
        ));
        let request = self.client.get(&url).query(&[("ref", branch)]);
        let response = self.send(cancel, &url, request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::status_error(&url, response).await),
        }
    }
}
