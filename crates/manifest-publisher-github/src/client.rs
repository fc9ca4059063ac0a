//! GitHub client: git data API and release archive downloads.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use manifest_publisher_core::domain::{CommitInfo, TreeEntry};
use manifest_publisher_core::{
    ArchiveError, ArchiveSource, GitError, GitObjectStore, GitResult, ObjectSha, RepoId,
};

use crate::config::GitHubConfig;
use crate::error::{GitHubError, Result};
use crate::wire::{
    BlobRequest, CommitRequest, CommitResponse, RefResponse, RefUpdateRequest, ShaResponse,
    TreeRequest,
};

/// Map a transport failure onto the git error taxonomy.
pub(crate) fn transport_error(operation: &str, err: reqwest::Error) -> GitError {
    if err.is_timeout() {
        GitError::TimedOut {
            operation: operation.to_string(),
        }
    } else {
        GitError::Transport {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

/// GitHub REST client
pub struct GitHubClient {
    api_url: String,
    http_client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if !config.token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("token {}", config.token))
                .map_err(|_| GitHubError::InvalidCredential("GitHub token"))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(GitHubClient {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// `{api}/repos/{owner}/{repo}/git/{path}`
    pub fn git_url(&self, repo: &RepoId, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/{}",
            self.api_url, repo.owner, repo.name, path
        )
    }

    fn request(&self, method: Method, repo: &RepoId, path: &str) -> RequestBuilder {
        self.http_client.request(method, self.git_url(repo, path))
    }

    /// Send a request and decode a successful JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> GitResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        let response = ensure_success(operation, response).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(operation, e)
            } else {
                GitError::Decode {
                    operation: operation.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

async fn ensure_success(operation: &str, response: Response) -> GitResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(GitError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl GitObjectStore for GitHubClient {
    async fn create_blob(&self, repo: &RepoId, content_base64: &str) -> GitResult<ObjectSha> {
        let request = self
            .request(Method::POST, repo, "blobs")
            .json(&BlobRequest::base64(content_base64));
        let blob: ShaResponse = self.send_json("create_blob", request).await?;
        Ok(blob.sha)
    }

    async fn get_ref(&self, repo: &RepoId, reference: &str) -> GitResult<ObjectSha> {
        let request = self.request(Method::GET, repo, &format!("ref/{reference}"));
        let found: RefResponse = self.send_json("get_ref", request).await?;
        debug!(reference = %found.reference, sha = %found.object.sha, "Resolved ref");
        Ok(found.object.sha)
    }

    async fn get_commit(&self, repo: &RepoId, sha: &ObjectSha) -> GitResult<CommitInfo> {
        let request = self.request(Method::GET, repo, &format!("commits/{sha}"));
        let commit: CommitResponse = self.send_json("get_commit", request).await?;
        Ok(CommitInfo {
            sha: commit.sha,
            tree_sha: commit.tree.sha,
        })
    }

    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &ObjectSha,
        entries: &[TreeEntry],
    ) -> GitResult<ObjectSha> {
        let request = self.request(Method::POST, repo, "trees").json(&TreeRequest {
            base_tree,
            tree: entries,
        });
        let tree: ShaResponse = self.send_json("create_tree", request).await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree: &ObjectSha,
        parents: &[ObjectSha],
    ) -> GitResult<ObjectSha> {
        let request = self.request(Method::POST, repo, "commits").json(&CommitRequest {
            message,
            tree,
            parents,
        });
        let commit: ShaResponse = self.send_json("create_commit", request).await?;
        Ok(commit.sha)
    }

    async fn update_ref(&self, repo: &RepoId, reference: &str, sha: &ObjectSha) -> GitResult<u16> {
        let response = self
            .request(Method::PATCH, repo, &format!("refs/{reference}"))
            .json(&RefUpdateRequest { sha, force: false })
            .send()
            .await
            .map_err(|e| transport_error("update_ref", e))?;
        // Any answer is a status for the retry loop, including 4xx/5xx.
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl ArchiveSource for GitHubClient {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, ArchiveError> {
        let map = |e: reqwest::Error| {
            if e.is_timeout() {
                ArchiveError::TimedOut
            } else {
                ArchiveError::Fetch(e.to_string())
            }
        };

        let response = self.http_client.get(url).send().await.map_err(map)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Fetch(format!("{url} returned HTTP {status}")));
        }
        let bytes = response.bytes().await.map_err(map)?;
        debug!(url = %url, bytes = bytes.len(), "Downloaded release archive");
        Ok(bytes.to_vec())
    }
}
