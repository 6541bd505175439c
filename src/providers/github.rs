// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! GitHub integration: OAuth, user profile, repository files, git data
//! primitives and Actions secrets.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::crypto;
use crate::storage::repo::{ByteStream, RepoFile, RepoRef, RepoStore};

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("memory-capsule-server/", env!("CARGO_PKG_VERSION"));
const OAUTH_SCOPE: &str = "repo workflow";
const REPO_DESCRIPTION: &str = "Memory Time Capsule storage repository";
const REPO_NAME_PREFIX: &str = "timecapsule-storage-";

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Request(String),

    #[error("GitHub returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("GitHub write conflict: {0}")]
    Conflict(String),

    #[error("GitHub OAuth error: {0}")]
    OAuth(String),

    #[error("GitHub response was invalid: {0}")]
    InvalidResponse(String),

    #[error("secret encryption failed: {0}")]
    Sealing(String),
}

/// Identity snapshot of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: String,
}

/// Repository descriptor as returned by the repository APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub html_url: String,
    pub clone_url: String,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoDetails {
    size: u64,
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    key_id: String,
    key: String,
}

/// `timecapsule-storage-<8 hex>`
pub fn generate_repo_name() -> Result<String, crypto::CryptoError> {
    Ok(format!("{REPO_NAME_PREFIX}{}", crypto::random_hex(4)?))
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    api_base_url: String,
    oauth_base_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
}

impl GitHubClient {
    pub fn new(
        api_base_url: &str,
        oauth_base_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, GitHubError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GitHubError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            oauth_base_url: oauth_base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GitHubError> {
        Self::new(
            &config.upstream.github_api,
            &config.upstream.github_oauth,
            &config.github_client_id,
            &config.github_client_secret,
        )
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Consent-screen URL for the `repo workflow` scope.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String, GitHubError> {
        let mut url = url::Url::parse(&format!("{}/login/oauth/authorize", self.oauth_base_url))
            .map_err(|e| GitHubError::Request(format!("invalid OAuth base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", OAUTH_SCOPE)
            .append_pair("state", state);
        Ok(url.into())
    }

    pub async fn exchange_code_for_token(&self, code: &str) -> Result<String, GitHubError> {
        let request = self
            .http
            .post(format!("{}/login/oauth/access_token", self.oauth_base_url))
            .header(ACCEPT, "application/json")
            .json(&json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
            }));
        let response = send(request, "OAuth token exchange").await?;
        let data: OAuthTokenResponse = read_json(response, "OAuth token exchange").await?;

        if let Some(error) = data.error {
            return Err(GitHubError::OAuth(data.error_description.unwrap_or(error)));
        }
        data.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GitHubError::InvalidResponse("missing access_token".to_string()))
    }

    // =========================================================================
    // Users & Repositories
    // =========================================================================

    pub async fn get_authenticated_user(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        let response = send(self.api(Method::GET, "/user", token), "GET /user").await?;
        read_json(response, "GET /user").await
    }

    /// Create a private, empty repository owned by the token's user.
    pub async fn create_repository(&self, token: &str, name: &str) -> Result<GitHubRepo, GitHubError> {
        let request = self.api(Method::POST, "/user/repos", token).json(&json!({
            "name": name,
            "private": true,
            "description": REPO_DESCRIPTION,
            "auto_init": false,
        }));
        let response = send(request, "POST /user/repos").await?;
        let repo: GitHubRepo = read_json(response, "POST /user/repos").await?;
        info!(repo = %repo.full_name, "Created capsule repository");
        Ok(repo)
    }

    async fn get_repo_details(&self, token: &str, repo: &RepoRef) -> Result<RepoDetails, GitHubError> {
        let path = format!("/repos/{repo}");
        let response = send(self.api(Method::GET, &path, token), &format!("GET {path}")).await?;
        read_json(response, &format!("GET {path}")).await
    }

    /// Repository size in bytes (the API reports kilobytes).
    pub async fn get_storage_usage(&self, token: &str, repo: &RepoRef) -> Result<u64, GitHubError> {
        Ok(self.get_repo_details(token, repo).await?.size * 1024)
    }

    // =========================================================================
    // Contents API
    // =========================================================================

    /// File content and sha, or `None` on 404.
    pub async fn get_file_content(
        &self,
        token: &str,
        repo: &RepoRef,
        file_path: &str,
    ) -> Result<Option<RepoFile>, GitHubError> {
        let path = format!("/repos/{repo}/contents/{file_path}");
        let what = format!("GET {path}");
        let response = self
            .api(Method::GET, &path, token)
            .send()
            .await
            .map_err(|e| GitHubError::Request(format!("{what} failed: {e}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, &what, &[]).await?;
        let data: ContentResponse = read_json(response, &what).await?;

        // Directories and submodules carry no inline content.
        let Some(encoded) = data.content else {
            return Ok(None);
        };
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let content = Base64::decode_vec(&compact)
            .map_err(|e| GitHubError::InvalidResponse(format!("{what}: bad base64: {e}")))?;
        Ok(Some(RepoFile {
            content,
            sha: data.sha,
        }))
    }

    /// PUT a file. `sha` must be the current blob sha when replacing.
    pub async fn create_or_update_file(
        &self,
        token: &str,
        repo: &RepoRef,
        file_path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), GitHubError> {
        let path = format!("/repos/{repo}/contents/{file_path}");
        let mut body = json!({
            "message": message,
            "content": Base64::encode_string(content),
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        let what = format!("PUT {path}");
        let response = self
            .api(Method::PUT, &path, token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GitHubError::Request(format!("{what} failed: {e}")))?;
        check_status(
            response,
            &what,
            &[StatusCode::CONFLICT, StatusCode::UNPROCESSABLE_ENTITY],
        )
        .await?;
        Ok(())
    }

    /// Stream raw file bytes, or `None` on 404.
    pub async fn get_raw_stream(
        &self,
        token: &str,
        repo: &RepoRef,
        file_path: &str,
    ) -> Result<Option<ByteStream>, GitHubError> {
        let path = format!("/repos/{repo}/contents/{file_path}");
        let what = format!("GET {path} (raw)");
        let response = self
            .api_accepting(Method::GET, &path, token, RAW_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| GitHubError::Request(format!("{what} failed: {e}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, &what, &[]).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| GitHubError::Request(format!("stream interrupted: {e}")))
            .boxed();
        Ok(Some(stream))
    }

    // =========================================================================
    // Git Data API
    // =========================================================================

    /// Commit binary content through blob → tree → commit → ref.
    ///
    /// Returns the blob sha. A concurrent push between reading and updating
    /// the branch ref surfaces as [`GitHubError::Conflict`].
    pub async fn upload_blob(
        &self,
        token: &str,
        repo: &RepoRef,
        file_path: &str,
        content: Bytes,
    ) -> Result<String, GitHubError> {
        let branch = self
            .get_repo_details(token, repo)
            .await?
            .default_branch
            .unwrap_or_else(|| "main".to_string());

        let blob: ShaResponse = self
            .post_json(
                token,
                &format!("/repos/{repo}/git/blobs"),
                &json!({ "content": Base64::encode_string(&content), "encoding": "base64" }),
            )
            .await?;

        let ref_path = format!("/repos/{repo}/git/ref/heads/{branch}");
        let response = send(self.api(Method::GET, &ref_path, token), &format!("GET {ref_path}")).await?;
        let head: RefResponse = read_json(response, &ref_path).await?;
        let parent_sha = head.object.sha;

        let commit_path = format!("/repos/{repo}/git/commits/{parent_sha}");
        let response = send(
            self.api(Method::GET, &commit_path, token),
            &format!("GET {commit_path}"),
        )
        .await?;
        let parent: CommitResponse = read_json(response, &commit_path).await?;

        let tree: ShaResponse = self
            .post_json(
                token,
                &format!("/repos/{repo}/git/trees"),
                &json!({
                    "base_tree": parent.tree.sha,
                    "tree": [{
                        "path": file_path,
                        "mode": "100644",
                        "type": "blob",
                        "sha": blob.sha,
                    }],
                }),
            )
            .await?;

        let commit: ShaResponse = self
            .post_json(
                token,
                &format!("/repos/{repo}/git/commits"),
                &json!({
                    "message": format!("Add capsule file: {file_path}"),
                    "tree": tree.sha,
                    "parents": [parent_sha],
                }),
            )
            .await?;

        let update_path = format!("/repos/{repo}/git/refs/heads/{branch}");
        let what = format!("PATCH {update_path}");
        let response = self
            .api(Method::PATCH, &update_path, token)
            .json(&json!({ "sha": commit.sha }))
            .send()
            .await
            .map_err(|e| GitHubError::Request(format!("{what} failed: {e}")))?;
        check_status(response, &what, &[StatusCode::CONFLICT, StatusCode::UNPROCESSABLE_ENTITY]).await?;

        info!(repo = %repo, path = %file_path, size = content.len(), "Uploaded capsule file");
        Ok(blob.sha)
    }

    // =========================================================================
    // Actions Secrets
    // =========================================================================

    /// Create or update an Actions secret, sealed against the repository key.
    pub async fn create_repository_secret(
        &self,
        token: &str,
        repo: &RepoRef,
        name: &str,
        value: &str,
    ) -> Result<(), GitHubError> {
        let key_path = format!("/repos/{repo}/actions/secrets/public-key");
        let response = send(self.api(Method::GET, &key_path, token), &format!("GET {key_path}")).await?;
        let public_key: PublicKeyResponse = read_json(response, &key_path).await?;

        let encrypted_value = seal_secret(&public_key.key, value)?;

        let secret_path = format!("/repos/{repo}/actions/secrets/{name}");
        let request = self.api(Method::PUT, &secret_path, token).json(&json!({
            "encrypted_value": encrypted_value,
            "key_id": public_key.key_id,
        }));
        send(request, &format!("PUT {secret_path}")).await?;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn api(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.api_accepting(method, path, token, JSON_MEDIA_TYPE)
    }

    fn api_accepting(&self, method: Method, path: &str, token: &str, accept: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base_url, path))
            .bearer_auth(token)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GitHubError> {
        let what = format!("POST {path}");
        let response = send(self.api(Method::POST, path, token).json(body), &what).await?;
        read_json(response, &what).await
    }
}

/// libsodium sealed box of `value`, base64 encoded.
fn seal_secret(public_key_b64: &str, value: &str) -> Result<String, GitHubError> {
    let key_bytes = Base64::decode_vec(public_key_b64)
        .map_err(|e| GitHubError::Sealing(format!("bad public key encoding: {e}")))?;
    let key: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| GitHubError::Sealing("public key must be 32 bytes".to_string()))?;
    let sealed = crypto_box::PublicKey::from(key)
        .seal(&mut crypto_box::aead::OsRng, value.as_bytes())
        .map_err(|e| GitHubError::Sealing(e.to_string()))?;
    Ok(Base64::encode_string(&sealed))
}

async fn send(request: RequestBuilder, what: &str) -> Result<Response, GitHubError> {
    let response = request
        .send()
        .await
        .map_err(|e| GitHubError::Request(format!("{what} failed: {e}")))?;
    check_status(response, what, &[]).await
}

/// Map a non-2xx response to an error; `conflicts` become [`GitHubError::Conflict`].
async fn check_status(
    response: Response,
    what: &str,
    conflicts: &[StatusCode],
) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if conflicts.contains(&status) {
        warn!(%status, request = %what, "GitHub rejected write precondition");
        return Err(GitHubError::Conflict(format!("{what} returned {status}: {body}")));
    }
    warn!(%status, request = %what, body = %body, "GitHub request failed");
    Err(GitHubError::Status {
        status: status.as_u16(),
        message: format!("{what}: {}", status.canonical_reason().unwrap_or("error")),
    })
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, GitHubError> {
    response
        .json()
        .await
        .map_err(|e| GitHubError::InvalidResponse(format!("{what}: {e}")))
}

#[async_trait]
impl RepoStore for GitHubClient {
    async fn read_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<RepoFile>, GitHubError> {
        self.get_file_content(token, repo, path).await
    }

    async fn write_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), GitHubError> {
        self.create_or_update_file(token, repo, path, content, message, sha)
            .await
    }

    async fn upload_blob(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        content: Bytes,
    ) -> Result<String, GitHubError> {
        GitHubClient::upload_blob(self, token, repo, path, content).await
    }

    async fn stream_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<ByteStream>, GitHubError> {
        self.get_raw_stream(token, repo, path).await
    }

    async fn storage_usage(&self, token: &str, repo: &RepoRef) -> Result<u64, GitHubError> {
        self.get_storage_usage(token, repo).await
    }
}
