// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository-backed file storage.
//!
//! Every capsule file and the manifest live in the user's own repository.
//! [`RepoStore`] is the narrow seam the rest of the crate writes through;
//! [`GitHubClient`](crate::providers::github::GitHubClient) is the production
//! implementation.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::providers::github::GitHubError;

/// Streamed file body.
pub type ByteStream = BoxStream<'static, Result<Bytes, GitHubError>>;

/// `owner/name` pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`. Both halves must be non-empty.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// File content plus its revision token.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub content: Vec<u8>,
    pub sha: String,
}

#[async_trait]
pub trait RepoStore: Send + Sync {
    /// `None` when the file does not exist.
    async fn read_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<RepoFile>, GitHubError>;

    /// Create (`sha = None`) or replace (`sha = Some(previous)`) a file.
    /// A stale or missing `sha` fails with [`GitHubError::Conflict`].
    async fn write_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), GitHubError>;

    /// Commit binary content at `path`; returns the blob sha.
    async fn upload_blob(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        content: Bytes,
    ) -> Result<String, GitHubError>;

    async fn stream_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<ByteStream>, GitHubError>;

    /// Repository size in bytes.
    async fn storage_usage(&self, token: &str, repo: &RepoRef) -> Result<u64, GitHubError>;
}
