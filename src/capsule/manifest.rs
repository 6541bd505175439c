// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `capsules.json`: the per-repository capsule table.
//!
//! The manifest is one JSON array. Writes carry the revision observed at
//! read time; a concurrent writer makes the write fail with
//! [`ManifestError::Conflict`]. Conflicts are reported, never retried.

use tracing::{error, warn};

use super::model::Capsule;
use crate::providers::github::GitHubError;
use crate::storage::repo::{RepoRef, RepoStore};

pub const MANIFEST_PATH: &str = "capsules.json";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("capsules.json not found in {0}")]
    Missing(String),

    #[error("capsules.json in {repo} is not valid: {source}")]
    Corrupt {
        repo: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("capsules.json changed since it was read")]
    Conflict,

    #[error("a capsule with this token hash already exists")]
    DuplicateToken,

    #[error(transparent)]
    Upstream(GitHubError),
}

impl From<GitHubError> for ManifestError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Conflict(_) => ManifestError::Conflict,
            other => ManifestError::Upstream(other),
        }
    }
}

/// Capsules plus the revision they were read at.
#[derive(Debug, Clone)]
pub struct ManifestSnapshot {
    pub capsules: Vec<Capsule>,
    pub revision: String,
}

/// Manifest of one repository, accessed with one user's token.
pub struct Manifest<'a> {
    store: &'a dyn RepoStore,
    token: &'a str,
    repo: &'a RepoRef,
}

impl<'a> Manifest<'a> {
    pub fn new(store: &'a dyn RepoStore, token: &'a str, repo: &'a RepoRef) -> Self {
        Self { store, token, repo }
    }

    /// Strict read. A missing or unparsable manifest is an error.
    pub async fn read_all(&self) -> Result<ManifestSnapshot, ManifestError> {
        let file = self
            .store
            .read_file(self.token, self.repo, MANIFEST_PATH)
            .await?
            .ok_or_else(|| ManifestError::Missing(self.repo.full_name()))?;

        let capsules = serde_json::from_slice(&file.content).map_err(|source| {
            ManifestError::Corrupt {
                repo: self.repo.full_name(),
                source,
            }
        })?;

        Ok(ManifestSnapshot {
            capsules,
            revision: file.sha,
        })
    }

    /// Append one capsule if the manifest is still at `expected_revision`.
    pub async fn append_atomic(
        &self,
        capsule: Capsule,
        expected_revision: &str,
    ) -> Result<(), ManifestError> {
        let snapshot = self.read_all().await?;
        if snapshot.revision != expected_revision {
            return Err(ManifestError::Conflict);
        }
        if snapshot
            .capsules
            .iter()
            .any(|c| c.magic_token_hash == capsule.magic_token_hash)
        {
            return Err(ManifestError::DuplicateToken);
        }

        let message = format!("Add capsule: {}", capsule.title);
        let mut capsules = snapshot.capsules;
        capsules.push(capsule);
        self.write(&capsules, expected_revision, &message).await
    }

    /// Overwrite the whole table if it is still at `expected_revision`.
    pub async fn replace_atomic(
        &self,
        capsules: &[Capsule],
        expected_revision: &str,
        message: &str,
    ) -> Result<(), ManifestError> {
        self.write(capsules, expected_revision, message).await
    }

    async fn write(
        &self,
        capsules: &[Capsule],
        revision: &str,
        message: &str,
    ) -> Result<(), ManifestError> {
        let body = serde_json::to_vec_pretty(capsules).map_err(|source| ManifestError::Corrupt {
            repo: self.repo.full_name(),
            source,
        })?;
        self.store
            .write_file(self.token, self.repo, MANIFEST_PATH, &body, message, Some(revision))
            .await
            .map_err(|err| {
                warn!(repo = %self.repo, error = %err, "Manifest write failed");
                ManifestError::from(err)
            })
    }

    /// Lenient read for display paths: any failure reads as no capsules.
    pub async fn get_all_capsules(&self) -> Vec<Capsule> {
        match self.read_all().await {
            Ok(snapshot) => snapshot.capsules,
            Err(ManifestError::Missing(_)) => Vec::new(),
            Err(err) => {
                error!(repo = %self.repo, error = %err, "Failed to read capsules.json");
                Vec::new()
            }
        }
    }

    pub async fn find_capsule_by_token_hash(&self, token_hash: &str) -> Option<Capsule> {
        self.get_all_capsules()
            .await
            .into_iter()
            .find(|c| c.magic_token_hash == token_hash)
    }

    /// Read the current revision and append `capsule` against it.
    pub async fn update_capsules_json(&self, capsule: Capsule) -> Result<(), ManifestError> {
        let snapshot = self.read_all().await?;
        self.append_atomic(capsule, &snapshot.revision).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::sanitize::sample_capsule;
    use crate::storage::repo::memory::MemoryRepoStore;

    fn repo() -> RepoRef {
        RepoRef::new("octo", "timecapsule-storage-00000000")
    }

    fn seeded(content: &[u8]) -> MemoryRepoStore {
        let store = MemoryRepoStore::default();
        store.put(&repo(), MANIFEST_PATH, content);
        store
    }

    #[tokio::test]
    async fn append_writes_pretty_json_and_commit_message() {
        let store = seeded(b"[]");
        let repo = repo();
        let manifest = Manifest::new(&store, "tok", &repo);

        manifest.update_capsules_json(sample_capsule()).await.unwrap();

        let written = store.get_string(&repo, MANIFEST_PATH).unwrap();
        assert!(written.starts_with("[\n  {"));
        assert_eq!(store.commits(), vec!["Add capsule: For later".to_string()]);

        let found = manifest
            .find_capsule_by_token_hash("magic-token-hash")
            .await
            .unwrap();
        assert_eq!(found.id, "cap-1");
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let store = seeded(b"[]");
        let repo = repo();
        let manifest = Manifest::new(&store, "tok", &repo);

        let before = manifest.read_all().await.unwrap();
        manifest.update_capsules_json(sample_capsule()).await.unwrap();

        let mut second = sample_capsule();
        second.id = "cap-2".into();
        second.magic_token_hash = "other-hash".into();
        let err = manifest
            .append_atomic(second, &before.revision)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Conflict));
        assert_eq!(manifest.get_all_capsules().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_token_hash_is_rejected() {
        let store = seeded(b"[]");
        let repo = repo();
        let manifest = Manifest::new(&store, "tok", &repo);

        manifest.update_capsules_json(sample_capsule()).await.unwrap();
        let err = manifest
            .update_capsules_json(sample_capsule())
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateToken));
    }

    #[tokio::test]
    async fn corrupt_manifest_is_lenient_on_read_and_strict_on_write() {
        let store = seeded(b"{not json");
        let repo = repo();
        let manifest = Manifest::new(&store, "tok", &repo);

        assert!(manifest.get_all_capsules().await.is_empty());
        assert!(manifest.find_capsule_by_token_hash("x").await.is_none());

        let err = manifest
            .update_capsules_json(sample_capsule())
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Corrupt { .. }));
        assert_eq!(store.get_string(&repo, MANIFEST_PATH).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn missing_manifest_reads_empty_but_cannot_append() {
        let store = MemoryRepoStore::default();
        let repo = repo();
        let manifest = Manifest::new(&store, "tok", &repo);

        assert!(manifest.get_all_capsules().await.is_empty());
        assert!(matches!(
            manifest.read_all().await.unwrap_err(),
            ManifestError::Missing(_)
        ));
    }

    #[tokio::test]
    async fn replace_updates_records_in_place() {
        let store = seeded(b"[]");
        let repo = repo();
        let manifest = Manifest::new(&store, "tok", &repo);
        manifest.update_capsules_json(sample_capsule()).await.unwrap();

        let mut snapshot = manifest.read_all().await.unwrap();
        snapshot.capsules[0].viewed_at = Some(3_000);
        manifest
            .replace_atomic(&snapshot.capsules, &snapshot.revision, "Record capsule view")
            .await
            .unwrap();

        let reread = manifest.read_all().await.unwrap();
        assert_eq!(reread.capsules[0].viewed_at, Some(3_000));
        assert_ne!(reread.revision, snapshot.revision);
    }
}
