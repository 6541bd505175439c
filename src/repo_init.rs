// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bootstrap of a fresh capsule repository.

use std::time::Duration;

use tracing::info;

use crate::capsule::MANIFEST_PATH;
use crate::providers::github::{generate_repo_name, GitHubClient, GitHubError, GitHubRepo};
use crate::storage::repo::{RepoRef, RepoStore};

/// Pause between creating a repository and the first write to it.
pub const REPO_SETTLE_DELAY: Duration = Duration::from_secs(1);

const GITATTRIBUTES: &str = include_str!("../assets/repo/gitattributes");
const README: &str = include_str!("../assets/repo/README.md");
const CAPSULES_JSON: &str = include_str!("../assets/repo/capsules.json");
const UNLOCK_WORKFLOW: &str = include_str!("../assets/repo/unlock-cron.yml");
const UNLOCK_SCRIPT: &str = include_str!("../assets/repo/unlock-script.js");

/// `(path, content, commit message)` in write order.
pub const INITIAL_FILES: [(&str, &str, &str); 5] = [
    (".gitattributes", GITATTRIBUTES, "Initialize Git LFS configuration"),
    ("README.md", README, "Add repository README"),
    (MANIFEST_PATH, CAPSULES_JSON, "Initialize capsules metadata"),
    (
        ".github/workflows/unlock-cron.yml",
        UNLOCK_WORKFLOW,
        "Add unlock cron workflow",
    ),
    ("unlock-script.js", UNLOCK_SCRIPT, "Add unlock script"),
];

/// Create a private storage repository and write the initial files.
pub async fn initialize_repository(
    github: &GitHubClient,
    files: &dyn RepoStore,
    token: &str,
    settle: Duration,
) -> Result<GitHubRepo, GitHubError> {
    let name = generate_repo_name()
        .map_err(|e| GitHubError::Request(format!("repository name generation failed: {e}")))?;
    let repo = github.create_repository(token, &name).await?;
    let repo_ref = RepoRef::parse(&repo.full_name).ok_or_else(|| {
        GitHubError::InvalidResponse(format!("unexpected full_name {}", repo.full_name))
    })?;

    tokio::time::sleep(settle).await;
    write_initial_files(files, token, &repo_ref).await?;

    info!(repo = %repo.full_name, "Initialized capsule repository");
    Ok(repo)
}

/// Sequential writes; each file is new, so no revision is passed.
pub async fn write_initial_files(
    files: &dyn RepoStore,
    token: &str,
    repo: &RepoRef,
) -> Result<(), GitHubError> {
    for (path, content, message) in INITIAL_FILES {
        files
            .write_file(token, repo, path, content.as_bytes(), message, None)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::capsule::Manifest;
    use crate::storage::repo::memory::MemoryRepoStore;

    #[tokio::test]
    async fn initial_files_are_written_in_order() {
        let store = MemoryRepoStore::default();
        let repo = RepoRef::new("octo", "timecapsule-storage-aa");

        write_initial_files(&store, "tok", &repo).await.unwrap();

        assert_eq!(
            store.commits(),
            vec![
                "Initialize Git LFS configuration",
                "Add repository README",
                "Initialize capsules metadata",
                "Add unlock cron workflow",
                "Add unlock script",
            ]
        );
        let workflow = store
            .get_string(&repo, ".github/workflows/unlock-cron.yml")
            .unwrap();
        assert!(workflow.contains("secrets.FRONTEND_URL"));
        assert!(workflow.contains("node unlock-script.js"));

        let manifest = Manifest::new(&store, "tok", &repo);
        assert!(manifest.read_all().await.unwrap().capsules.is_empty());
    }

    #[tokio::test]
    async fn second_initialization_conflicts() {
        let store = MemoryRepoStore::default();
        let repo = RepoRef::new("octo", "timecapsule-storage-aa");
        write_initial_files(&store, "tok", &repo).await.unwrap();

        let err = write_initial_files(&store, "tok", &repo).await.unwrap_err();
        assert!(matches!(err, GitHubError::Conflict(_)));
    }

    #[tokio::test]
    async fn initialize_creates_repository_then_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "name": "timecapsule-storage-0badf00d",
                "full_name": "octo/timecapsule-storage-0badf00d",
                "private": true,
                "html_url": "https://github.com/octo/timecapsule-storage-0badf00d",
                "clone_url": "https://github.com/octo/timecapsule-storage-0badf00d.git"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let github = GitHubClient::new(&server.uri(), &server.uri(), "id", "secret").unwrap();
        let store = MemoryRepoStore::default();

        let repo = initialize_repository(&github, &store, "tok", Duration::ZERO)
            .await
            .unwrap();

        assert!(repo.private);
        let repo_ref = RepoRef::parse(&repo.full_name).unwrap();
        assert!(store.get_string(&repo_ref, "unlock-script.js").is_some());
        assert_eq!(store.commits().len(), INITIAL_FILES.len());
    }
}
