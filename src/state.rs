// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::AppConfig;
use crate::mailer::{GmailTokenCache, Mailer};
use crate::providers::github::GitHubClient;
use crate::providers::gmail::GmailClient;
use crate::storage::repo::RepoStore;
use crate::storage::KvStore;

/// Shared by every handler and by the unlock job.
///
/// `repos` and `mailer` are the GitHub and Gmail clients in production;
/// tests swap in in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub kv: Arc<KvStore>,
    pub github: GitHubClient,
    pub gmail: GmailClient,
    pub repos: Arc<dyn RepoStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Production wiring: files and mail go through the real clients.
    pub fn new(config: AppConfig, kv: KvStore, github: GitHubClient, gmail: GmailClient) -> Self {
        Self {
            config: Arc::new(config),
            kv: Arc::new(kv),
            repos: Arc::new(github.clone()),
            mailer: Arc::new(gmail.clone()),
            github,
            gmail,
        }
    }

    pub fn gmail_tokens(&self) -> GmailTokenCache<'_> {
        GmailTokenCache::new(&self.kv, &self.gmail, &self.config.master_key)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! State wired to in-memory fakes.

    use super::*;
    use crate::capsule::{Capsule, TokenMapping, MANIFEST_PATH};
    use crate::config::test_config;
    use crate::mailer::recording::RecordingMailer;
    use crate::models::UserSession;
    use crate::providers::github::{GitHubRepo, GitHubUser};
    use crate::providers::gmail::GmailTokens;
    use crate::storage::keys;
    use crate::storage::repo::memory::MemoryRepoStore;
    use crate::storage::repo::RepoRef;

    pub struct TestHarness {
        pub state: AppState,
        pub repos: Arc<MemoryRepoStore>,
        pub mailer: Arc<RecordingMailer>,
    }

    /// Upstream clients point at `upstream` (a wiremock URI, or any
    /// unreachable address when the test never calls out).
    pub fn harness_with_upstream(upstream: &str) -> TestHarness {
        let mut config = test_config();
        config.upstream.github_api = upstream.to_string();
        config.upstream.github_oauth = upstream.to_string();
        config.upstream.gmail_api = upstream.to_string();
        config.upstream.google_oauth = upstream.to_string();
        config.upstream.google_token = format!("{upstream}/token");

        let github = GitHubClient::from_config(&config).unwrap();
        let gmail = GmailClient::from_config(&config).unwrap();
        let repos = Arc::new(MemoryRepoStore::default());
        let mailer = Arc::new(RecordingMailer::default());

        let state = AppState {
            config: Arc::new(config),
            kv: Arc::new(KvStore::in_memory().unwrap()),
            github,
            gmail,
            repos: repos.clone(),
            mailer: mailer.clone(),
        };
        TestHarness {
            state,
            repos,
            mailer,
        }
    }

    pub fn harness() -> TestHarness {
        harness_with_upstream("http://127.0.0.1:9")
    }

    pub const TEST_USER: &str = "42";
    pub const TEST_GITHUB_TOKEN: &str = "gho_test_token";
    pub const TEST_GMAIL_ACCESS: &str = "gmail-access-token";

    pub fn test_repo() -> RepoRef {
        RepoRef::new("octo", "timecapsule-storage-0badf00d")
    }

    impl TestHarness {
        /// Session, GitHub token, empty manifest and optionally Gmail tokens.
        pub fn seed_user(&self, gmail_connected: bool) -> RepoRef {
            let repo = test_repo();
            let session = UserSession {
                user_id: TEST_USER.to_string(),
                github_user: GitHubUser {
                    id: 42,
                    login: "octo".to_string(),
                    name: Some("Octo Cat".to_string()),
                    email: Some("octo@example.com".to_string()),
                    avatar_url: "https://avatars.example/42".to_string(),
                },
                repository: Some(GitHubRepo {
                    name: repo.name.clone(),
                    full_name: repo.full_name(),
                    private: true,
                    html_url: format!("https://github.com/{repo}"),
                    clone_url: format!("https://github.com/{repo}.git"),
                }),
                github_connected: true,
                gmail_connected,
                gmail_email: gmail_connected.then(|| "octo@example.com".to_string()),
                created_at: "2026-01-01T00:00:00Z".to_string(),
            };
            let kv = &self.state.kv;
            kv.put_json(&keys::user_session(TEST_USER), &session, None)
                .unwrap();
            kv.store_encrypted_token(
                &keys::github_token(TEST_USER),
                TEST_GITHUB_TOKEN,
                &self.state.config.master_key,
            )
            .unwrap();
            if gmail_connected {
                self.state
                    .gmail_tokens()
                    .store(
                        TEST_USER,
                        &GmailTokens {
                            access_token: TEST_GMAIL_ACCESS.to_string(),
                            refresh_token: "gmail-refresh-token".to_string(),
                            expiry_date: i64::MAX / 2,
                        },
                    )
                    .unwrap();
            }
            self.repos.put(&repo, MANIFEST_PATH, b"[]");
            repo
        }

        /// Append to the manifest directly and write the token mapping.
        pub fn seed_capsule(&self, repo: &RepoRef, capsule: &Capsule) {
            let mut capsules = self.manifest(repo);
            capsules.push(capsule.clone());
            self.repos.put(
                repo,
                MANIFEST_PATH,
                &serde_json::to_vec_pretty(&capsules).unwrap(),
            );
            self.state
                .kv
                .put_json(
                    &keys::token_mapping(&capsule.magic_token_hash),
                    &TokenMapping {
                        user_id: TEST_USER.to_string(),
                        repo_full_name: repo.full_name(),
                        capsule_id: capsule.id.clone(),
                    },
                    None,
                )
                .unwrap();
        }

        pub fn manifest(&self, repo: &RepoRef) -> Vec<Capsule> {
            self.repos
                .get(repo, MANIFEST_PATH)
                .map(|bytes| serde_json::from_slice(&bytes).unwrap())
                .unwrap_or_default()
        }
    }
}
