// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{
    capsule::{sanitize_capsule, Capsule, Manifest},
    error::ApiError,
    models::{
        CapsuleCounts, DashboardResponse, DashboardUser, RepositoryLink, StorageSummary,
        UserSession,
    },
    state::AppState,
    storage::{keys, repo::RepoRef},
};

/// Unsent this long after `unlockAt` counts as failed.
pub const FAILED_AFTER_SECS: i64 = 2 * 60 * 60;

fn count_capsules(capsules: &[Capsule], now: i64) -> CapsuleCounts {
    capsules.iter().fold(
        CapsuleCounts {
            total: capsules.len(),
            ..CapsuleCounts::default()
        },
        |mut counts, c| {
            if c.unlock_email_sent {
                counts.unlocked += 1;
            } else if now > c.unlock_at + FAILED_AFTER_SECS {
                counts.failed += 1;
            } else {
                counts.pending += 1;
            }
            counts
        },
    )
}

fn storage_summary(used: u64, limit: u64) -> StorageSummary {
    let percentage = if limit == 0 {
        0.0
    } else {
        (used as f64 / limit as f64 * 1000.0).round() / 10.0
    };
    StorageSummary {
        used,
        limit,
        percentage,
    }
}

/// Sender overview: storage, counts and the capsule list (newest first).
#[utoipa::path(
    get,
    path = "/api/capsule/dashboard/{user_id}",
    tag = "Dashboard",
    params(("user_id" = String, Path, description = "GitHub user id")),
    responses(
        (status = 200, body = DashboardResponse),
        (status = 400, description = "No repository connected"),
        (status = 404, description = "Unknown user or missing token")
    )
)]
pub async fn dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let session: UserSession = state
        .kv
        .get_record(&keys::user_session(&user_id))?
        .ok_or_else(|| ApiError::not_found("User session not found"))?;
    let repository = session
        .repository
        .clone()
        .ok_or_else(|| ApiError::bad_request("GitHub must be connected"))?;
    let repo = RepoRef::parse(&repository.full_name).ok_or_else(|| {
        ApiError::internal("Internal Server Error")
            .with_message(format!("invalid repository {}", repository.full_name))
    })?;

    let github_token = state
        .kv
        .get_encrypted_token(&keys::github_token(&user_id), &state.config.master_key)?
        .ok_or_else(|| ApiError::not_found("GitHub token not found"))?;

    let used = state.repos.storage_usage(&github_token, &repo).await?;
    let mut capsules = Manifest::new(state.repos.as_ref(), &github_token, &repo)
        .get_all_capsules()
        .await;
    capsules.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(DashboardResponse {
        user: DashboardUser {
            id: session.user_id.clone(),
            name: session.sender_name().to_string(),
            email: session.github_user.email.clone(),
            avatar: session.github_user.avatar_url.clone(),
        },
        storage: storage_summary(used, state.config.storage_limit_bytes),
        capsules: count_capsules(&capsules, Utc::now().timestamp()),
        capsule_list: capsules.iter().map(|c| sanitize_capsule(c, false)).collect(),
        repository: RepositoryLink {
            name: repository.full_name,
            url: repository.html_url,
        },
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::api::router;
    use crate::api::test_util::{call_json, get};
    use crate::capsule::sanitize::sample_capsule;
    use crate::capsule::MANIFEST_PATH;
    use crate::state::test_support::harness;

    fn at(id: &str, created_at: i64, unlock_at: i64, sent: bool) -> Capsule {
        let mut c = sample_capsule();
        c.id = id.to_string();
        c.magic_token_hash = format!("hash-{id}");
        c.created_at = created_at;
        c.unlock_at = unlock_at;
        c.unlock_email_sent = sent;
        c
    }

    #[test]
    fn counts_split_pending_unlocked_failed() {
        let now = 100_000;
        let capsules = [
            at("future", 1, now + 10, false),
            at("just-due", 2, now - 60, false),
            at("stuck", 3, now - FAILED_AFTER_SECS - 1, false),
            at("done", 4, now - 10, true),
        ];
        assert_eq!(
            count_capsules(&capsules, now),
            CapsuleCounts {
                total: 4,
                pending: 2,
                unlocked: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn percentage_has_one_decimal() {
        assert_eq!(storage_summary(1, 3).percentage, 33.3);
        assert_eq!(storage_summary(0, 0).percentage, 0.0);
        assert_eq!(storage_summary(512, 1024).percentage, 50.0);
    }

    #[tokio::test]
    async fn dashboard_lists_newest_first_without_secrets() {
        let h = harness();
        let repo = h.seed_user(true);
        h.seed_capsule(&repo, &at("old", 10, 20, true));
        h.seed_capsule(&repo, &at("new", 30, i64::MAX / 2, false));
        h.repos.set_storage_usage(h.state.config.storage_limit_bytes / 4);

        let (status, body) =
            call_json(router(h.state.clone()), get("/api/capsule/dashboard/42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Octo Cat");
        assert_eq!(body["user"]["avatar"], "https://avatars.example/42");
        assert_eq!(body["storage"]["percentage"], 25.0);
        assert_eq!(body["capsules"]["total"], 2);
        assert_eq!(body["capsules"]["unlocked"], 1);
        assert_eq!(body["capsules"]["pending"], 1);
        assert_eq!(body["capsuleList"][0]["id"], "new");
        assert_eq!(body["capsuleList"][1]["id"], "old");
        assert!(body["capsuleList"][1].get("pin").is_none());
        assert!(body["capsuleList"][1].get("magicToken").is_none());
        assert_eq!(
            body["repository"]["url"],
            "https://github.com/octo/timecapsule-storage-0badf00d"
        );
    }

    #[tokio::test]
    async fn corrupt_manifest_shows_empty_list() {
        let h = harness();
        let repo = h.seed_user(true);
        h.repos.put(&repo, MANIFEST_PATH, b"not json");

        let (status, body) =
            call_json(router(h.state.clone()), get("/api/capsule/dashboard/42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["capsules"]["total"], 0);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let h = harness();
        let (status, body) =
            call_json(router(h.state.clone()), get("/api/capsule/dashboard/7")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User session not found");
    }
}
