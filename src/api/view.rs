// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recipient-facing endpoints: countdown view, PIN verification and the
//! content proxy.
//!
//! The view and verify routes take the plaintext magic token and hash it.
//! The content routes take the hash directly plus a `grant` query parameter
//! minted by `verify_pin`; without a live grant they answer 403. Files are
//! streamed from the sender's repository so the repository token never
//! reaches the browser.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    capsule::{
        capsule_state, model::mime_for_path, reveal_capsule, sanitize_capsule, Capsule,
        CapsuleState, Manifest, TokenMapping, ViewStatus,
    },
    content_grant::{grant_allows, issue_content_grant},
    crypto::{digests_match, sha256_hash},
    error::ApiError,
    models::{VerifyPinRequest, VerifyPinResponse, ViewCapsuleResponse},
    rate_limit::{check_pin_rate_limit, increment_pin_attempts},
    state::AppState,
    storage::{keys, repo::RepoRef},
};

/// A capsule together with what is needed to read its files.
struct Located {
    capsule: Capsule,
    repo: RepoRef,
    github_token: String,
}

async fn locate(state: &AppState, token_hash: &str) -> Result<Located, ApiError> {
    let mapping: TokenMapping = state
        .kv
        .get_record(&keys::token_mapping(token_hash))?
        .ok_or_else(|| ApiError::not_found("Capsule not found"))?;

    let repo = RepoRef::parse(&mapping.repo_full_name).ok_or_else(|| {
        ApiError::internal("Internal Server Error")
            .with_message(format!("invalid repository {}", mapping.repo_full_name))
    })?;

    let github_token = state
        .kv
        .get_encrypted_token(&keys::github_token(&mapping.user_id), &state.config.master_key)?
        .ok_or_else(|| ApiError::not_found("GitHub token not found"))?;

    let capsule = Manifest::new(state.repos.as_ref(), &github_token, &repo)
        .find_capsule_by_token_hash(token_hash)
        .await
        .ok_or_else(|| ApiError::not_found("Capsule not found"))?;

    Ok(Located {
        capsule,
        repo,
        github_token,
    })
}

fn not_yet_unlocked() -> ApiError {
    ApiError::forbidden("Capsule not yet unlocked")
}

/// Countdown / status view. Never reveals content or the PIN.
#[utoipa::path(
    get,
    path = "/api/capsule/view/{token}",
    tag = "Capsules",
    params(("token" = String, Path, description = "Magic token from the recipient link")),
    responses(
        (status = 200, body = ViewCapsuleResponse),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn view_capsule(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ViewCapsuleResponse>, ApiError> {
    let token_hash = sha256_hash(&token);
    let Located { capsule, .. } = locate(&state, &token_hash).await?;

    let current = capsule_state(&capsule, Utc::now().timestamp());
    let rate_limit = match current {
        CapsuleState::PinRequired => Some(check_pin_rate_limit(&state.kv, &token_hash)?.into()),
        _ => None,
    };

    Ok(Json(ViewCapsuleResponse {
        capsule: sanitize_capsule(&capsule, false),
        status: ViewStatus::from(current),
        rate_limit,
    }))
}

fn is_four_digits(pin: &str) -> bool {
    pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Check the PIN from the unlock email and hand out the content.
///
/// Format is checked first, then the attempt budget, and only then is the
/// capsule looked up. A wrong PIN spends one attempt; the attempt that
/// exhausts the budget already answers 429.
#[utoipa::path(
    post,
    path = "/api/capsule/view/{token}/verify-pin",
    tag = "Capsules",
    params(("token" = String, Path, description = "Magic token from the recipient link")),
    request_body = VerifyPinRequest,
    responses(
        (status = 200, body = VerifyPinResponse),
        (status = 400, description = "PIN is not 4 digits"),
        (status = 401, description = "Wrong PIN; body carries `remaining`"),
        (status = 403, description = "Capsule not yet unlocked"),
        (status = 404, description = "Unknown token"),
        (status = 429, description = "Too many failed attempts")
    )
)]
pub async fn verify_pin(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<VerifyPinRequest>,
) -> Result<Json<VerifyPinResponse>, ApiError> {
    if !is_four_digits(&request.pin) {
        return Err(ApiError::bad_request("Invalid PIN format")
            .with_message("PIN must be exactly 4 digits"));
    }

    let token_hash = sha256_hash(&token);
    if check_pin_rate_limit(&state.kv, &token_hash)?.exceeded {
        return Err(too_many_attempts());
    }

    let Located {
        capsule,
        repo,
        github_token,
    } = locate(&state, &token_hash).await?;

    let now = Utc::now().timestamp();
    if !capsule.is_released(now) {
        return Err(not_yet_unlocked());
    }
    let Some(pin_hash) = capsule.pin_hash.as_deref().filter(|_| capsule.has_pin()) else {
        return Err(not_yet_unlocked());
    };

    if !digests_match(&sha256_hash(&request.pin), pin_hash) {
        let status = increment_pin_attempts(&state.kv, &token_hash)?;
        warn!(capsule_id = %capsule.id, attempts = status.attempts, "Incorrect PIN");
        if status.exceeded {
            return Err(too_many_attempts());
        }
        return Err(ApiError::unauthorized("Invalid PIN")
            .with_message("Incorrect PIN")
            .with_detail("remaining", status.remaining));
    }

    info!(capsule_id = %capsule.id, "PIN verified");
    if capsule.viewed_at.is_none() {
        record_view(&state, &github_token, &repo, &capsule.id, now).await;
    }

    let (content_url, photo_urls) = if capsule.file_path.is_some() || !capsule.photos.is_empty() {
        let grant = issue_content_grant(&state.kv, &token_hash)?;
        let worker = &state.config.worker_url;
        let content_url = capsule
            .file_path
            .as_ref()
            .map(|_| format!("{worker}/api/capsule/content/{token_hash}?grant={grant}"));
        let photo_urls = (0..capsule.photos.len())
            .map(|i| format!("{worker}/api/capsule/photo/{token_hash}/{i}?grant={grant}"))
            .collect();
        (content_url, photo_urls)
    } else {
        (None, Vec::new())
    };

    Ok(Json(VerifyPinResponse {
        success: true,
        capsule: reveal_capsule(&capsule),
        content_url,
        photo_urls,
    }))
}

fn too_many_attempts() -> ApiError {
    ApiError::too_many_requests("Too many attempts")
        .with_message("Too many incorrect PIN attempts. Please try again later.")
        .with_detail("remaining", 0)
}

/// Best effort: a lost race or upstream error only logs.
async fn record_view(state: &AppState, github_token: &str, repo: &RepoRef, capsule_id: &str, now: i64) {
    let manifest = Manifest::new(state.repos.as_ref(), github_token, repo);
    let result = async {
        let mut snapshot = manifest.read_all().await?;
        if let Some(entry) = snapshot.capsules.iter_mut().find(|c| c.id == capsule_id) {
            entry.viewed_at = Some(now);
        }
        manifest
            .replace_atomic(&snapshot.capsules, &snapshot.revision, "Record capsule view")
            .await
    }
    .await;

    if let Err(e) = result {
        warn!(capsule_id = %capsule_id, error = %e, "Failed to record capsule view");
    }
}

async fn stream_from_repo(
    state: &AppState,
    located: &Located,
    path: &str,
    content_type: &str,
) -> Result<Response, ApiError> {
    let stream = state
        .repos
        .stream_file(&located.github_token, &located.repo, path)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct GrantQuery {
    grant: Option<String>,
}

fn require_grant(state: &AppState, token_hash: &str, query: &GrantQuery) -> Result<(), ApiError> {
    let allowed = match query.grant.as_deref() {
        Some(grant) => grant_allows(&state.kv, grant, token_hash)?,
        None => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden("PIN verification required"))
    }
}

/// Proxy the main video/audio file.
#[utoipa::path(
    get,
    path = "/api/capsule/content/{token_hash}",
    tag = "Capsules",
    params(
        ("token_hash" = String, Path, description = "SHA-256 of the magic token"),
        ("grant" = String, Query, description = "Download grant from verify-pin")
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 403, description = "Missing or expired grant, or capsule not yet unlocked"),
        (status = 404, description = "Unknown capsule or no file")
    )
)]
pub async fn capsule_content(
    State(state): State<AppState>,
    Path(token_hash): Path<String>,
    Query(query): Query<GrantQuery>,
) -> Result<Response, ApiError> {
    require_grant(&state, &token_hash, &query)?;
    let located = locate(&state, &token_hash).await?;
    if !located.capsule.is_released(Utc::now().timestamp()) {
        return Err(not_yet_unlocked());
    }
    let path = located
        .capsule
        .file_path
        .clone()
        .ok_or_else(|| ApiError::not_found("No file for this capsule"))?;

    stream_from_repo(&state, &located, &path, mime_for_path(&path)).await
}

/// Proxy one photo attachment by position.
#[utoipa::path(
    get,
    path = "/api/capsule/photo/{token_hash}/{index}",
    tag = "Capsules",
    params(
        ("token_hash" = String, Path, description = "SHA-256 of the magic token"),
        ("index" = usize, Path, description = "Zero-based photo position"),
        ("grant" = String, Query, description = "Download grant from verify-pin")
    ),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 403, description = "Missing or expired grant, or capsule not yet unlocked"),
        (status = 404, description = "Unknown capsule or photo")
    )
)]
pub async fn capsule_photo(
    State(state): State<AppState>,
    Path((token_hash, index)): Path<(String, usize)>,
    Query(query): Query<GrantQuery>,
) -> Result<Response, ApiError> {
    require_grant(&state, &token_hash, &query)?;
    let located = locate(&state, &token_hash).await?;
    if !located.capsule.is_released(Utc::now().timestamp()) {
        return Err(not_yet_unlocked());
    }
    let photo = located
        .capsule
        .photos
        .get(index)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Photo not found"))?;

    stream_from_repo(&state, &located, &photo.file_path, &photo.mime_type).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use super::*;
    use crate::api::router;
    use crate::api::test_util::{call, call_json, get, post_json, MultipartForm};
    use crate::capsule::sanitize::sample_capsule;
    use crate::capsule::{ContentType, PhotoAttachment};
    use crate::state::test_support::{harness, TestHarness};
    use crate::unlock_job::UnlockJob;

    const TOKEN: &str = "recipient-magic-token";

    fn capsule(unlock_in: i64, released: bool) -> Capsule {
        let now = Utc::now().timestamp();
        let mut c = sample_capsule();
        c.magic_token = TOKEN.to_string();
        c.magic_token_hash = sha256_hash(TOKEN);
        c.unlock_at = now + unlock_in;
        c.unlock_email_sent = released;
        if released {
            c.pin = Some("1234".into());
            c.pin_hash = Some(sha256_hash("1234"));
            c.unlocked_at = Some(now);
        } else {
            c.pin = None;
            c.pin_hash = None;
            c.unlocked_at = None;
        }
        c
    }

    fn seeded(c: &Capsule) -> (TestHarness, RepoRef) {
        let h = harness();
        let repo = h.seed_user(true);
        h.seed_capsule(&repo, c);
        (h, repo)
    }

    async fn view(h: &TestHarness, token: &str) -> (StatusCode, Value) {
        call_json(
            router(h.state.clone()),
            get(&format!("/api/capsule/view/{token}")),
        )
        .await
    }

    async fn verify(h: &TestHarness, token: &str, pin: &str) -> (StatusCode, Value) {
        call_json(
            router(h.state.clone()),
            post_json(
                &format!("/api/capsule/view/{token}/verify-pin"),
                &json!({ "pin": pin }),
            ),
        )
        .await
    }

    #[tokio::test]
    async fn countdown_view_hides_secrets() {
        let (h, _) = seeded(&capsule(3_600, false));
        let (status, body) = view(&h, TOKEN).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["status"],
            json!({"unlocked": false, "pending": false, "requiresPin": false})
        );
        assert!(body.get("rateLimit").is_none());

        let capsule = body["capsule"].as_object().unwrap();
        for hidden in ["magicToken", "magicTokenHash", "senderEmail", "pin", "textContent"] {
            assert!(!capsule.contains_key(hidden), "{hidden} leaked");
        }
        assert_eq!(capsule["previewMessage"], "soon");
    }

    #[tokio::test]
    async fn overdue_unsent_capsule_is_pending() {
        let (h, _) = seeded(&capsule(-60, false));
        let (_, body) = view(&h, TOKEN).await;
        assert_eq!(body["status"]["pending"], true);
        assert_eq!(body["status"]["unlocked"], false);
    }

    #[tokio::test]
    async fn released_capsule_requires_pin_and_reports_budget() {
        let (h, _) = seeded(&capsule(-60, true));
        let (_, body) = view(&h, TOKEN).await;
        assert_eq!(body["status"]["requiresPin"], true);
        assert_eq!(body["rateLimit"], json!({"remaining": 5, "exceeded": false}));
        assert!(body["capsule"].get("pin").is_none());
    }

    #[tokio::test]
    async fn released_capsule_without_pin_is_not_offered_as_unlocked() {
        let mut c = capsule(-60, true);
        c.pin = None;
        c.pin_hash = None;
        let (h, _) = seeded(&c);

        let (_, body) = view(&h, TOKEN).await;
        assert_eq!(
            body["status"],
            json!({"unlocked": false, "pending": true, "requiresPin": false})
        );
        let (status, _) = verify(&h, TOKEN, "1234").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_token_is_404() {
        let h = harness();
        let (status, body) = view(&h, "nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Capsule not found");
    }

    #[tokio::test]
    async fn malformed_pin_is_rejected_before_counting() {
        let (h, _) = seeded(&capsule(-60, true));
        for pin in ["", "123", "12345", "12a4", "１２３４"] {
            let (status, _) = verify(&h, TOKEN, pin).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{pin:?}");
        }
        let budget = check_pin_rate_limit(&h.state.kv, &sha256_hash(TOKEN)).unwrap();
        assert_eq!(budget.attempts, 0);
    }

    #[tokio::test]
    async fn correct_pin_reveals_text_and_records_view() {
        let (h, repo) = seeded(&capsule(-60, true));
        let (status, body) = verify(&h, TOKEN, "1234").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["capsule"]["textContent"], "hello");
        assert_eq!(body["capsule"]["additionalMessage"], "p.s.");
        assert_eq!(body["capsule"]["pin"], "1234");
        assert!(body.get("contentUrl").is_none());

        assert!(h.manifest(&repo)[0].viewed_at.is_some());
        assert_eq!(h.repos.commits(), vec!["Record capsule view".to_string()]);
        let budget = check_pin_rate_limit(&h.state.kv, &sha256_hash(TOKEN)).unwrap();
        assert_eq!(budget.attempts, 0);
    }

    #[tokio::test]
    async fn view_is_recorded_once() {
        let (h, _) = seeded(&capsule(-60, true));
        verify(&h, TOKEN, "1234").await;
        verify(&h, TOKEN, "1234").await;
        assert_eq!(h.repos.commits().len(), 1);
    }

    #[tokio::test]
    async fn wrong_pin_counts_down_then_locks_out() {
        let (h, _) = seeded(&capsule(-60, true));
        for expected_remaining in [4, 3, 2, 1] {
            let (status, body) = verify(&h, TOKEN, "9999").await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["remaining"], expected_remaining);
        }
        let (status, body) = verify(&h, TOKEN, "9999").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["remaining"], 0);

        // Even the right PIN is refused while locked out.
        let (status, _) = verify(&h, TOKEN, "1234").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn lockout_applies_before_lookup() {
        let h = harness();
        let hash = sha256_hash("unknown-token");
        for _ in 0..5 {
            increment_pin_attempts(&h.state.kv, &hash).unwrap();
        }
        let (status, _) = verify(&h, "unknown-token", "1234").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn verify_before_release_is_forbidden() {
        let (h, _) = seeded(&capsule(-60, false));
        let (status, body) = verify(&h, TOKEN, "1234").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Capsule not yet unlocked");
    }

    /// Strip the configured worker origin from a minted URL.
    fn relative(url: &Value) -> String {
        url.as_str()
            .unwrap()
            .strip_prefix("https://api.capsule.example")
            .unwrap()
            .to_string()
    }

    fn media_capsule(released: bool) -> Capsule {
        let mut c = capsule(-60, released);
        c.content_type = ContentType::Photo;
        c.text_content = None;
        c.file_path = Some("capsules/cap-1.png".into());
        c.file_size = Some(4);
        c.photos = vec![PhotoAttachment {
            id: "photo-0".into(),
            file_path: "capsules/cap-1/photo-0.gif".into(),
            file_size: 3,
            mime_type: "image/gif".into(),
        }];
        c
    }

    #[tokio::test]
    async fn content_urls_are_minted_and_served() {
        let c = media_capsule(true);
        let (h, repo) = seeded(&c);
        h.repos.put(&repo, "capsules/cap-1.png", b"\x89PNG");
        h.repos.put(&repo, "capsules/cap-1/photo-0.gif", b"GIF");

        let (_, body) = verify(&h, TOKEN, "1234").await;
        let hash = sha256_hash(TOKEN);
        let content_url = relative(&body["contentUrl"]);
        let photo_url = relative(&body["photoUrls"][0]);
        let (path, grant) = content_url.split_once("?grant=").unwrap();
        assert_eq!(path, format!("/api/capsule/content/{hash}"));
        assert!(!grant.is_empty());
        assert_eq!(photo_url, format!("/api/capsule/photo/{hash}/0?grant={grant}"));

        let (status, headers, bytes) = call(router(h.state.clone()), get(&content_url)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(&bytes[..], b"\x89PNG");

        let (status, headers, bytes) = call(router(h.state.clone()), get(&photo_url)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/gif");
        assert_eq!(&bytes[..], b"GIF");

        let (status, _) = call_json(
            router(h.state.clone()),
            get(&format!("/api/capsule/photo/{hash}/1?grant={grant}")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn content_needs_a_grant_from_verify_pin() {
        let (h, repo) = seeded(&media_capsule(true));
        h.repos.put(&repo, "capsules/cap-1.png", b"\x89PNG");
        h.repos.put(&repo, "capsules/cap-1/photo-0.gif", b"GIF");
        let hash = sha256_hash(TOKEN);
        let foreign = issue_content_grant(&h.state.kv, &sha256_hash("someone-else")).unwrap();

        for uri in [
            format!("/api/capsule/content/{hash}"),
            format!("/api/capsule/content/{hash}?grant="),
            format!("/api/capsule/content/{hash}?grant=guessed"),
            format!("/api/capsule/content/{hash}?grant={foreign}"),
            format!("/api/capsule/photo/{hash}/0"),
            format!("/api/capsule/photo/{hash}/0?grant={foreign}"),
        ] {
            let (status, body) = call_json(router(h.state.clone()), get(&uri)).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(body["error"], "PIN verification required");
        }
    }

    #[tokio::test]
    async fn content_is_withheld_until_release() {
        let (h, repo) = seeded(&media_capsule(false));
        h.repos.put(&repo, "capsules/cap-1.png", b"\x89PNG");
        let hash = sha256_hash(TOKEN);
        let grant = issue_content_grant(&h.state.kv, &hash).unwrap();

        let (status, body) = call_json(
            router(h.state.clone()),
            get(&format!("/api/capsule/content/{hash}?grant={grant}")),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Capsule not yet unlocked");
    }

    #[tokio::test]
    async fn text_capsule_gets_no_grant() {
        let (h, _) = seeded(&capsule(-60, true));
        verify(&h, TOKEN, "1234").await;
        assert!(h.state.kv.scan_prefix("content_grant:").unwrap().is_empty());
    }

    #[tokio::test]
    async fn correct_pin_after_failures_does_not_spend_an_attempt() {
        let (h, _) = seeded(&capsule(-60, true));
        for _ in 0..3 {
            let (status, _) = verify(&h, TOKEN, "9999").await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body) = verify(&h, TOKEN, "1234").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["capsule"]["textContent"], "hello");

        let budget = check_pin_rate_limit(&h.state.kv, &sha256_hash(TOKEN)).unwrap();
        assert_eq!(budget.attempts, 3);
        assert!(!budget.exceeded);
    }

    #[tokio::test]
    async fn create_wait_unlock_open() {
        let h = harness();
        let repo = h.seed_user(true);

        let metadata = json!({
            "title": "Soon",
            "unlockAt": Utc::now().timestamp() + 1,
            "recipientEmail": "rita@example.com",
            "contentType": "text",
            "textContent": "hello"
        });
        let form = MultipartForm::default()
            .text("userId", "42")
            .text("metadata", &metadata.to_string());
        let (status, created) = call_json(
            router(h.state.clone()),
            form.into_request("/api/capsule/create"),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{created}");
        let link = created["capsule"]["magicLink"].as_str().unwrap();
        let token = link.rsplit_once("t=").unwrap().1.to_string();

        let (_, body) = view(&h, &token).await;
        assert_eq!(body["status"]["unlocked"], false);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let (_, body) = view(&h, &token).await;
        assert_eq!(body["status"]["pending"], true);

        let summary = UnlockJob::new(h.state.clone()).run_once().await;
        assert_eq!(summary.unlocked, 1);
        let pin = h.manifest(&repo)[0].pin.clone().unwrap();

        let (_, body) = view(&h, &token).await;
        assert_eq!(body["status"]["requiresPin"], true);

        let (status, body) = verify(&h, &token, &pin).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["capsule"]["textContent"], "hello");

        let wrong = if pin == "0000" { "1111" } else { "0000" };
        for _ in 0..4 {
            let (status, _) = verify(&h, &token, wrong).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _) = verify(&h, &token, wrong).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }
}
