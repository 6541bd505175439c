// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! GitHub sign-in, Gmail connection and session lookup.
//!
//! Both OAuth callbacks finish with a redirect to `FRONTEND_URL/auth/callback`
//! carrying either a success marker or an `error` query parameter.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    crypto::{generate_secure_token, DEFAULT_TOKEN_BYTES},
    error::ApiError,
    models::{
        GitHubAuthorizeResponse, GmailAuthorizeQuery, GmailAuthorizeResponse, OAuthCallbackQuery,
        UserSession,
    },
    providers::github::GitHubError,
    repo_init::{initialize_repository, REPO_SETTLE_DELAY},
    state::AppState,
    storage::{keys, repo::RepoRef},
};

/// Lifetime of a pending GitHub OAuth `state`.
pub const OAUTH_STATE_TTL_SECS: u64 = 600;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingOAuthState {
    created_at: i64,
}

fn frontend_redirect(state: &AppState, params: &[(&str, &str)]) -> Response {
    let base = format!("{}/auth/callback", state.config.frontend_url);
    let location = match url::Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            url.to_string()
        }
        Err(_) => base,
    };
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn oauth_error(state: &AppState, error: &str, message: Option<&str>) -> Response {
    match message {
        Some(message) => frontend_redirect(state, &[("error", error), ("message", message)]),
        None => frontend_redirect(state, &[("error", error)]),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/github/authorize",
    tag = "Auth",
    responses((status = 200, body = GitHubAuthorizeResponse))
)]
pub async fn github_authorize(
    State(state): State<AppState>,
) -> Result<Json<GitHubAuthorizeResponse>, ApiError> {
    let oauth_state = generate_secure_token(DEFAULT_TOKEN_BYTES)
        .map_err(|e| ApiError::internal("Internal Server Error").with_message(e.to_string()))?;
    state.kv.put_json(
        &keys::oauth_state(&oauth_state),
        &PendingOAuthState {
            created_at: Utc::now().timestamp(),
        },
        Some(OAUTH_STATE_TTL_SECS),
    )?;

    let auth_url = state
        .github
        .authorize_url(&state.config.github_redirect_uri(), &oauth_state)?;
    Ok(Json(GitHubAuthorizeResponse {
        auth_url,
        state: oauth_state,
    }))
}

/// Exchange the code, create or reuse the storage repository, store the
/// session and the encrypted GitHub token.
#[utoipa::path(
    get,
    path = "/api/auth/github/callback",
    tag = "Auth",
    params(
        ("code" = Option<String>, Query, description = "OAuth authorization code"),
        ("state" = Option<String>, Query, description = "Value issued by the authorize endpoint")
    ),
    responses((status = 302, description = "Redirect to the frontend with `userId` or `error`"))
)]
pub async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return oauth_error(&state, "missing_code", query.error.as_deref());
    };

    let state_key = query.state.as_deref().map(keys::oauth_state);
    match state_key.as_deref().map(|key| state.kv.exists(key)) {
        Some(Ok(true)) => {}
        Some(Err(e)) => {
            warn!(error = %e, "OAuth state lookup failed");
            return oauth_error(&state, "oauth_failed", Some("state lookup failed"));
        }
        _ => return oauth_error(&state, "invalid_state", None),
    }
    if let Some(key) = &state_key {
        if let Err(e) = state.kv.delete(key) {
            warn!(error = %e, "Failed to consume OAuth state");
        }
    }

    match complete_github_sign_in(&state, &code).await {
        Ok(user_id) => {
            info!(user_id = %user_id, "GitHub sign-in completed");
            frontend_redirect(&state, &[("userId", user_id.as_str()), ("success", "true")])
        }
        Err(e) => {
            warn!(error = %e, "GitHub OAuth callback failed");
            oauth_error(&state, "oauth_failed", Some(e.to_string().as_str()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SignInError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Kv(#[from] crate::storage::KvError),
}

async fn complete_github_sign_in(state: &AppState, code: &str) -> Result<String, SignInError> {
    let token = state.github.exchange_code_for_token(code).await?;
    let github_user = state.github.get_authenticated_user(&token).await?;
    let user_id = github_user.id.to_string();

    let existing: Option<UserSession> = state.kv.get_json(&keys::user_session(&user_id))?;
    let existing_repo = existing
        .as_ref()
        .and_then(|s| s.repository.clone())
        .filter(|r| RepoRef::parse(&r.full_name).is_some());

    let repository = match existing_repo {
        Some(repo) => {
            info!(user_id = %user_id, repo = %repo.full_name, "Reusing existing capsule repository");
            repo
        }
        None => {
            initialize_repository(&state.github, state.repos.as_ref(), &token, REPO_SETTLE_DELAY)
                .await?
        }
    };

    state.kv.store_encrypted_token(
        &keys::github_token(&user_id),
        &token,
        &state.config.master_key,
    )?;

    let session = UserSession {
        user_id: user_id.clone(),
        github_user,
        repository: Some(repository),
        github_connected: true,
        gmail_connected: existing.as_ref().is_some_and(|s| s.gmail_connected),
        gmail_email: existing.as_ref().and_then(|s| s.gmail_email.clone()),
        created_at: existing
            .map(|s| s.created_at)
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    };
    state.kv.put_json(&keys::user_session(&user_id), &session, None)?;
    Ok(user_id)
}

#[utoipa::path(
    get,
    path = "/api/auth/session/{user_id}",
    params(("user_id" = String, Path, description = "GitHub user id")),
    tag = "Auth",
    responses(
        (status = 200, body = UserSession),
        (status = 404, description = "Session not found")
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserSession>, ApiError> {
    state
        .kv
        .get_record(&keys::user_session(&user_id))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Session not found"))
}

#[utoipa::path(
    get,
    path = "/api/auth/gmail/authorize",
    params(("userId" = String, Query, description = "User connecting Gmail")),
    tag = "Auth",
    responses(
        (status = 200, body = GmailAuthorizeResponse),
        (status = 400, description = "userId missing")
    )
)]
pub async fn gmail_authorize(
    State(state): State<AppState>,
    Query(query): Query<GmailAuthorizeQuery>,
) -> Result<Json<GmailAuthorizeResponse>, ApiError> {
    let user_id = query
        .user_id
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("userId parameter required"))?;

    let auth_url = state
        .gmail
        .authorize_url(&state.config.gmail_redirect_uri(), &user_id)
        .map_err(|e| ApiError::internal("Internal Server Error").with_message(e.to_string()))?;
    Ok(Json(GmailAuthorizeResponse { auth_url }))
}

/// Store Gmail tokens, push repository secrets (best effort), mark the
/// session as Gmail-connected.
#[utoipa::path(
    get,
    path = "/api/auth/gmail/callback",
    tag = "Auth",
    params(
        ("code" = Option<String>, Query, description = "OAuth authorization code"),
        ("state" = Option<String>, Query, description = "User id passed to the authorize endpoint")
    ),
    responses(
        (status = 302, description = "Redirect to the frontend with `gmailSuccess` or `error`"),
        (status = 400, description = "Missing authorization code")
    )
)]
pub async fn gmail_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return ApiError::bad_request("Missing authorization code").into_response();
    };
    let Some(user_id) = query.state.filter(|s| !s.is_empty()) else {
        return oauth_error(
            &state,
            "Missing userId in OAuth callback. Please try connecting GitHub first.",
            None,
        );
    };

    match complete_gmail_connection(&state, &code, &user_id).await {
        Ok(()) => {
            info!(user_id = %user_id, "Gmail connected");
            frontend_redirect(&state, &[("userId", user_id.as_str()), ("gmailSuccess", "true")])
        }
        Err(message) => {
            warn!(user_id = %user_id, error = %message, "Gmail OAuth callback failed");
            oauth_error(&state, &message, None)
        }
    }
}

async fn complete_gmail_connection(
    state: &AppState,
    code: &str,
    user_id: &str,
) -> Result<(), String> {
    let tokens = state
        .gmail
        .exchange_code_for_tokens(code, &state.config.gmail_redirect_uri())
        .await
        .map_err(|e| e.to_string())?;

    let mut session: UserSession = state
        .kv
        .get_record(&keys::user_session(user_id))
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "User session not found. Please connect GitHub first.".to_string())?;

    state
        .gmail_tokens()
        .store(user_id, &tokens)
        .map_err(|e| e.to_string())?;

    push_workflow_secrets(state, &session, &tokens.refresh_token).await;

    session.gmail_connected = true;
    session.gmail_email = session.github_user.email.clone();
    state
        .kv
        .put_json(&keys::user_session(user_id), &session, None)
        .map_err(|e| e.to_string())
}

/// Secrets the repository unlock workflow reads. Failures are logged only.
async fn push_workflow_secrets(state: &AppState, session: &UserSession, refresh_token: &str) {
    let github_token = match state
        .kv
        .get_encrypted_token(&keys::github_token(&session.user_id), &state.config.master_key)
    {
        Ok(Some(token)) => token,
        Ok(None) => return,
        Err(e) => {
            warn!(user_id = %session.user_id, error = %e, "Could not load GitHub token for secrets");
            return;
        }
    };
    let Some(repo) = session
        .repository
        .as_ref()
        .and_then(|r| RepoRef::parse(&r.full_name))
    else {
        return;
    };

    let secrets = [
        ("GMAIL_REFRESH_TOKEN", refresh_token),
        ("GMAIL_CLIENT_ID", state.gmail.client_id()),
        ("GMAIL_CLIENT_SECRET", state.gmail.client_secret()),
        ("FRONTEND_URL", state.config.frontend_url.as_str()),
    ];
    for (name, value) in secrets {
        if let Err(e) = state
            .github
            .create_repository_secret(&github_token, &repo, name, value)
            .await
        {
            warn!(repo = %repo, secret = name, error = %e, "Failed to store repository secret (non-critical)");
            return;
        }
    }
    info!(repo = %repo, "Stored workflow secrets");
}
