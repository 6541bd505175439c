// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API plus the session record kept
//! in the KV store. Wire names are camelCase throughout, matching the
//! frontend and the manifest format.
//!
//! ## Model Categories
//!
//! - **Session**: the per-user record written at GitHub sign-in
//! - **Auth**: OAuth authorize responses
//! - **Capsules**: create, view, verify-pin and dashboard bodies

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::capsule::{SanitizedCapsule, ViewStatus};
use crate::providers::github::{GitHubRepo, GitHubUser};
use crate::rate_limit::RateLimitView;

// =============================================================================
// Session
// =============================================================================

/// Stored under `user_session:<userId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: String,
    pub github_user: GitHubUser,
    /// Storage repository; absent until initialization succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<GitHubRepo>,
    pub github_connected: bool,
    #[serde(default)]
    pub gmail_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmail_email: Option<String>,
    /// RFC 3339.
    pub created_at: String,
}

impl UserSession {
    /// Display name for emails: profile name, else login.
    pub fn sender_name(&self) -> &str {
        self.github_user
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.github_user.login)
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitHubAuthorizeResponse {
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GmailAuthorizeResponse {
    pub auth_url: String,
}

/// Query of both OAuth callbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailAuthorizeQuery {
    pub user_id: Option<String>,
}

// =============================================================================
// Capsules
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCapsule {
    pub id: String,
    pub title: String,
    pub unlock_at: i64,
    pub magic_link: String,
    pub whatsapp_link: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCapsuleResponse {
    pub success: bool,
    pub capsule: CreatedCapsule,
    pub creation_email_sent: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewCapsuleResponse {
    pub capsule: SanitizedCapsule,
    pub status: ViewStatus,
    /// Present once the PIN is required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitView>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyPinRequest {
    #[serde(default)]
    pub pin: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPinResponse {
    pub success: bool,
    pub capsule: SanitizedCapsule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub photo_urls: Vec<String>,
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardUser {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StorageSummary {
    pub used: u64,
    pub limit: u64,
    /// Rounded to one decimal place.
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CapsuleCounts {
    pub total: usize,
    pub pending: usize,
    pub unlocked: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RepositoryLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub user: DashboardUser,
    pub storage: StorageSummary,
    pub capsules: CapsuleCounts,
    pub capsule_list: Vec<SanitizedCapsule>,
    pub repository: RepositoryLink,
}

// =============================================================================
// Misc
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> UserSession {
        UserSession {
            user_id: "42".into(),
            github_user: GitHubUser {
                id: 42,
                login: "octo".into(),
                name: None,
                email: None,
                avatar_url: "https://avatars.example/42".into(),
            },
            repository: None,
            github_connected: true,
            gmail_connected: false,
            gmail_email: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn session_wire_format_is_camel_case() {
        let value = serde_json::to_value(session()).unwrap();
        assert_eq!(value["userId"], "42");
        assert_eq!(value["githubUser"]["login"], "octo");
        assert_eq!(value["githubConnected"], true);
        assert!(value.get("repository").is_none());
    }

    #[test]
    fn session_without_gmail_fields_parses() {
        let session: UserSession = serde_json::from_value(json!({
            "userId": "7",
            "githubUser": {"id": 7, "login": "x", "avatar_url": "a"},
            "githubConnected": true,
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(!session.gmail_connected);
        assert!(session.repository.is_none());
    }

    #[test]
    fn sender_name_falls_back_to_login() {
        let mut s = session();
        assert_eq!(s.sender_name(), "octo");
        s.github_user.name = Some("Octo Cat".into());
        assert_eq!(s.sender_name(), "Octo Cat");
    }
}
