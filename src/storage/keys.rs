// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! KV key builders. All persisted keys are constructed here.

pub const USER_SESSION_PREFIX: &str = "user_session:";

/// Encrypted GitHub access token for a user.
pub fn github_token(user_id: &str) -> String {
    format!("github_token:{user_id}")
}

/// Encrypted Gmail token set (JSON) for a user.
pub fn gmail_token(user_id: &str) -> String {
    format!("gmail_token:{user_id}")
}

pub fn user_session(user_id: &str) -> String {
    format!("{USER_SESSION_PREFIX}{user_id}")
}

/// Magic-token hash → repository mapping.
pub fn token_mapping(token_hash: &str) -> String {
    format!("token:{token_hash}")
}

pub fn pin_attempts(token_hash: &str) -> String {
    format!("pin_attempts:{token_hash}")
}

/// Download grant minted by a successful PIN check.
pub fn content_grant(grant: &str) -> String {
    format!("content_grant:{grant}")
}

/// Pending GitHub OAuth `state` values.
pub fn oauth_state(state: &str) -> String {
    format!("oauth_state:{state}")
}

/// Inverse of [`user_session`].
pub fn user_id_from_session_key(key: &str) -> Option<&str> {
    key.strip_prefix(USER_SESSION_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(github_token("u1"), "github_token:u1");
        assert_eq!(gmail_token("u1"), "gmail_token:u1");
        assert_eq!(user_session("u1"), "user_session:u1");
        assert_eq!(token_mapping("abc"), "token:abc");
        assert_eq!(pin_attempts("abc"), "pin_attempts:abc");
        assert_eq!(content_grant("g1"), "content_grant:g1");
        assert_eq!(user_id_from_session_key("user_session:u1"), Some("u1"));
        assert_eq!(user_id_from_session_key("token:abc"), None);
    }
}
