// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outgoing mail seam and the per-user Gmail token cache.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::crypto::MasterKey;
use crate::providers::gmail::{GmailClient, GmailError, GmailTokens};
use crate::storage::{keys, KvError, KvStore};

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, access_token: &str, email: &OutgoingEmail) -> Result<(), GmailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TokenCacheError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Gmail(#[from] GmailError),
}

/// Single entry point for "give me a Gmail access token for this user".
///
/// Tokens are refreshed when within five minutes of expiry and the refreshed
/// record is written back, keeping the refresh token.
pub struct GmailTokenCache<'a> {
    kv: &'a KvStore,
    gmail: &'a GmailClient,
    master_key: &'a MasterKey,
}

impl<'a> GmailTokenCache<'a> {
    pub fn new(kv: &'a KvStore, gmail: &'a GmailClient, master_key: &'a MasterKey) -> Self {
        Self {
            kv,
            gmail,
            master_key,
        }
    }

    pub fn load(&self, user_id: &str) -> Result<Option<GmailTokens>, KvError> {
        let Some(json) = self
            .kv
            .get_encrypted_token(&keys::gmail_token(user_id), self.master_key)?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Stored Gmail tokens are malformed");
                Ok(None)
            }
        }
    }

    pub fn store(&self, user_id: &str, tokens: &GmailTokens) -> Result<(), KvError> {
        let json = serde_json::to_string(tokens)?;
        self.kv
            .store_encrypted_token(&keys::gmail_token(user_id), &json, self.master_key)
    }

    /// `None` when the user has no stored Gmail tokens.
    pub async fn valid_access_token(&self, user_id: &str) -> Result<Option<String>, TokenCacheError> {
        let Some(tokens) = self.load(user_id)? else {
            return Ok(None);
        };
        if !tokens.needs_refresh(Utc::now().timestamp_millis()) {
            return Ok(Some(tokens.access_token));
        }

        let refreshed = self.gmail.refresh_access_token(&tokens).await?;
        if let Err(e) = self.store(user_id, &refreshed) {
            warn!(user_id = %user_id, error = %e, "Failed to persist refreshed Gmail token");
        } else {
            info!(user_id = %user_id, "Persisted refreshed Gmail token");
        }
        Ok(Some(refreshed.access_token))
    }
}
