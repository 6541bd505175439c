// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Unlock Job
//!
//! In-process counterpart of the repository's hourly unlock workflow.
//!
//! ## Strategy
//!
//! Each sweep walks every stored user session with Gmail connected and, per
//! repository:
//! 1. Reads the manifest strictly (a corrupt manifest is skipped, never
//!    overwritten).
//! 2. For each capsule with `unlockEmailSent == false` and `unlockAt <= now`,
//!    issues a 4-digit PIN and sends the recipient unlock email.
//! 3. Only after that send succeeds sets `pin`, `pinHash`,
//!    `unlockEmailSent` and `unlockedAt`, then sends the sender notification
//!    (failure there is logged only).
//! 4. Writes the manifest once against the revision it read.
//!
//! `unlockEmailSent` is the only latch. Two overlapping runs against one
//! repository can both send; the second manifest write then fails with a
//! conflict. The scheduler is off by default so it never races the workflow.
//!
//! ## Shutdown
//!
//! [`UnlockScheduler::run`] stops when its `CancellationToken` is cancelled.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capsule::{Manifest, ManifestError};
use crate::crypto::{self, CryptoError};
use crate::email_templates::{self, CapsuleEmailData};
use crate::mailer::TokenCacheError;
use crate::models::UserSession;
use crate::state::AppState;
use crate::storage::repo::RepoRef;
use crate::storage::{keys, KvError};

const UNLOCK_COMMIT_MESSAGE: &str = "Update capsule unlock status";

#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    TokenCache(#[from] TokenCacheError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("no stored {0} token")]
    MissingToken(&'static str),

    #[error("invalid repository name {0}")]
    InvalidRepository(String),
}

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlockSummary {
    pub repositories: usize,
    pub unlocked: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct RepoOutcome {
    unlocked: usize,
    failed: usize,
}

pub struct UnlockJob {
    state: AppState,
}

impl UnlockJob {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// One sweep over all sessions.
    pub async fn run_once(&self) -> UnlockSummary {
        let mut summary = UnlockSummary::default();
        let session_keys = match self.state.kv.scan_prefix(keys::USER_SESSION_PREFIX) {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, "Unlock job: failed to list sessions");
                return summary;
            }
        };

        let now = Utc::now().timestamp();
        for key in &session_keys {
            let Some(user_id) = keys::user_id_from_session_key(key) else {
                continue;
            };
            match self.unlock_for_user(user_id, now).await {
                Ok(Some(outcome)) => {
                    summary.repositories += 1;
                    summary.unlocked += outcome.unlocked;
                    summary.failed += outcome.failed;
                }
                Ok(None) => {}
                Err(e) => {
                    summary.repositories += 1;
                    warn!(user_id = %user_id, error = %e, "Unlock job: skipped user");
                }
            }
        }

        if summary.unlocked > 0 || summary.failed > 0 {
            info!(
                repositories = summary.repositories,
                unlocked = summary.unlocked,
                failed = summary.failed,
                "Unlock job: sweep finished"
            );
        }
        summary
    }

    /// `None` when the user is not eligible (no Gmail, no repository).
    async fn unlock_for_user(&self, user_id: &str, now: i64) -> Result<Option<RepoOutcome>, UnlockError> {
        let state = &self.state;
        let Some(session) = state.kv.get_record::<UserSession>(&keys::user_session(user_id))? else {
            return Ok(None);
        };
        let Some(repository) = session.repository.as_ref().filter(|_| session.gmail_connected) else {
            return Ok(None);
        };
        let repo = RepoRef::parse(&repository.full_name)
            .ok_or_else(|| UnlockError::InvalidRepository(repository.full_name.clone()))?;

        let github_token = state
            .kv
            .get_encrypted_token(&keys::github_token(user_id), &state.config.master_key)?
            .ok_or(UnlockError::MissingToken("GitHub"))?;
        let manifest = Manifest::new(state.repos.as_ref(), &github_token, &repo);
        let mut snapshot = manifest.read_all().await?;

        let due = snapshot
            .capsules
            .iter()
            .filter(|c| !c.unlock_email_sent && c.unlock_at <= now)
            .count();
        if due == 0 {
            debug!(repo = %repo, "Unlock job: nothing due");
            return Ok(Some(RepoOutcome::default()));
        }

        let access_token = state
            .gmail_tokens()
            .valid_access_token(user_id)
            .await?
            .ok_or(UnlockError::MissingToken("Gmail"))?;

        let mut outcome = RepoOutcome::default();
        for capsule in snapshot
            .capsules
            .iter_mut()
            .filter(|c| !c.unlock_email_sent && c.unlock_at <= now)
        {
            let pin = crypto::generate_pin()?;
            let magic_link = state.config.magic_link(&capsule.magic_token);
            let data = CapsuleEmailData {
                recipient_email: &capsule.recipient_email,
                recipient_name: capsule.recipient_name.as_deref(),
                sender_name: &capsule.sender_name,
                sender_email: &capsule.sender_email,
                capsule_title: &capsule.title,
                unlock_at: capsule.unlock_at,
                magic_link: &magic_link,
            };
            let unlock_mail = email_templates::unlock_email(&data, &pin);
            let notification = email_templates::sender_notification(&data);

            if let Err(e) = state.mailer.send(&access_token, &unlock_mail).await {
                outcome.failed += 1;
                warn!(capsule_id = %capsule.id, error = %e, "Unlock job: unlock email failed");
                continue;
            }

            capsule.pin_hash = Some(crypto::sha256_hash(&pin));
            capsule.pin = Some(pin);
            capsule.unlock_email_sent = true;
            capsule.unlocked_at = Some(now);
            outcome.unlocked += 1;
            info!(capsule_id = %capsule.id, repo = %repo, "Capsule unlocked");

            if let Err(e) = state.mailer.send(&access_token, &notification).await {
                warn!(capsule_id = %capsule.id, error = %e, "Unlock job: sender notification failed");
            }
        }

        if outcome.unlocked > 0 {
            manifest
                .replace_atomic(&snapshot.capsules, &snapshot.revision, UNLOCK_COMMIT_MESSAGE)
                .await?;
        }
        Ok(Some(outcome))
    }
}

/// Periodic driver for [`UnlockJob`].
pub struct UnlockScheduler {
    job: UnlockJob,
    interval: Duration,
}

impl UnlockScheduler {
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self {
            job: UnlockJob::new(state),
            interval,
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(scheduler.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Unlock scheduler starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.job.run_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Unlock scheduler shutting down");
    }
}
