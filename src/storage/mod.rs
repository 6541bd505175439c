// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage
//!
//! Two kinds of state, kept apart:
//!
//! - **Key-value store** ([`KvStore`], embedded redb file under `DATA_DIR`):
//!   sessions, encrypted OAuth tokens, token-hash mappings, PIN attempt
//!   counters, pending OAuth states.
//! - **Repository files** ([`repo::RepoStore`]): the capsule manifest and
//!   every uploaded file, in the sender's own GitHub repository.
//!
//! ## Key layout
//!
//! ```text
//! github_token:{user_id}    encrypted GitHub access token
//! gmail_token:{user_id}     encrypted Gmail token record (JSON)
//! user_session:{user_id}    UserSession
//! token:{token_hash}        TokenMapping
//! pin_attempts:{token_hash} {count}, sliding 1h TTL
//! content_grant:{grant}     {tokenHash}, 1h TTL, minted after a correct PIN
//! oauth_state:{state}       pending GitHub sign-in, 10 min TTL
//! ```

pub mod keys;
pub mod kv;
pub mod repo;

pub use kv::{KvError, KvResult, KvStore};
