// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-lived download grants for capsule files.
//!
//! A grant is minted after a correct PIN and stored as
//! `content_grant:<random>` → token hash. The content and photo routes only
//! serve bytes for a live grant bound to the same token hash.

use serde::{Deserialize, Serialize};

use crate::crypto::{digests_match, generate_secure_token};
use crate::storage::{keys, KvResult, KvStore};

/// Grant lifetime; matches the `Cache-Control` max-age on served files.
pub const CONTENT_GRANT_TTL_SECS: u64 = 3600;

const GRANT_BYTES: usize = 24;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentGrant {
    token_hash: String,
}

/// Mint a grant for `token_hash` and return its opaque value.
pub fn issue_content_grant(kv: &KvStore, token_hash: &str) -> KvResult<String> {
    let grant = generate_secure_token(GRANT_BYTES)?;
    kv.put_json(
        &keys::content_grant(&grant),
        &ContentGrant {
            token_hash: token_hash.to_string(),
        },
        Some(CONTENT_GRANT_TTL_SECS),
    )?;
    Ok(grant)
}

/// Whether `grant` is live and was minted for `token_hash`.
pub fn grant_allows(kv: &KvStore, grant: &str, token_hash: &str) -> KvResult<bool> {
    if grant.is_empty() {
        return Ok(false);
    }
    Ok(kv
        .get_json::<ContentGrant>(&keys::content_grant(grant))?
        .is_some_and(|g| digests_match(&g.token_hash, token_hash)))
}
