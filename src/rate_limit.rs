// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PIN attempt limiter.
//!
//! At most [`PIN_MAX_ATTEMPTS`] failed verifications per magic-token hash.
//! The window is [`PIN_WINDOW_SECS`] measured from the *last* failure, since
//! each increment resets the counter's TTL.

use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::{keys, KvResult, KvStore};

pub const PIN_MAX_ATTEMPTS: u64 = 5;
pub const PIN_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub exceeded: bool,
    pub attempts: u64,
    pub remaining: u64,
}

impl RateLimitStatus {
    fn from_attempts(attempts: u64) -> Self {
        Self {
            exceeded: attempts >= PIN_MAX_ATTEMPTS,
            attempts,
            remaining: PIN_MAX_ATTEMPTS.saturating_sub(attempts),
        }
    }
}

/// Client-facing projection returned by the view endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateLimitView {
    pub remaining: u64,
    pub exceeded: bool,
}

impl From<RateLimitStatus> for RateLimitView {
    fn from(status: RateLimitStatus) -> Self {
        Self {
            remaining: status.remaining,
            exceeded: status.exceeded,
        }
    }
}

/// Read-only check; never increments.
pub fn check_pin_rate_limit(kv: &KvStore, token_hash: &str) -> KvResult<RateLimitStatus> {
    let attempts = kv.get_counter(&keys::pin_attempts(token_hash))?;
    Ok(RateLimitStatus::from_attempts(attempts))
}

/// Record one failed verification and return the updated status.
pub fn increment_pin_attempts(kv: &KvStore, token_hash: &str) -> KvResult<RateLimitStatus> {
    let attempts = kv.increment_counter(&keys::pin_attempts(token_hash), PIN_WINDOW_SECS)?;
    Ok(RateLimitStatus::from_attempts(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_hash_has_full_budget() {
        let kv = KvStore::in_memory().unwrap();
        let status = check_pin_rate_limit(&kv, "h").unwrap();
        assert_eq!(
            status,
            RateLimitStatus {
                exceeded: false,
                attempts: 0,
                remaining: 5
            }
        );
    }

    #[test]
    fn five_failures_exceed_the_limit() {
        let kv = KvStore::in_memory().unwrap();
        for expected_remaining in [4, 3, 2, 1] {
            let status = increment_pin_attempts(&kv, "h").unwrap();
            assert!(!status.exceeded);
            assert_eq!(status.remaining, expected_remaining);
        }
        let fifth = increment_pin_attempts(&kv, "h").unwrap();
        assert!(fifth.exceeded);
        assert_eq!(fifth.remaining, 0);

        let check = check_pin_rate_limit(&kv, "h").unwrap();
        assert!(check.exceeded);
        assert_eq!(check.attempts, 5);
    }

    #[test]
    fn check_does_not_increment() {
        let kv = KvStore::in_memory().unwrap();
        increment_pin_attempts(&kv, "h").unwrap();
        for _ in 0..10 {
            check_pin_rate_limit(&kv, "h").unwrap();
        }
        assert_eq!(check_pin_rate_limit(&kv, "h").unwrap().attempts, 1);
    }

    #[test]
    fn counters_are_per_token_hash() {
        let kv = KvStore::in_memory().unwrap();
        for _ in 0..5 {
            increment_pin_attempts(&kv, "a").unwrap();
        }
        assert!(check_pin_rate_limit(&kv, "a").unwrap().exceeded);
        assert!(!check_pin_rate_limit(&kv, "b").unwrap().exceeded);
    }
}
