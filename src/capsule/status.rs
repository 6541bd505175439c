// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capsule state, recomputed from timestamps on every read.
//!
//! ```text
//! Countdown ──(now ≥ unlockAt)──► Unlocking ──(unlock job)──► PinRequired
//! ```
//!
//! The unlock job stores the PIN together with `unlockEmailSent`, so a
//! released record without a PIN cannot be opened. It stays `Unlocking`.

use serde::Serialize;
use utoipa::ToSchema;

use super::model::Capsule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsuleState {
    /// `now < unlockAt`
    Countdown,
    /// Unlock time passed, waiting on the unlock job.
    Unlocking,
    PinRequired,
}

pub fn derive_status(now: i64, unlock_at: i64, unlock_email_sent: bool, pin_present: bool) -> CapsuleState {
    if now < unlock_at {
        CapsuleState::Countdown
    } else if unlock_email_sent && pin_present {
        CapsuleState::PinRequired
    } else {
        CapsuleState::Unlocking
    }
}

pub fn capsule_state(capsule: &Capsule, now: i64) -> CapsuleState {
    derive_status(now, capsule.unlock_at, capsule.unlock_email_sent, capsule.has_pin())
}

/// `status` object of the view response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewStatus {
    pub unlocked: bool,
    pub pending: bool,
    pub requires_pin: bool,
}

impl From<CapsuleState> for ViewStatus {
    fn from(state: CapsuleState) -> Self {
        let (unlocked, pending, requires_pin) = match state {
            CapsuleState::Countdown => (false, false, false),
            CapsuleState::Unlocking => (false, true, false),
            CapsuleState::PinRequired => (true, false, true),
        };
        Self {
            unlocked,
            pending,
            requires_pin,
        }
    }
}
