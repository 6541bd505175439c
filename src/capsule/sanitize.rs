// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-safe projection of a [`Capsule`].

use serde::Serialize;
use utoipa::ToSchema;

use super::model::{Capsule, ContentType};

/// Never carries `magicToken`, `magicTokenHash`, `pinHash` or `senderEmail`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedCapsule {
    pub id: String,
    pub title: String,
    pub unlock_at: i64,
    pub recipient_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub sender_name: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_message: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub photo_count: usize,
    pub created_at: i64,
    pub unlock_email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_message: Option<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Pre-verification view. `pin` appears only with `include_pin` and when set.
pub fn sanitize_capsule(capsule: &Capsule, include_pin: bool) -> SanitizedCapsule {
    SanitizedCapsule {
        id: capsule.id.clone(),
        title: capsule.title.clone(),
        unlock_at: capsule.unlock_at,
        recipient_email: capsule.recipient_email.clone(),
        recipient_name: capsule.recipient_name.clone(),
        sender_name: capsule.sender_name.clone(),
        content_type: capsule.content_type,
        file_size: capsule.file_size,
        preview_message: capsule.preview_message.clone(),
        photo_count: capsule.photos.len(),
        created_at: capsule.created_at,
        unlock_email_sent: capsule.unlock_email_sent,
        unlocked_at: capsule.unlocked_at,
        viewed_at: capsule.viewed_at,
        pin: if include_pin && capsule.has_pin() {
            capsule.pin.clone()
        } else {
            None
        },
        text_content: None,
        additional_message: None,
    }
}

/// Post-verification view: adds the inline content.
pub fn reveal_capsule(capsule: &Capsule) -> SanitizedCapsule {
    SanitizedCapsule {
        text_content: capsule.text_content.clone(),
        additional_message: capsule.additional_message.clone(),
        ..sanitize_capsule(capsule, true)
    }
}

#[cfg(test)]
pub(crate) fn sample_capsule() -> Capsule {
    Capsule {
        id: "cap-1".into(),
        title: "For later".into(),
        unlock_at: 2_000,
        recipient_email: "rita@example.com".into(),
        recipient_name: Some("Rita".into()),
        sender_name: "Sam".into(),
        sender_email: "sam@example.com".into(),
        content_type: ContentType::Text,
        file_path: None,
        file_size: None,
        text_content: Some("hello".into()),
        preview_message: Some("soon".into()),
        additional_message: Some("p.s.".into()),
        photos: vec![],
        magic_token: "magic-token-value".into(),
        magic_token_hash: "magic-token-hash".into(),
        pin: Some("1234".into()),
        pin_hash: Some("pin-hash".into()),
        created_at: 1_000,
        creation_email_sent: true,
        unlock_email_sent: true,
        unlocked_at: Some(2_000),
        viewed_at: None,
        whatsapp_shared_at_creation: false,
    }
}
