// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capsule records as stored in the repository manifest.
//!
//! Field names are camelCase on the wire; the unlock script running in the
//! repository workflow reads and writes the same JSON.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MIB: u64 = 1024 * 1024;

pub const MAX_VIDEO_BYTES: u64 = 100 * MIB;
pub const MAX_AUDIO_BYTES: u64 = 50 * MIB;
/// Combined across all photos of one capsule.
pub const MAX_PHOTO_BYTES: u64 = 50 * MIB;
pub const MAX_TEXT_CHARS: usize = 10_000;
pub const MAX_PHOTOS: usize = 5;
pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_PREVIEW_CHARS: usize = 500;
pub const MAX_ADDITIONAL_CHARS: usize = 2_000;

/// Fallback sender address when the GitHub profile has no public email.
pub const DEFAULT_SENDER_EMAIL: &str = "noreply@timecapsule.app";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Audio,
    Photo,
    Text,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Audio => "audio",
            ContentType::Photo => "photo",
            ContentType::Text => "text",
        }
    }

    /// Upload size limit in bytes; `None` for text.
    pub fn size_limit(self) -> Option<u64> {
        match self {
            ContentType::Video => Some(MAX_VIDEO_BYTES),
            ContentType::Audio => Some(MAX_AUDIO_BYTES),
            ContentType::Photo => Some(MAX_PHOTO_BYTES),
            ContentType::Text => None,
        }
    }

    pub fn allowed_mime_types(self) -> &'static [&'static str] {
        match self {
            ContentType::Video => &["video/mp4", "video/webm"],
            ContentType::Audio => &["audio/mpeg", "audio/mp4"],
            ContentType::Photo => &["image/jpeg", "image/png", "image/gif"],
            ContentType::Text => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAttachment {
    pub id: String,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    pub id: String,
    pub title: String,
    /// Epoch seconds.
    pub unlock_at: i64,
    pub recipient_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<PhotoAttachment>,
    pub magic_token: String,
    pub magic_token_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_hash: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub creation_email_sent: bool,
    #[serde(default)]
    pub unlock_email_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<i64>,
    #[serde(default)]
    pub whatsapp_shared_at_creation: bool,
}

impl Capsule {
    pub fn has_pin(&self) -> bool {
        self.pin.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Unlock time passed and the unlock email went out.
    pub fn is_released(&self, now: i64) -> bool {
        now >= self.unlock_at && self.unlock_email_sent
    }
}

/// The `metadata` JSON part of a create request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub unlock_at: Option<i64>,
    #[serde(default)]
    pub recipient_email: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    pub content_type: ContentType,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub preview_message: Option<String>,
    #[serde(default)]
    pub additional_message: Option<String>,
    #[serde(default)]
    pub whatsapp_shared_at_creation: bool,
}

/// Mapping `token:<hash>` → owning repository and capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMapping {
    pub user_id: String,
    pub repo_full_name: String,
    pub capsule_id: String,
}

/// `Content-Type` for a stored file, from its extension.
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Extension to store an upload under: the client file name's if sane,
/// otherwise derived from the MIME type.
pub fn extension_for(file_name: Option<&str>, mime_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext;
    }
    match mime_type {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        _ => "bin",
    }
    .to_string()
}
