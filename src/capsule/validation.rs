// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Create-request validation. Runs before any upstream write.

use bytes::Bytes;

use super::model::{
    CapsuleMetadata, ContentType, MAX_ADDITIONAL_CHARS, MAX_PHOTOS, MAX_PREVIEW_CHARS,
    MAX_TEXT_CHARS, MAX_TITLE_CHARS, MIB,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn invalid(message: impl Into<String>) -> ValidationError {
    ValidationError(message.into())
}

/// One file part of the multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn has_control_chars(value: &str) -> bool {
    value.chars().any(char::is_control)
}

/// Required fields, then per-field limits. Fields that end up in mail
/// headers reject control characters.
pub fn validate_metadata(metadata: &CapsuleMetadata, now: i64) -> Result<i64, ValidationError> {
    let title = metadata.title.trim();
    let recipient = metadata.recipient_email.trim();
    let unlock_at = match metadata.unlock_at {
        Some(at) if !title.is_empty() && !recipient.is_empty() => at,
        _ => return Err(invalid("Missing required fields")),
    };

    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(invalid(format!(
            "Title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }
    if has_control_chars(title) {
        return Err(invalid("Title contains invalid characters"));
    }
    if !recipient.contains('@') || has_control_chars(recipient) {
        return Err(invalid("Invalid recipient email"));
    }
    if metadata.recipient_name.as_deref().is_some_and(has_control_chars) {
        return Err(invalid("Recipient name contains invalid characters"));
    }
    if unlock_at <= now {
        return Err(invalid("Unlock time must be in the future"));
    }
    if let Some(preview) = &metadata.preview_message {
        if preview.chars().count() > MAX_PREVIEW_CHARS {
            return Err(invalid(format!(
                "Preview message exceeds {MAX_PREVIEW_CHARS} characters"
            )));
        }
    }
    if let Some(additional) = &metadata.additional_message {
        if additional.chars().count() > MAX_ADDITIONAL_CHARS {
            return Err(invalid(format!(
                "Additional message exceeds {MAX_ADDITIONAL_CHARS} characters"
            )));
        }
    }
    Ok(unlock_at)
}

/// Validate content against the declared content type.
///
/// `file` is the `file` form field; `photos` are `photo0..photoN`.
pub fn validate_content(
    metadata: &CapsuleMetadata,
    file: Option<&UploadedFile>,
    photos: &[UploadedFile],
) -> Result<(), ValidationError> {
    let content_type = metadata.content_type;
    match content_type {
        ContentType::Text => {
            let text = metadata
                .text_content
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| invalid("Text content required"))?;
            if text.chars().count() > MAX_TEXT_CHARS {
                return Err(invalid(format!(
                    "Text content exceeds {MAX_TEXT_CHARS} characters"
                )));
            }
            Ok(())
        }
        ContentType::Video | ContentType::Audio => {
            let file = file.ok_or_else(|| invalid("File required for non-text capsules"))?;
            check_size(content_type, file.size())?;
            check_mime(content_type, &file.mime_type)
        }
        ContentType::Photo => {
            let all: Vec<&UploadedFile> = file.into_iter().chain(photos.iter()).collect();
            if all.is_empty() {
                return Err(invalid("File required for non-text capsules"));
            }
            if all.len() > MAX_PHOTOS {
                return Err(invalid(format!("Too many photos: maximum is {MAX_PHOTOS}")));
            }
            for photo in &all {
                check_mime(content_type, &photo.mime_type)?;
            }
            check_size(content_type, all.iter().map(|p| p.size()).sum())
        }
    }
}

fn check_size(content_type: ContentType, size: u64) -> Result<(), ValidationError> {
    match content_type.size_limit() {
        Some(limit) if size > limit => Err(invalid(format!(
            "File size exceeds {}MB limit",
            limit / MIB
        ))),
        _ => Ok(()),
    }
}

fn check_mime(content_type: ContentType, mime_type: &str) -> Result<(), ValidationError> {
    if content_type.allowed_mime_types().contains(&mime_type) {
        Ok(())
    } else {
        Err(invalid(format!("Invalid file type: {mime_type}")))
    }
}
