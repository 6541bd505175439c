// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capsule creation.
//!
//! Order of work: form parsing, session checks, metadata and content
//! validation, quota check, then the irreversible writes (blob uploads,
//! manifest append, token mapping) and finally the creation email. Nothing
//! is rolled back if a later step fails.

use std::fmt::Display;

use axum::{
    extract::{multipart::Field, Multipart, State},
    Json,
};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    capsule::{
        model::{extension_for, DEFAULT_SENDER_EMAIL},
        validate_content, validate_metadata, Capsule, CapsuleMetadata, ContentType, Manifest,
        PhotoAttachment, TokenMapping, UploadedFile,
    },
    crypto::{generate_secure_token, sha256_hash, DEFAULT_TOKEN_BYTES},
    email_templates::{creation_email, format_unlock_date, whatsapp_link, CapsuleEmailData},
    error::ApiError,
    models::{CreateCapsuleResponse, CreatedCapsule, UserSession},
    state::AppState,
    storage::{keys, repo::RepoRef},
};

#[derive(Default)]
struct CreateForm {
    user_id: Option<String>,
    metadata: Option<String>,
    file: Option<UploadedFile>,
    photos: Vec<(usize, UploadedFile)>,
}

fn form_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request("Invalid form data").with_message(err.body_text())
}

async fn read_upload(field: Field<'_>, name: String) -> Result<UploadedFile, ApiError> {
    let file_name = field.file_name().map(str::to_string);
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(form_error)?;
    Ok(UploadedFile {
        field: name,
        file_name,
        mime_type,
        data,
    })
}

/// `photo3` → `Some(3)`
fn photo_index(name: &str) -> Option<usize> {
    name.strip_prefix("photo")?.parse().ok()
}

async fn read_form(mut multipart: Multipart) -> Result<CreateForm, ApiError> {
    let mut form = CreateForm::default();
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "userId" => form.user_id = Some(field.text().await.map_err(form_error)?),
            "metadata" => form.metadata = Some(field.text().await.map_err(form_error)?),
            "file" => form.file = Some(read_upload(field, name).await?),
            other => {
                if let Some(index) = photo_index(other) {
                    let upload = read_upload(field, name).await?;
                    form.photos.push((index, upload));
                }
            }
        }
    }
    form.photos.sort_by_key(|(index, _)| *index);
    Ok(form)
}

fn creation_failed(err: impl Display) -> ApiError {
    error!(error = %err, "Capsule creation failed");
    ApiError::internal("Failed to create capsule").with_message(err.to_string())
}

/// Create a capsule from a `multipart/form-data` body.
///
/// Fields: `userId`, `metadata` (JSON [`CapsuleMetadata`]), `file` for
/// video/audio (or the first photo), `photo0`..`photo4` for photo capsules.
#[utoipa::path(
    post,
    path = "/api/capsule/create",
    tag = "Capsules",
    responses(
        (status = 200, body = CreateCapsuleResponse),
        (status = 400, description = "Validation failed, or storage limit exceeded"),
        (status = 404, description = "Session or GitHub token not found"),
        (status = 500, description = "Upstream failure")
    )
)]
pub async fn create_capsule(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CreateCapsuleResponse>, ApiError> {
    let form = read_form(multipart).await?;

    let user_id = form
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing userId"))?;

    let session: UserSession = state
        .kv
        .get_record(&keys::user_session(&user_id))?
        .ok_or_else(|| ApiError::not_found("User session not found"))?;
    let repository = session
        .repository
        .as_ref()
        .filter(|r| !r.full_name.is_empty())
        .ok_or_else(|| ApiError::bad_request("GitHub must be connected"))?;
    if !session.gmail_connected {
        return Err(ApiError::bad_request("Gmail must be connected"));
    }
    let repo = RepoRef::parse(&repository.full_name)
        .ok_or_else(|| creation_failed(format!("invalid repository {}", repository.full_name)))?;

    let metadata: CapsuleMetadata = match form.metadata.as_deref() {
        None => return Err(ApiError::bad_request("Missing required fields")),
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            ApiError::bad_request("Invalid metadata").with_message(e.to_string())
        })?,
    };

    let now = Utc::now().timestamp();
    let unlock_at =
        validate_metadata(&metadata, now).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let (main_file, photos) = match metadata.content_type {
        ContentType::Text => (None, Vec::new()),
        ContentType::Video | ContentType::Audio => (form.file, Vec::new()),
        ContentType::Photo => (
            form.file,
            form.photos.into_iter().map(|(_, upload)| upload).collect(),
        ),
    };
    validate_content(&metadata, main_file.as_ref(), &photos)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let github_token = state
        .kv
        .get_encrypted_token(&keys::github_token(&user_id), &state.config.master_key)?
        .ok_or_else(|| ApiError::not_found("GitHub token not found"))?;

    let incoming: u64 = main_file.iter().chain(photos.iter()).map(UploadedFile::size).sum();
    let storage_used = state
        .repos
        .storage_usage(&github_token, &repo)
        .await
        .map_err(creation_failed)?;
    let storage_limit = state.config.storage_limit_bytes;
    if storage_used.saturating_add(incoming) > storage_limit {
        return Err(ApiError::bad_request("Storage limit exceeded")
            .with_detail("storageUsed", storage_used)
            .with_detail("storageLimit", storage_limit));
    }

    let capsule_id = Uuid::new_v4().to_string();
    let magic_token = generate_secure_token(DEFAULT_TOKEN_BYTES).map_err(creation_failed)?;
    let magic_token_hash = sha256_hash(&magic_token);

    let mut file_path = None;
    let mut file_size = None;
    if let Some(upload) = &main_file {
        let path = format!(
            "capsules/{capsule_id}.{}",
            extension_for(upload.file_name.as_deref(), &upload.mime_type)
        );
        state
            .repos
            .upload_blob(&github_token, &repo, &path, upload.data.clone())
            .await
            .map_err(creation_failed)?;
        file_path = Some(path);
        file_size = Some(upload.size());
    }

    let mut attachments = Vec::with_capacity(photos.len());
    for (n, photo) in photos.iter().enumerate() {
        let path = format!(
            "capsules/{capsule_id}/photo-{n}.{}",
            extension_for(photo.file_name.as_deref(), &photo.mime_type)
        );
        state
            .repos
            .upload_blob(&github_token, &repo, &path, photo.data.clone())
            .await
            .map_err(creation_failed)?;
        attachments.push(PhotoAttachment {
            id: format!("photo-{n}"),
            file_path: path,
            file_size: photo.size(),
            mime_type: photo.mime_type.clone(),
        });
    }

    let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.trim().is_empty());
    let capsule = Capsule {
        id: capsule_id.clone(),
        title: metadata.title.trim().to_string(),
        unlock_at,
        recipient_email: metadata.recipient_email.trim().to_string(),
        recipient_name: non_empty(&metadata.recipient_name),
        sender_name: session.sender_name().to_string(),
        sender_email: session
            .github_user
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_SENDER_EMAIL.to_string()),
        content_type: metadata.content_type,
        file_path,
        file_size,
        text_content: match metadata.content_type {
            ContentType::Text => metadata.text_content.clone(),
            _ => None,
        },
        preview_message: non_empty(&metadata.preview_message),
        additional_message: non_empty(&metadata.additional_message),
        photos: attachments,
        magic_token: magic_token.clone(),
        magic_token_hash: magic_token_hash.clone(),
        pin: None,
        pin_hash: None,
        created_at: now,
        creation_email_sent: false,
        unlock_email_sent: false,
        unlocked_at: None,
        viewed_at: None,
        whatsapp_shared_at_creation: metadata.whatsapp_shared_at_creation,
    };

    Manifest::new(state.repos.as_ref(), &github_token, &repo)
        .update_capsules_json(capsule.clone())
        .await
        .map_err(creation_failed)?;

    state.kv.put_json(
        &keys::token_mapping(&magic_token_hash),
        &TokenMapping {
            user_id: user_id.clone(),
            repo_full_name: repo.full_name(),
            capsule_id: capsule_id.clone(),
        },
        None,
    )?;
    info!(user_id = %user_id, capsule_id = %capsule_id, repo = %repo, "Capsule created");

    let magic_link = state.config.magic_link(&magic_token);
    let creation_email_sent = send_creation_email(&state, &user_id, &capsule, &magic_link).await;

    let share_text = format!(
        "Hi! I sent you a time capsule that unlocks on {}. Check your email or view it here: {magic_link}",
        format_unlock_date(unlock_at)
    );

    Ok(Json(CreateCapsuleResponse {
        success: true,
        capsule: CreatedCapsule {
            id: capsule_id,
            title: capsule.title,
            unlock_at,
            whatsapp_link: whatsapp_link(&share_text),
            magic_link,
        },
        creation_email_sent,
    }))
}

/// Failures are logged; the capsule already exists at this point.
async fn send_creation_email(
    state: &AppState,
    user_id: &str,
    capsule: &Capsule,
    magic_link: &str,
) -> bool {
    let access_token = match state.gmail_tokens().valid_access_token(user_id).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            warn!(user_id = %user_id, "No Gmail tokens; creation email skipped");
            return false;
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Gmail token unavailable; creation email skipped");
            return false;
        }
    };

    let email = creation_email(&CapsuleEmailData {
        recipient_email: &capsule.recipient_email,
        recipient_name: capsule.recipient_name.as_deref(),
        sender_name: &capsule.sender_name,
        sender_email: &capsule.sender_email,
        capsule_title: &capsule.title,
        unlock_at: capsule.unlock_at,
        magic_link,
    });
    match state.mailer.send(&access_token, &email).await {
        Ok(()) => true,
        Err(e) => {
            warn!(capsule_id = %capsule.id, error = %e, "Creation email failed");
            false
        }
    }
}
