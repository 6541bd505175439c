// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capsule domain: records, status derivation, validation and the manifest.

pub mod manifest;
pub mod model;
pub mod sanitize;
pub mod status;
pub mod validation;

pub use manifest::{Manifest, ManifestError, ManifestSnapshot, MANIFEST_PATH};
pub use model::{Capsule, CapsuleMetadata, ContentType, PhotoAttachment, TokenMapping};
pub use sanitize::{reveal_capsule, sanitize_capsule, SanitizedCapsule};
pub use status::{capsule_state, derive_status, CapsuleState, ViewStatus};
pub use validation::{validate_content, validate_metadata, UploadedFile, ValidationError};
