// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Memory Time Capsule - API server
//!
//! Senders seal video, audio, photo or text capsules for a recipient and a
//! future date. Everything a capsule contains lives in the sender's own
//! private GitHub repository; delivery goes out through the sender's Gmail
//! account. At unlock time a PIN is generated and mailed to the recipient,
//! who opens the capsule through a magic link plus that PIN.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (Axum) and OpenAPI document
//! - `capsule` - capsule records, validation, status derivation, manifest
//! - `providers` - GitHub and Gmail REST clients
//! - `storage` - embedded key-value store and the repository file seam
//! - `unlock_job` - in-process variant of the repository unlock workflow

pub mod api;
pub mod capsule;
pub mod config;
pub mod content_grant;
pub mod crypto;
pub mod email_templates;
pub mod error;
pub mod mailer;
pub mod models;
pub mod providers;
pub mod rate_limit;
pub mod repo_init;
pub mod state;
pub mod storage;
pub mod unlock_job;
