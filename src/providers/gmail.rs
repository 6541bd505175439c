// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google OAuth and Gmail send integration.
//!
//! Mail goes out as a `multipart/alternative` MIME message (plain text first,
//! HTML second) posted to the Gmail "raw message" send endpoint.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::mailer::{Mailer, OutgoingEmail};

const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Refresh when the access token expires within this window.
pub const REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

const MIME_BOUNDARY: &str = "boundary";

#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error("Gmail request failed: {0}")]
    Request(String),

    #[error("Gmail returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Gmail OAuth error: {0}")]
    OAuth(String),

    #[error("Gmail response was invalid: {0}")]
    InvalidResponse(String),
}

/// Stored (encrypted) per user under `gmail_token:<userId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expiry_date: i64,
}

impl GmailTokens {
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        self.expiry_date < now_ms + REFRESH_MARGIN_MS
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_result(self) -> Result<(String, Option<String>, i64), GmailError> {
        if let Some(error) = self.error {
            return Err(GmailError::OAuth(self.error_description.unwrap_or(error)));
        }
        let access_token = self
            .access_token
            .ok_or_else(|| GmailError::InvalidResponse("missing access_token".to_string()))?;
        let expires_in = self.expires_in.unwrap_or(3600);
        let expiry_date = Utc::now().timestamp_millis() + expires_in * 1000;
        Ok((access_token, self.refresh_token, expiry_date))
    }
}

/// Header values never carry control characters (no CR/LF header splitting).
fn header_value(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// RFC 2047 encode non-ASCII subjects; ASCII passes through unchanged.
/// Control characters are dropped either way.
pub fn encode_subject(subject: &str) -> String {
    let subject = header_value(subject);
    if subject.is_ascii() {
        subject
    } else {
        format!("=?UTF-8?B?{}?=", Base64::encode_string(subject.as_bytes()))
    }
}

/// First boundary that occurs in none of the bodies.
fn pick_boundary(bodies: &[&str]) -> String {
    let mut boundary = MIME_BOUNDARY.to_string();
    let mut n = 0;
    while bodies.iter().any(|body| body.contains(&boundary)) {
        n += 1;
        boundary = format!("{MIME_BOUNDARY}_{n}");
    }
    boundary
}

/// Assemble the MIME message sent as the Gmail `raw` payload.
pub fn build_mime_message(to: &str, subject: &str, html: &str, text: &str) -> String {
    let boundary = pick_boundary(&[html, text]);
    [
        format!("To: {}", header_value(to)),
        format!("Subject: {}", encode_subject(subject)),
        "MIME-Version: 1.0".to_string(),
        format!("Content-Type: multipart/alternative; boundary=\"{boundary}\""),
        String::new(),
        format!("--{boundary}"),
        "Content-Type: text/plain; charset=\"UTF-8\"".to_string(),
        String::new(),
        text.to_string(),
        String::new(),
        format!("--{boundary}"),
        "Content-Type: text/html; charset=\"UTF-8\"".to_string(),
        String::new(),
        html.to_string(),
        String::new(),
        format!("--{boundary}--"),
    ]
    .join("\r\n")
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    api_base_url: String,
    oauth_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
}

impl GmailClient {
    pub fn new(
        api_base_url: &str,
        oauth_url: &str,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, GmailError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GmailError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            oauth_url: oauth_url.to_string(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GmailError> {
        Self::new(
            &config.upstream.gmail_api,
            &config.upstream.google_oauth,
            &config.upstream.google_token,
            &config.gmail_client_id,
            &config.gmail_client_secret,
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Offline-access consent URL for the `gmail.send` scope.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String, GmailError> {
        let mut url = url::Url::parse(&self.oauth_url)
            .map_err(|e| GmailError::Request(format!("invalid OAuth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GMAIL_SEND_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn token_request(&self, form: &[(&str, &str)], what: &str) -> Result<TokenResponse, GmailError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| GmailError::Request(format!("{what} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::Status {
                status: status.as_u16(),
                message: format!("{what} returned {status}: {body}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GmailError::InvalidResponse(format!("{what}: {e}")))
    }

    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GmailTokens, GmailError> {
        let data = self
            .token_request(
                &[
                    ("code", code),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ],
                "Gmail code exchange",
            )
            .await?;
        let (access_token, refresh_token, expiry_date) = data.into_result()?;
        let refresh_token = refresh_token
            .ok_or_else(|| GmailError::InvalidResponse("missing refresh_token".to_string()))?;

        Ok(GmailTokens {
            access_token,
            refresh_token,
            expiry_date,
        })
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Google may rotate the refresh token; the previous one is kept otherwise.
    pub async fn refresh_access_token(&self, tokens: &GmailTokens) -> Result<GmailTokens, GmailError> {
        let data = self
            .token_request(
                &[
                    ("refresh_token", tokens.refresh_token.as_str()),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                ],
                "Gmail token refresh",
            )
            .await?;
        let (access_token, refresh_token, expiry_date) = data.into_result()?;
        debug!("Refreshed Gmail access token");

        Ok(GmailTokens {
            access_token,
            refresh_token: refresh_token.unwrap_or_else(|| tokens.refresh_token.clone()),
            expiry_date,
        })
    }

    /// Access token usable right now. Refreshes lazily, never persists.
    pub async fn get_valid_access_token(&self, tokens: &GmailTokens) -> Result<String, GmailError> {
        if tokens.needs_refresh(Utc::now().timestamp_millis()) {
            return Ok(self.refresh_access_token(tokens).await?.access_token);
        }
        Ok(tokens.access_token.clone())
    }

    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
        access_token: &str,
    ) -> Result<(), GmailError> {
        let raw = Base64UrlUnpadded::encode_string(build_mime_message(to, subject, html, text).as_bytes());

        let response = self
            .http
            .post(format!("{}/gmail/v1/users/me/messages/send", self.api_base_url))
            .bearer_auth(access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| GmailError::Request(format!("send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::Status {
                status: status.as_u16(),
                message: format!("Gmail send failed: {body}"),
            });
        }

        info!("Email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for GmailClient {
    async fn send(&self, access_token: &str, email: &OutgoingEmail) -> Result<(), GmailError> {
        self.send_email(&email.to, &email.subject, &email.html, &email.text, access_token)
            .await
    }
}
