// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All configuration is read once from the environment at startup into an
//! immutable [`AppConfig`]. Nothing mutates it afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ENCRYPTION_KEY` | 64 hex chars, AES-256 master key for tokens at rest | Required |
//! | `GITHUB_OAUTH_CLIENT_ID` | GitHub OAuth app client id | Required |
//! | `GITHUB_OAUTH_CLIENT_SECRET` | GitHub OAuth app client secret | Required |
//! | `GMAIL_CLIENT_ID` | Google OAuth client id | Required |
//! | `GMAIL_CLIENT_SECRET` | Google OAuth client secret | Required |
//! | `FRONTEND_URL` | Base URL for redirects and magic links | Required |
//! | `WORKER_URL` | Public base URL of this service | Required |
//! | `DATA_DIR` | Directory holding the KV database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8787` |
//! | `STORAGE_LIMIT_BYTES` | Per-repository storage quota | `1073741824` |
//! | `UNLOCK_POLL_INTERVAL_SECS` | Enables the in-process unlock scheduler | Unset (disabled) |
//! | `GITHUB_API_URL` | GitHub REST base URL | `https://api.github.com` |
//! | `GITHUB_OAUTH_URL` | GitHub OAuth base URL | `https://github.com` |
//! | `GMAIL_API_URL` | Gmail API base URL | `https://gmail.googleapis.com` |
//! | `GOOGLE_OAUTH_URL` | Google consent screen URL | `https://accounts.google.com/o/oauth2/v2/auth` |
//! | `GOOGLE_TOKEN_URL` | Google token endpoint | `https://oauth2.googleapis.com/token` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::MasterKey;

pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";
pub const GITHUB_CLIENT_ID_ENV: &str = "GITHUB_OAUTH_CLIENT_ID";
pub const GITHUB_CLIENT_SECRET_ENV: &str = "GITHUB_OAUTH_CLIENT_SECRET";
pub const GMAIL_CLIENT_ID_ENV: &str = "GMAIL_CLIENT_ID";
pub const GMAIL_CLIENT_SECRET_ENV: &str = "GMAIL_CLIENT_SECRET";
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";
pub const WORKER_URL_ENV: &str = "WORKER_URL";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const STORAGE_LIMIT_ENV: &str = "STORAGE_LIMIT_BYTES";
pub const UNLOCK_POLL_INTERVAL_ENV: &str = "UNLOCK_POLL_INTERVAL_SECS";

/// Log output format: `json` for structured logs, anything else for pretty.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8787;

/// 1 GiB per user repository.
pub const DEFAULT_STORAGE_LIMIT_BYTES: u64 = 1024 * 1024 * 1024;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_OAUTH_URL: &str = "https://github.com";
pub const DEFAULT_GMAIL_API_URL: &str = "https://gmail.googleapis.com";
pub const DEFAULT_GOOGLE_OAUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Name of the KV database file inside `DATA_DIR`.
pub const KV_FILE_NAME: &str = "capsules.redb";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Base URLs of every upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamUrls {
    pub github_api: String,
    pub github_oauth: String,
    pub gmail_api: String,
    pub google_oauth: String,
    pub google_token: String,
}

impl Default for UpstreamUrls {
    fn default() -> Self {
        Self {
            github_api: DEFAULT_GITHUB_API_URL.to_string(),
            github_oauth: DEFAULT_GITHUB_OAUTH_URL.to_string(),
            gmail_api: DEFAULT_GMAIL_API_URL.to_string(),
            google_oauth: DEFAULT_GOOGLE_OAUTH_URL.to_string(),
            google_token: DEFAULT_GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub master_key: MasterKey,
    pub github_client_id: String,
    pub github_client_secret: String,
    pub gmail_client_id: String,
    pub gmail_client_secret: String,
    pub frontend_url: String,
    pub worker_url: String,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub storage_limit_bytes: u64,
    pub unlock_poll_interval: Option<Duration>,
    pub upstream: UpstreamUrls,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| optional(name).ok_or_else(|| ConfigError::Missing(name.to_string()));
        let or_default = |name: &str, default: &str| optional(name).unwrap_or_else(|| default.to_string());

        let master_key = MasterKey::from_hex(&required(ENCRYPTION_KEY_ENV)?).map_err(|e| ConfigError::Invalid {
            name: ENCRYPTION_KEY_ENV.to_string(),
            reason: e.to_string(),
        })?;

        let port = match optional(PORT_ENV) {
            Some(raw) => parse_number(PORT_ENV, &raw)?,
            None => DEFAULT_PORT,
        };
        let storage_limit_bytes = match optional(STORAGE_LIMIT_ENV) {
            Some(raw) => parse_number(STORAGE_LIMIT_ENV, &raw)?,
            None => DEFAULT_STORAGE_LIMIT_BYTES,
        };
        let unlock_poll_interval = match optional(UNLOCK_POLL_INTERVAL_ENV) {
            Some(raw) => {
                let secs: u64 = parse_number(UNLOCK_POLL_INTERVAL_ENV, &raw)?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: UNLOCK_POLL_INTERVAL_ENV.to_string(),
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            master_key,
            github_client_id: required(GITHUB_CLIENT_ID_ENV)?,
            github_client_secret: required(GITHUB_CLIENT_SECRET_ENV)?,
            gmail_client_id: required(GMAIL_CLIENT_ID_ENV)?,
            gmail_client_secret: required(GMAIL_CLIENT_SECRET_ENV)?,
            frontend_url: trim_base(required(FRONTEND_URL_ENV)?),
            worker_url: trim_base(required(WORKER_URL_ENV)?),
            data_dir: PathBuf::from(or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            host: or_default(HOST_ENV, DEFAULT_HOST),
            port,
            storage_limit_bytes,
            unlock_poll_interval,
            upstream: UpstreamUrls {
                github_api: trim_base(or_default("GITHUB_API_URL", DEFAULT_GITHUB_API_URL)),
                github_oauth: trim_base(or_default("GITHUB_OAUTH_URL", DEFAULT_GITHUB_OAUTH_URL)),
                gmail_api: trim_base(or_default("GMAIL_API_URL", DEFAULT_GMAIL_API_URL)),
                google_oauth: or_default("GOOGLE_OAUTH_URL", DEFAULT_GOOGLE_OAUTH_URL),
                google_token: or_default("GOOGLE_TOKEN_URL", DEFAULT_GOOGLE_TOKEN_URL),
            },
        })
    }

    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join(KV_FILE_NAME)
    }

    /// `WORKER_URL/api/auth/github/callback`
    pub fn github_redirect_uri(&self) -> String {
        format!("{}/api/auth/github/callback", self.worker_url)
    }

    /// `WORKER_URL/api/auth/gmail/callback`
    pub fn gmail_redirect_uri(&self) -> String {
        format!("{}/api/auth/gmail/callback", self.worker_url)
    }

    /// Recipient-facing link carrying the plaintext magic token.
    pub fn magic_link(&self, token: &str) -> String {
        format!("{}/open?t={token}", self.frontend_url)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        master_key: MasterKey::from_hex(&"ab".repeat(32)).expect("test key"),
        github_client_id: "gh-client".to_string(),
        github_client_secret: "gh-secret".to_string(),
        gmail_client_id: "gmail-client".to_string(),
        gmail_client_secret: "gmail-secret".to_string(),
        frontend_url: "https://capsule.example".to_string(),
        worker_url: "https://api.capsule.example".to_string(),
        data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        host: DEFAULT_HOST.to_string(),
        port: DEFAULT_PORT,
        storage_limit_bytes: DEFAULT_STORAGE_LIMIT_BYTES,
        unlock_poll_interval: None,
        upstream: UpstreamUrls::default(),
    }
}
