// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::HealthResponse;

/// Liveness probe. Does not touch upstream services.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is running", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiEndpoints {
    pub health: &'static str,
    pub auth: &'static str,
    pub capsule: &'static str,
    pub docs: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: ApiEndpoints,
}

#[utoipa::path(
    get,
    path = "/api",
    tag = "Health",
    responses((status = 200, description = "Service name, version and endpoint map", body = ApiInfo))
)]
pub async fn api_info() -> Json<ApiInfo> {
    Json(ApiInfo {
        message: "Memory Time Capsule API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ApiEndpoints {
            health: "/health",
            auth: "/api/auth/*",
            capsule: "/api/capsule/*",
            docs: "/docs",
        },
    })
}
