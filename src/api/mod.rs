// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::any::Any;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    capsule::{CapsuleMetadata, ContentType, PhotoAttachment, SanitizedCapsule, ViewStatus},
    error::ApiError,
    models::{
        CapsuleCounts, CreateCapsuleResponse, CreatedCapsule, DashboardResponse, DashboardUser,
        GitHubAuthorizeResponse, GmailAuthorizeResponse, HealthResponse, RepositoryLink,
        StorageSummary, UserSession, VerifyPinRequest, VerifyPinResponse, ViewCapsuleResponse,
    },
    providers::github::{GitHubRepo, GitHubUser},
    rate_limit::RateLimitView,
    state::AppState,
};

pub mod auth;
pub mod capsule;
pub mod dashboard;
pub mod health;
pub mod view;

/// Largest upload (100 MiB video) plus multipart framing.
pub const MAX_BODY_BYTES: usize = 110 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/api", get(health::api_info))
        .route("/api/auth/github/authorize", get(auth::github_authorize))
        .route("/api/auth/github/callback", get(auth::github_callback))
        .route("/api/auth/session/{user_id}", get(auth::get_session))
        .route("/api/auth/gmail/authorize", get(auth::gmail_authorize))
        .route("/api/auth/gmail/callback", get(auth::gmail_callback))
        .route("/api/capsule/create", post(capsule::create_capsule))
        .route("/api/capsule/view/{token}", get(view::view_capsule))
        .route("/api/capsule/view/{token}/verify-pin", post(view::verify_pin))
        .route("/api/capsule/content/{token_hash}", get(view::capsule_content))
        .route("/api/capsule/photo/{token_hash}/{index}", get(view::capsule_photo))
        .route("/api/capsule/dashboard/{user_id}", get(dashboard::dashboard))
        .fallback(not_found)
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::very_permissive().max_age(Duration::from_secs(600)))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found("Not Found").with_detail("path", uri.path())
}

fn handle_panic(_payload: Box<dyn Any + Send + 'static>) -> Response {
    error!("Request handler panicked");
    ApiError::internal("Internal Server Error").into_response()
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::api_info,
        auth::github_authorize,
        auth::github_callback,
        auth::get_session,
        auth::gmail_authorize,
        auth::gmail_callback,
        capsule::create_capsule,
        view::view_capsule,
        view::verify_pin,
        view::capsule_content,
        view::capsule_photo,
        dashboard::dashboard
    ),
    components(
        schemas(
            HealthResponse,
            health::ApiInfo,
            health::ApiEndpoints,
            GitHubAuthorizeResponse,
            GmailAuthorizeResponse,
            UserSession,
            GitHubUser,
            GitHubRepo,
            CapsuleMetadata,
            ContentType,
            PhotoAttachment,
            CreatedCapsule,
            CreateCapsuleResponse,
            SanitizedCapsule,
            ViewStatus,
            RateLimitView,
            ViewCapsuleResponse,
            VerifyPinRequest,
            VerifyPinResponse,
            DashboardResponse,
            DashboardUser,
            StorageSummary,
            CapsuleCounts,
            RepositoryLink
        )
    ),
    tags(
        (name = "Health", description = "Liveness and service info"),
        (name = "Auth", description = "GitHub and Gmail OAuth, sessions"),
        (name = "Capsules", description = "Capsule creation, viewing and content"),
        (name = "Dashboard", description = "Per-user capsule overview")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_util {
    //! Request builders and response readers for router tests.

    use axum::{
        body::{to_bytes, Body, Bytes},
        http::{header, HeaderMap, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    pub async fn call_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = call(app, request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const BOUNDARY: &str = "capsule-test-boundary";

    /// Hand-built `multipart/form-data` body.
    #[derive(Default)]
    pub struct MultipartForm {
        body: Vec<u8>,
    }

    impl MultipartForm {
        pub fn text(mut self, name: &str, value: &str) -> Self {
            self.body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
            self
        }

        pub fn file(mut self, name: &str, file_name: &str, mime: &str, data: &[u8]) -> Self {
            self.body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            );
            self.body.extend_from_slice(data);
            self.body.extend_from_slice(b"\r\n");
            self
        }

        pub fn into_request(mut self, uri: &str) -> Request<Body> {
            self.body
                .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
            Request::post(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(self.body))
                .unwrap()
        }
    }
}
