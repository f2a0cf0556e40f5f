//! HTTP surface: application state, error envelope, and the router.
//!
//! Handlers are stateless; everything shared lives in [`AppState`] behind
//! `Arc`'d seams so tests can swap the store, generator, fetcher, and page
//! source independently.

pub mod handlers;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

use crate::claim::ClaimError;
use crate::config;
use crate::db::Pool;
use crate::genai::{PageFetcher, TextGenerator};
use crate::store::{BatchStore, StoreError};

/// Default request body size limit (1MB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub store: Arc<dyn BatchStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub blog: config::Blog,
}

/// Error codes carried in the JSON error envelope. Each maps to exactly one
/// status class so clients can branch without parsing message text.
pub mod error_codes {
    /// Malformed request; caller error, never retried. 400.
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    /// Batch, item index, or blog does not exist. 404.
    pub const NOT_FOUND: &str = "not_found";
    /// The claim lost to (or arrived after) another team member. 409.
    pub const ALREADY_CLAIMED: &str = "already_claimed";
    /// The blog was already approved; a second approval has no effect. 409.
    pub const ALREADY_QUEUED: &str = "already_queued";
    /// Transient storage failure; retrying the whole request is safe. 503.
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    /// Unexpected internal error. 500.
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// JSON error envelope: `{error, message}` plus the holder's name on claim
/// conflicts so the UI can render "already copied by <name>".
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copied_by: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: code.into(),
            message: message.into(),
            copied_by: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_ARGUMENT, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(error_codes::NOT_FOUND, message)
    }

    pub fn already_claimed(copied_by: impl Into<String>) -> Self {
        let copied_by = copied_by.into();
        Self {
            error: error_codes::ALREADY_CLAIMED.into(),
            message: format!("This content was already copied by {copied_by}."),
            copied_by: Some(copied_by),
        }
    }

    pub fn already_queued(message: impl Into<String>) -> Self {
        Self::new(error_codes::ALREADY_QUEUED, message)
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(error_codes::STORE_UNAVAILABLE, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use error_codes::*;

        let status = match self.error.as_str() {
            INVALID_ARGUMENT => StatusCode::BAD_REQUEST,
            NOT_FOUND => StatusCode::NOT_FOUND,
            ALREADY_CLAIMED | ALREADY_QUEUED => StatusCode::CONFLICT,
            STORE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::InvalidArgument(msg) => ApiError::invalid_argument(msg),
            ClaimError::NotFound => ApiError::not_found("batch or item not found"),
            ClaimError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(?err, "store unavailable");
        ApiError::store_unavailable("storage backend unavailable")
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(?err, "internal error");
        ApiError::internal_error(err.to_string())
    }
}

/// JSON extractor that renders deserialization failures in our error
/// envelope as 400 instead of axum's default rejection.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::invalid_argument(rejection.body_text())),
        }
    }
}

/// Creates the router with the default body size limit.
pub fn create_router(state: AppState) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

pub fn create_router_with_body_limit(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/claim", post(handlers::claim_post_copy))
        .route(
            "/api/batches",
            get(handlers::list_batches).post(handlers::create_batch),
        )
        .route("/api/batches/:batch_id", delete(handlers::delete_batch))
        .route(
            "/api/batches/:batch_id/unclaimed",
            delete(handlers::delete_unclaimed_items),
        )
        .route("/api/posts/generate", post(handlers::generate_product_posts))
        .route(
            "/api/news-posts/generate",
            post(handlers::generate_news_posts),
        )
        .route(
            "/api/blogs",
            get(handlers::list_blogs),
        )
        .route("/api/blogs/generate", post(handlers::generate_blog))
        .route("/api/blogs/:blog_id", delete(handlers::delete_blog))
        .route("/api/blogs/:blog_id/approve", post(handlers::approve_blog))
        .route("/api/blogs/:blog_id/copy", post(handlers::copy_blog))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(body_limit))
}
