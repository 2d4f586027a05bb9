// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP API handlers

pub mod benchmarks;
pub mod catalog;
pub mod health;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use benchlens_core::MetricCatalog;
use benchlens_query::{AggregateError, BenchmarkAggregator, ProviderError, ReportProvider};
use benchlens_storage::{ReportStore, StorageError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Header carrying the authenticated user's email address
pub const OWNER_HEADER: &str = "x-user-email";

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Every source failed; carries the per-source messages
    #[error("{message}")]
    NoUsableData {
        message: String,
        errors_by_source: BTreeMap<String, String>,
    },

    #[error("Provider error: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors_by_source) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            ApiError::NoUsableData {
                message,
                errors_by_source,
            } => (StatusCode::UNPROCESSABLE_ENTITY, message, Some(errors_by_source)),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                errors_by_source,
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors_by_source: Option<BTreeMap<String, String>>,
}

impl From<AggregateError> for ApiError {
    fn from(e: AggregateError) -> Self {
        let message = e.to_string();
        match e {
            AggregateError::InvalidParams(_) => ApiError::BadRequest(message),
            AggregateError::NoUsableData { errors } => ApiError::NoUsableData {
                message,
                errors_by_source: errors,
            },
            AggregateError::InvariantViolation(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(uuid) => ApiError::NotFound(format!("Report {} not found", uuid)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Run a report store write on the blocking pool. Writes hold the store lock
/// while the file is copied and rewritten.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task panicked: {}", e)))?
        .map_err(ApiError::from)
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ReportStore>,
    pub aggregator: Arc<BenchmarkAggregator>,
    pub provider: Arc<dyn ReportProvider>,
    pub catalog: Arc<MetricCatalog>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<ReportStore>,
        provider: Arc<dyn ReportProvider>,
        aggregator: BenchmarkAggregator,
        catalog: MetricCatalog,
    ) -> Self {
        Self {
            store,
            aggregator: Arc::new(aggregator),
            provider,
            catalog: Arc::new(catalog),
            started_at: Instant::now(),
        }
    }
}

/// Email of the user making the request, taken from [`OWNER_HEADER`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(|email| Owner(email.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
