//! HTTP routes.
//!
//! | Route                        | Response                                   |
//! |------------------------------|--------------------------------------------|
//! | `GET /register?email=`       | token as `text/plain`                      |
//! | `GET /report?key=&origin=`   | `{"status":"ok"}` or `{"status":"error",..}` |
//! | `GET /healthz`               | `ok`                                       |
//!
//! Every response carries `Access-Control-Allow-Origin: *` so the reporting
//! script works from whatever origin serves the page. A query string that
//! cannot be parsed is answered with 400 in the route's usual body format.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clonewatch_service::{CanaryService, HitReport, HitResponse, Notifier, ServiceError};
use clonewatch_store::BlobStore;
use serde::Deserialize;

/// Service handle shared by all request handlers.
pub type SharedService = Arc<CanaryService<dyn BlobStore, dyn Notifier>>;

/// Client message for a query string that cannot be parsed.
pub const MALFORMED_QUERY: &str = "Malformed query string.";

fn allow_any_origin() -> [(header::HeaderName, &'static str); 1] {
    [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")]
}

/// Query string of `GET /register`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterParams {
    /// Owner address.
    pub email: Option<String>,
}

/// Query string of `GET /report`.
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    /// Registration token.
    pub key: Option<String>,
    /// Origin the page was loaded from.
    pub origin: Option<String>,
}

/// Builds the application router.
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/register", get(register))
        .route("/report", get(report))
        .route("/healthz", get(healthz))
        .with_state(service)
}

/// HTTP status for a failed operation.
///
/// The response body always keeps its normal shape; the status only tells
/// proxies and monitoring which side failed.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidEmail { .. }
        | ServiceError::MissingParameter { .. }
        | ServiceError::UnknownToken { .. } => StatusCode::BAD_REQUEST,
        ServiceError::NotificationFailed { .. } => StatusCode::BAD_GATEWAY,
        ServiceError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::CorruptState { .. } | ServiceError::Encoding { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

async fn register(
    State(service): State<SharedService>,
    params: Result<Query<RegisterParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected registration query");
            return (StatusCode::BAD_REQUEST, allow_any_origin(), MALFORMED_QUERY).into_response();
        },
    };
    let email = params.email.unwrap_or_default();
    // Registration flushes to disk; keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || service.register(&email)).await;
    match result {
        Ok(Ok(token)) => (StatusCode::OK, allow_any_origin(), token.into_inner()).into_response(),
        Ok(Err(err)) => {
            if !err.is_client_error() {
                tracing::warn!(error = %err, "Registration failed");
            }
            (status_for(&err), allow_any_origin(), err.client_message()).into_response()
        },
        Err(e) => {
            tracing::error!(error = %e, "Registration task aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, allow_any_origin(), "Registration failed.")
                .into_response()
        },
    }
}

async fn report(
    State(service): State<SharedService>,
    headers: HeaderMap,
    params: Result<Query<ReportParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected report query");
            let body = HitResponse::Error { message: MALFORMED_QUERY.to_string() };
            return (StatusCode::BAD_REQUEST, allow_any_origin(), Json(body)).into_response();
        },
    };
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let report = HitReport { key: params.key, origin: params.origin, user_agent };

    let result = service.report_hit(&report).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            if !err.is_client_error() {
                tracing::warn!(error = %err, retryable = err.is_retryable(), "Hit report failed");
            }
            status_for(err)
        },
    };
    (status, allow_any_origin(), Json(HitResponse::from(result))).into_response()
}

async fn healthz() -> impl IntoResponse {
    (allow_any_origin(), "ok")
}
