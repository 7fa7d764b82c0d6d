mod api;

pub use api::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::CertifyError;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/records", get(list_records).post(create_record))
        .route("/api/records/:id/approve", post(approve_record))
        .route("/api/records/:id/reject", post(reject_record))
        .route("/api/records/:id/resend", post(resend_certificate))
        .route("/api/records/:id/certificate", get(download_certificate))
        .route("/api/verify/:code", get(verify_certificate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for CertifyError {
    fn into_response(self) -> Response {
        let status = match &self {
            CertifyError::Validation(_) => StatusCode::BAD_REQUEST,
            CertifyError::NotFound(_) => StatusCode::NOT_FOUND,
            CertifyError::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
