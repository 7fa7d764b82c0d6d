use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::db::{CertificateRecord, NewRecord};
use crate::error::CertifyError;
use crate::pdf::RenderedCertificate;
use crate::state::AppState;
use crate::workflow::ApprovalOutcome;

type ApiResult<T> = Result<T, CertifyError>;

pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<NewRecord>,
) -> ApiResult<(StatusCode, Json<CertificateRecord>)> {
    let record = state.workflow.intake(submission).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_records(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<CertificateRecord>>> {
    Ok(Json(state.workflow.list().await?))
}

pub async fn approve_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApprovalOutcome>> {
    Ok(Json(state.workflow.approve(id).await?))
}

pub async fn reject_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CertificateRecord>> {
    Ok(Json(state.workflow.reject(id).await?))
}

pub async fn resend_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApprovalOutcome>> {
    Ok(Json(state.workflow.resend(id).await?))
}

pub async fn download_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let rendered = state.workflow.download(id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, RenderedCertificate::CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&rendered.file_name)),
        ],
        rendered.bytes,
    )
        .into_response())
}

/// Public lookup. Unknown and malformed codes both answer 404.
pub async fn verify_certificate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    let response = match state.workflow.verify(&code).await? {
        Some(view) => Json(serde_json::json!({
            "valid": true,
            "certificate": view,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "valid": false,
                "message": "Certificate not found. Please check the verification ID.",
            })),
        )
            .into_response(),
    };
    Ok(response)
}

/// Attachment header with an ASCII `filename` and the exact UTF-8 name in
/// `filename*` (RFC 6266).
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::new();
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
