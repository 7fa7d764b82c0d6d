use thiserror::Error;

use crate::db::Status;

pub type Result<T> = std::result::Result<T, CertifyError>;

#[derive(Debug, Error)]
pub enum CertifyError {
    /// Missing or corrupt template asset, bad settings, exhausted code space.
    /// Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("record {0} not found")]
    NotFound(i64),

    #[error("record {id} is {status} and cannot be {action}")]
    InvalidTransition {
        id: i64,
        status: Status,
        action: &'static str,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("QR code error: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure of the outbound email step. Reported next to a successful approval,
/// never in place of it.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mail relay is not configured")]
    NotConfigured,

    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}
