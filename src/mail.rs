use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;
use crate::db::CertificateRecord;
use crate::error::DeliveryError;
use crate::pdf::{long_date, RenderedCertificate};

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// A certificate email, ready for any transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Attachment,
}

impl CertificateMail {
    pub fn compose(record: &CertificateRecord, rendered: &RenderedCertificate, brand: &str) -> Self {
        let kind = record.track.display_name();
        let subject = format!("{brand} - Your {kind} Certificate");

        let mut body = format!(
            "Dear {name},\n\n\
             Congratulations! Your {kind_lower} at {brand} has been successfully completed and approved.\n\n\
             Your certificate is attached to this email.\n\n\
             {kind} Details:\n\
             - Name: {name}\n\
             - Email: {email}\n\
             - {kind}: {label}\n\
             - Start Date: {start}\n\
             - End Date: {end}\n\
             - Duration: {days} days\n",
            name = record.name,
            kind_lower = kind.to_lowercase(),
            email = record.email,
            label = record.track_label,
            start = long_date(record.start_date),
            end = long_date(record.end_date),
            days = record.duration_days(),
        );
        if let Some(code) = &record.verification_code {
            body.push_str(&format!("- Verification ID: {code}\n"));
        }
        body.push_str(&format!(
            "\nWe appreciate your dedication and contribution.\n\nBest regards,\n{brand} Team\n"
        ));

        Self {
            to: record.email.clone(),
            subject,
            body,
            attachment: Attachment {
                file_name: rendered.file_name.clone(),
                content_type: RenderedCertificate::CONTENT_TYPE,
                data: rendered.bytes.clone(),
            },
        }
    }
}

/// Outbound email delivery.
pub trait MailTransport: Send + Sync {
    fn send(&self, mail: &CertificateMail) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    attachments: Vec<RelayAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    /// Base64.
    content: String,
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailRelay {
    client: Client,
    config: MailConfig,
}

impl HttpMailRelay {
    pub fn new(config: MailConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    fn payload<'a>(&'a self, mail: &'a CertificateMail) -> RelayMessage<'a> {
        RelayMessage {
            from: &self.config.sender,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.body,
            attachments: vec![RelayAttachment {
                filename: &mail.attachment.file_name,
                content_type: mail.attachment.content_type,
                content: STANDARD.encode(&mail.attachment.data),
            }],
        }
    }
}

impl MailTransport for HttpMailRelay {
    async fn send(&self, mail: &CertificateMail) -> Result<(), DeliveryError> {
        let url = self.config.relay_url.as_deref().ok_or(DeliveryError::NotConfigured)?;

        let mut request = self.client.post(url).json(&self.payload(mail));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %mail.to, attachment = %mail.attachment.file_name, "Certificate email sent");
        Ok(())
    }
}
