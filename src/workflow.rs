use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{CertificateRecord, NewRecord, RecordStore, Status, Track};
use crate::error::{CertifyError, Result};
use crate::mail::{CertificateMail, MailTransport};
use crate::pdf::{date_range, CertificateAssembler, RenderedCertificate};
use crate::registry::VerificationRegistry;

/// Result of approving (or re-sending) a certificate. Delivery problems are
/// reported here, the approval itself stands.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub record: CertificateRecord,
    pub verification_code: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

/// What a public verification lookup is allowed to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationView {
    pub name: String,
    pub track: Track,
    pub track_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period: String,
    pub verification_code: String,
    /// The certificate's QR code as a PNG data URL.
    pub qr_code_data_url: String,
}

impl VerificationView {
    fn from_record(record: CertificateRecord, code: String, qr_code_data_url: String) -> Self {
        Self {
            period: date_range(record.start_date, record.end_date),
            name: record.name,
            track: record.track,
            track_label: record.track_label,
            start_date: record.start_date,
            end_date: record.end_date,
            verification_code: code,
            qr_code_data_url,
        }
    }
}

pub struct CertificateWorkflow<M> {
    store: RecordStore,
    registry: VerificationRegistry,
    assembler: CertificateAssembler,
    mailer: M,
}

impl<M: MailTransport> CertificateWorkflow<M> {
    pub fn new(
        store: RecordStore,
        registry: VerificationRegistry,
        assembler: CertificateAssembler,
        mailer: M,
    ) -> Self {
        Self {
            store,
            registry,
            assembler,
            mailer,
        }
    }

    pub async fn intake(&self, submission: NewRecord) -> Result<CertificateRecord> {
        let draft = submission.validate()?;
        let record = self.store.create_record(&draft).await?;
        info!(record_id = record.id, track = record.track.as_str(), "Record submitted");
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<CertificateRecord>> {
        self.store.list_records().await
    }

    async fn load(&self, id: i64) -> Result<CertificateRecord> {
        self.store.get_record(id).await?.ok_or(CertifyError::NotFound(id))
    }

    pub async fn approve(&self, id: i64) -> Result<ApprovalOutcome> {
        self.store
            .set_status(id, Status::Approved, &[Status::Pending, Status::Approved])
            .await?;
        info!(record_id = id, "Record approved");

        self.issue_and_deliver(id).await
    }

    /// Only pending records can be rejected; rejection is terminal.
    pub async fn reject(&self, id: i64) -> Result<CertificateRecord> {
        self.store.set_status(id, Status::Rejected, &[Status::Pending]).await?;
        info!(record_id = id, "Record rejected");
        self.load(id).await
    }

    pub async fn download(&self, id: i64) -> Result<RenderedCertificate> {
        let record = self.approved(id, "downloaded").await?;
        self.registry.issue_code(id).await?;
        let record = self.load(record.id).await?;
        self.render(record).await
    }

    pub async fn resend(&self, id: i64) -> Result<ApprovalOutcome> {
        self.approved(id, "resent").await?;
        self.issue_and_deliver(id).await
    }

    pub async fn verify(&self, raw_code: &str) -> Result<Option<VerificationView>> {
        let Some(record) = self.registry.resolve(raw_code).await? else {
            return Ok(None);
        };
        let Some(code) = record.verification_code.clone() else {
            return Ok(None);
        };
        let qr = self.assembler.verification_qr(&code)?;
        Ok(Some(VerificationView::from_record(record, code, qr)))
    }

    async fn approved(&self, id: i64, action: &'static str) -> Result<CertificateRecord> {
        let record = self.load(id).await?;
        if record.status != Status::Approved {
            return Err(CertifyError::InvalidTransition {
                id,
                status: record.status,
                action,
            });
        }
        Ok(record)
    }

    async fn render(&self, record: CertificateRecord) -> Result<RenderedCertificate> {
        let assembler = self.assembler.clone();
        tokio::task::spawn_blocking(move || assembler.render(&record)).await?
    }

    async fn issue_and_deliver(&self, id: i64) -> Result<ApprovalOutcome> {
        let code = self.registry.issue_code(id).await?;
        let record = self.load(id).await?;
        let rendered = self.render(record.clone()).await?;

        let mail = CertificateMail::compose(&record, &rendered, &self.assembler.settings().brand_name);
        match self.mailer.send(&mail).await {
            Ok(()) => {
                self.store.mark_certificate_sent(id).await?;
                Ok(ApprovalOutcome {
                    record: self.load(id).await?,
                    verification_code: code,
                    delivered: true,
                    delivery_error: None,
                })
            }
            Err(e) => {
                warn!(record_id = id, error = %e, "Certificate delivery failed");
                Ok(ApprovalOutcome {
                    record,
                    verification_code: code,
                    delivered: false,
                    delivery_error: Some(e.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::pdf::template::tests::png_template;
    use crate::pdf::{RenderSettings, TemplateSurface};
    use crate::registry::is_valid_code;
    use lopdf::Document;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingMailer {
        sent: Arc<Mutex<Vec<CertificateMail>>>,
    }

    impl MailTransport for RecordingMailer {
        async fn send(&self, mail: &CertificateMail) -> std::result::Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    impl MailTransport for FailingMailer {
        async fn send(&self, _mail: &CertificateMail) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::Rejected {
                status: 503,
                body: "relay down".to_string(),
            })
        }
    }

    async fn workflow<M: MailTransport>(mailer: M) -> CertificateWorkflow<M> {
        workflow_on(RecordStore::open_in_memory().await.unwrap(), mailer)
    }

    fn workflow_on<M: MailTransport>(store: RecordStore, mailer: M) -> CertificateWorkflow<M> {
        let template = TemplateSurface::from_bytes(&png_template(1200, 848)).unwrap();
        let assembler = CertificateAssembler::new(Arc::new(template), RenderSettings::default());
        CertificateWorkflow::new(store.clone(), VerificationRegistry::new(store), assembler, mailer)
    }

    fn submission(track: Track, name: &str) -> NewRecord {
        NewRecord {
            track,
            name: name.to_string(),
            email: "jordan@example.org".to_string(),
            track_label: "Data Science".to_string(),
            start_date: "2024-06-01".to_string(),
            end_date: "2024-08-30".to_string(),
        }
    }

    fn shown_text(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        doc.get_and_decode_page_content(page_id)
            .unwrap()
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| String::from_utf8(op.operands[0].as_str().unwrap().to_vec()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn approval_issues_code_and_mails_the_certificate() {
        let mailer = RecordingMailer::default();
        let workflow = workflow(mailer.clone()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        assert_eq!(record.status, Status::Pending);

        let outcome = workflow.approve(record.id).await.unwrap();
        assert!(is_valid_code(&outcome.verification_code));
        assert!(outcome.delivered);
        assert_eq!(outcome.record.status, Status::Approved);
        assert!(outcome.record.certificate_sent);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachment.file_name, "BROADER_AI_Certificate_Jordan_Lee.pdf");
        let text = shown_text(&sent[0].attachment.data);
        assert_eq!(text[3], "1st June 2024 to 30th August 2024");
    }

    #[tokio::test]
    async fn never_issued_code_is_not_found() {
        let workflow = workflow(RecordingMailer::default()).await;
        let intern = workflow.intake(submission(Track::Internship, "A")).await.unwrap();
        let trainee = workflow.intake(submission(Track::Training, "B")).await.unwrap();
        let a = workflow.approve(intern.id).await.unwrap().verification_code;
        let b = workflow.approve(trainee.id).await.unwrap().verification_code;

        let unused = if a != "00000000" && b != "00000000" { "00000000" } else { "11111111" };
        assert!(workflow.verify(unused).await.unwrap().is_none());
        assert!(workflow.verify("not-a-code").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verify_exposes_public_details() {
        let workflow = workflow(RecordingMailer::default()).await;
        let record = workflow.intake(submission(Track::Training, "Ana Ruiz")).await.unwrap();
        let code = workflow.approve(record.id).await.unwrap().verification_code;

        let view = workflow.verify(&code.to_lowercase()).await.unwrap().unwrap();
        assert_eq!(view.name, "Ana Ruiz");
        assert_eq!(view.track, Track::Training);
        assert_eq!(view.period, "1st June 2024 to 30th August 2024");
        assert_eq!(view.verification_code, code);
        assert!(view.qr_code_data_url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn approving_twice_keeps_the_code() {
        let workflow = workflow(RecordingMailer::default()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        let first = workflow.approve(record.id).await.unwrap();
        let second = workflow.approve(record.id).await.unwrap();
        assert_eq!(first.verification_code, second.verification_code);
    }

    #[tokio::test]
    async fn rejection_is_terminal() {
        let workflow = workflow(RecordingMailer::default()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        let rejected = workflow.reject(record.id).await.unwrap();
        assert_eq!(rejected.status, Status::Rejected);

        assert!(matches!(
            workflow.approve(record.id).await,
            Err(CertifyError::InvalidTransition { .. })
        ));
        assert!(matches!(
            workflow.reject(record.id).await,
            Err(CertifyError::InvalidTransition { .. })
        ));
        assert!(matches!(
            workflow.download(record.id).await,
            Err(CertifyError::InvalidTransition { .. })
        ));
        let stored = workflow.store.get_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.verification_code, None);
    }

    #[tokio::test]
    async fn approved_records_cannot_be_rejected() {
        let workflow = workflow(RecordingMailer::default()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        workflow.approve(record.id).await.unwrap();
        assert!(matches!(
            workflow.reject(record.id).await,
            Err(CertifyError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_approval() {
        let workflow = workflow(FailingMailer).await;
        let record = workflow.intake(submission(Track::Training, "Jordan Lee")).await.unwrap();

        let outcome = workflow.approve(record.id).await.unwrap();
        assert!(!outcome.delivered);
        assert!(outcome.delivery_error.unwrap().contains("relay down"));
        assert_eq!(outcome.record.status, Status::Approved);
        assert!(!outcome.record.certificate_sent);
        assert!(workflow.verify(&outcome.verification_code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pending_records_cannot_be_downloaded_or_resent() {
        let workflow = workflow(RecordingMailer::default()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        assert!(matches!(
            workflow.download(record.id).await,
            Err(CertifyError::InvalidTransition { .. })
        ));
        assert!(matches!(
            workflow.resend(record.id).await,
            Err(CertifyError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn resend_delivers_again_with_the_same_code() {
        let mailer = RecordingMailer::default();
        let workflow = workflow(mailer.clone()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        let approved = workflow.approve(record.id).await.unwrap();
        let resent = workflow.resend(record.id).await.unwrap();

        assert_eq!(approved.verification_code, resent.verification_code);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].attachment.data, sent[1].attachment.data);
    }

    #[tokio::test]
    async fn download_matches_the_mailed_document() {
        let mailer = RecordingMailer::default();
        let workflow = workflow(mailer.clone()).await;
        let record = workflow.intake(submission(Track::Internship, "Jordan Lee")).await.unwrap();
        workflow.approve(record.id).await.unwrap();

        let downloaded = workflow.download(record.id).await.unwrap();
        assert_eq!(downloaded.bytes, mailer.sent.lock().unwrap()[0].attachment.data);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let workflow = workflow(RecordingMailer::default()).await;
        assert!(matches!(workflow.approve(99).await, Err(CertifyError::NotFound(99))));
        assert!(matches!(workflow.download(99).await, Err(CertifyError::NotFound(99))));
    }

    #[tokio::test]
    async fn invalid_submissions_are_refused() {
        let workflow = workflow(RecordingMailer::default()).await;
        let mut bad = submission(Track::Internship, "Jordan Lee");
        bad.end_date = "2024-05-01".to_string();
        assert!(matches!(workflow.intake(bad).await, Err(CertifyError::Validation(_))));
        assert!(workflow.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_approve_and_reject_never_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("records.db").display());
        let store = RecordStore::open(&url).await.unwrap();
        let mailer = RecordingMailer::default();
        let workflow = workflow_on(store.clone(), mailer.clone());

        let mut approvals = 0;
        for i in 0..20 {
            let record = workflow
                .intake(submission(Track::Internship, &format!("Person {i}")))
                .await
                .unwrap();
            let (approved, rejected) = tokio::join!(workflow.approve(record.id), workflow.reject(record.id));
            assert!(approved.is_ok() != rejected.is_ok(), "exactly one transition wins for record {i}");

            let stored = store.get_record(record.id).await.unwrap().unwrap();
            if rejected.is_ok() {
                assert!(matches!(approved, Err(CertifyError::InvalidTransition { .. })));
                assert_eq!(stored.status, Status::Rejected);
                assert_eq!(stored.verification_code, None);
                assert!(!stored.certificate_sent);
            } else {
                approvals += 1;
                assert!(matches!(rejected, Err(CertifyError::InvalidTransition { .. })));
                assert_eq!(stored.status, Status::Approved);
                assert!(stored.verification_code.is_some());
            }
        }
        assert_eq!(mailer.sent.lock().unwrap().len(), approvals);
    }
}
