use crate::mail::HttpMailRelay;
use crate::workflow::CertificateWorkflow;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<CertificateWorkflow<HttpMailRelay>>,
}
