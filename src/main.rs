mod config;
mod db;
mod error;
mod mail;
mod pdf;
mod registry;
mod routes;
mod state;
mod workflow;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::RecordStore;
use crate::mail::HttpMailRelay;
use crate::pdf::{CertificateAssembler, TemplateSurface};
use crate::registry::VerificationRegistry;
use crate::workflow::CertificateWorkflow;

fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = config::Config::from_env()?;
    init_tracing("certify=info,tower_http=info", config.log_json);

    let store = RecordStore::open(&config.database_url).await?;
    let template = Arc::new(TemplateSurface::load(&config.template_path)?);
    let assembler = CertificateAssembler::new(template, config.render_settings());

    if config.mail.relay_url.is_none() {
        tracing::warn!("MAIL_RELAY_URL is not set; approvals will not be emailed");
    }
    let mailer = HttpMailRelay::new(config.mail.clone())?;

    let workflow = CertificateWorkflow::new(
        store.clone(),
        VerificationRegistry::new(store),
        assembler,
        mailer,
    );
    let state = Arc::new(state::AppState {
        workflow: Arc::new(workflow),
    });

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Certify listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
