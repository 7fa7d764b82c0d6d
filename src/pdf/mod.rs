//! Certificate PDF generation.
//!
//! A fixed background image with text laid out over it; standard Type1 fonts only.

mod canvas;
mod fit;
mod fonts;
mod layout;
mod qr;
pub(crate) mod template;

pub use fonts::FontFamily;
pub use layout::{date_range, long_date, LayoutConstants};
pub use template::TemplateSurface;

use std::sync::Arc;

use tracing::debug;

use crate::db::CertificateRecord;
use crate::error::Result;

use self::layout::LayoutEngine;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub verify_base_url: String,
    pub brand_name: String,
    /// Prefix of attachment and download file names.
    pub brand_token: String,
    pub layout: LayoutConstants,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            verify_base_url: "http://localhost:5001/verify".to_string(),
            brand_name: "Broader AI".to_string(),
            brand_token: "BROADER_AI".to_string(),
            layout: LayoutConstants::default(),
        }
    }
}

/// A rendered document, owned by whoever asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCertificate {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RenderedCertificate {
    pub const CONTENT_TYPE: &'static str = "application/pdf";
}

/// Renders records over the shared template. Holds no per-render state, so
/// clones can run concurrently.
#[derive(Clone)]
pub struct CertificateAssembler {
    template: Arc<TemplateSurface>,
    settings: Arc<RenderSettings>,
}

impl CertificateAssembler {
    pub fn new(template: Arc<TemplateSurface>, settings: RenderSettings) -> Self {
        Self {
            template,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn layout(&self, record: &CertificateRecord) -> layout::CertificateLayout {
        LayoutEngine::new(&self.settings).compose(record, self.template.width(), self.template.height())
    }

    /// Does not touch the record; code issuance belongs to the caller.
    pub fn render(&self, record: &CertificateRecord) -> Result<RenderedCertificate> {
        let engine = LayoutEngine::new(&self.settings);
        let mut canvas = self.template.canvas();
        let layout = engine.compose(record, canvas.width(), canvas.height());
        engine.draw(&layout, &mut canvas)?;

        let title = format!("{} Certificate - {}", self.settings.brand_name, record.name);
        let bytes = canvas.finish(&title)?;
        debug!(
            record_id = record.id,
            name_size = layout.headline.size,
            body_size = layout.body_size,
            bytes = bytes.len(),
            "Certificate rendered"
        );

        Ok(RenderedCertificate {
            file_name: attachment_file_name(&self.settings.brand_token, &record.name),
            bytes,
        })
    }

    /// PNG data URL of the QR code printed on the certificate for `code`.
    pub fn verification_qr(&self, code: &str) -> Result<String> {
        qr::png_data_url(&layout::verification_uri(&self.settings.verify_base_url, Some(code)))
    }
}

/// `<TOKEN>_Certificate_<Name_With_Underscores>.pdf`. Quotes, slashes and
/// other punctuation are dropped from the name.
pub fn attachment_file_name(brand_token: &str, name: &str) -> String {
    let name: String = name
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            c if c.is_alphanumeric() || matches!(c, '-' | '.' | '\'') => Some(c),
            _ => None,
        })
        .collect();
    format!("{brand_token}_Certificate_{name}.pdf")
}
