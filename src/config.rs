use std::path::PathBuf;

use crate::pdf::{FontFamily, LayoutConstants, RenderSettings};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub template_path: PathBuf,
    pub verify_base_url: String,
    pub brand_name: String,
    pub brand_token: String,
    pub name_font: FontFamily,
    pub body_font: FontFamily,
    pub mail: MailConfig,
    pub host: String,
    pub port: u16,
    pub log_json: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    pub sender: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://certify.db".to_string());

        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let template_path = base_dir.join(
            std::env::var("TEMPLATE_PATH")
                .unwrap_or_else(|_| "assets/certificate_template.png".to_string()),
        );

        let verify_base_url = std::env::var("VERIFY_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5001/verify".to_string());
        if verify_base_url.trim().is_empty() {
            return Err("VERIFY_BASE_URL must not be empty".into());
        }

        let brand_name = std::env::var("BRAND_NAME").unwrap_or_else(|_| "Broader AI".to_string());
        let brand_token =
            std::env::var("BRAND_TOKEN").unwrap_or_else(|_| "BROADER_AI".to_string());

        let defaults = LayoutConstants::default();
        let name_font = font_var("NAME_FONT")?.unwrap_or(defaults.name_font);
        let body_font = font_var("BODY_FONT")?.unwrap_or(defaults.body_font);

        let mail = MailConfig {
            relay_url: non_empty_var("MAIL_RELAY_URL"),
            api_key: non_empty_var("MAIL_API_KEY"),
            sender: std::env::var("MAIL_SENDER")
                .unwrap_or_else(|_| "certificates@localhost".to_string()),
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5001".to_string())
            .parse()
            .unwrap_or(5001);

        let log_json = std::env::var("LOG_JSON")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            template_path,
            verify_base_url,
            brand_name,
            brand_token,
            name_font,
            body_font,
            mail,
            host,
            port,
            log_json,
        })
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            verify_base_url: self.verify_base_url.clone(),
            brand_name: self.brand_name.clone(),
            brand_token: self.brand_token.clone(),
            layout: LayoutConstants {
                name_font: self.name_font,
                body_font: self.body_font,
                ..LayoutConstants::default()
            },
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Standard font chosen by PostScript name, e.g. `Times-Bold`.
fn font_var(key: &str) -> Result<Option<FontFamily>, Box<dyn std::error::Error + Send + Sync>> {
    match non_empty_var(key) {
        Some(name) => FontFamily::from_base_font(&name)
            .map(Some)
            .ok_or_else(|| format!("{key}: unknown standard font {name:?}").into()),
        None => Ok(None),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
