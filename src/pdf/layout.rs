//! Placement of every text element on the certificate page.
//!
//! Geometry is derived from the template size only, so the same record and
//! code always produce the same layout.

use chrono::{Datelike, NaiveDate};

use super::canvas::{PageCanvas, Rgb};
use super::fit::{fit_single, fit_uniform};
use super::fonts::{FontFamily, ASCENT, DESCENT};
use super::qr::QrMatrix;
use super::RenderSettings;
use crate::db::{CertificateRecord, Track};
use crate::error::Result;

const LEAD_IN: &str = "has successfully completed";
const GOODWILL: &str = "We wish them every success in their future endeavours.";
const LINK_PREFIX: &str = "Verify this certificate at ";

/// Tunable placement constants. Fractions are of page width (`*_width`,
/// `center_x`, `footer_margin`) or page height measured from the bottom
/// (`*_y`).
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConstants {
    pub center_x: f32,
    pub text_color: Rgb,
    pub link_color: Rgb,

    pub name_font: FontFamily,
    pub name_start_size: f32,
    pub name_min_size: f32,
    pub name_width: f32,
    pub name_y: f32,

    pub underline_margin: f32,
    /// Distance below the name baseline, as a multiple of the name size.
    pub underline_drop: f32,
    pub underline_thickness: f32,

    pub body_font: FontFamily,
    pub body_start_size: f32,
    pub body_min_size: f32,
    pub body_width: f32,
    pub body_y: f32,
    pub line_spacing: f32,

    pub closing_min_size: f32,
    pub link_y: f32,
    pub link_width: f32,

    pub footer_y: f32,
    pub footer_margin: f32,
    pub footer_width: f32,

    /// Side of the verification QR code, as a fraction of page height.
    pub qr_size: f32,
    /// Top edge of the QR code; it sits under the footer, right-aligned.
    pub qr_top: f32,
}

impl Default for LayoutConstants {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            text_color: Rgb(0.1, 0.2, 0.5),
            link_color: Rgb(0.1, 0.3, 0.8),

            name_font: FontFamily::TimesBold,
            name_start_size: 64.0,
            name_min_size: 20.0,
            name_width: 0.80,
            name_y: 0.56,

            underline_margin: 40.0,
            underline_drop: 0.22,
            underline_thickness: 2.0,

            body_font: FontFamily::Helvetica,
            body_start_size: 28.0,
            body_min_size: 10.0,
            body_width: 0.80,
            body_y: 0.48,
            line_spacing: 1.35,

            closing_min_size: 8.0,
            link_y: 0.10,
            link_width: 0.80,

            footer_y: 0.92,
            footer_margin: 0.04,
            footer_width: 0.40,

            qr_size: 0.12,
            qr_top: 0.86,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPlacement {
    pub text: String,
    pub font: FontFamily,
    pub size: f32,
    /// Left end of the baseline.
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

impl TextPlacement {
    fn new(text: String, font: FontFamily, size: f32, x: f32, y: f32) -> Self {
        let width = font.measure(&text, size);
        Self { text, font, size, x, y, width }
    }

    fn centered(text: String, font: FontFamily, size: f32, center: f32, y: f32) -> Self {
        let width = font.measure(&text, size);
        Self { text, font, size, x: center - width / 2.0, y, width }
    }

    /// Bounding box `[x1, y1, x2, y2]` of the rendered glyphs.
    pub fn bounds(&self) -> [f32; 4] {
        [
            self.x,
            self.y - DESCENT * self.size,
            self.x + self.width,
            self.y + ASCENT * self.size,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub x1: f32,
    pub x2: f32,
    pub y: f32,
    pub thickness: f32,
}

/// Square QR code of `payload`, lower-left corner at `(x, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct QrPlacement {
    pub payload: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl QrPlacement {
    pub fn bounds(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.size, self.y + self.size]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateLayout {
    pub headline: TextPlacement,
    pub underline: Rule,
    pub body: [TextPlacement; 3],
    pub body_size: f32,
    pub closing: TextPlacement,
    pub link: TextPlacement,
    pub link_uri: String,
    pub link_rect: [f32; 4],
    pub footer: Option<TextPlacement>,
    /// Only present once the record has a code.
    pub qr: Option<QrPlacement>,
}

pub struct LayoutEngine<'a> {
    settings: &'a RenderSettings,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(settings: &'a RenderSettings) -> Self {
        Self { settings }
    }

    pub fn compose(&self, record: &CertificateRecord, width: f32, height: f32) -> CertificateLayout {
        let c = &self.settings.layout;
        let center = width * c.center_x;

        let name_budget = width * c.name_width;
        let name_size = fit_single(&record.name, c.name_font, c.name_start_size, name_budget, c.name_min_size);
        let headline = TextPlacement::centered(record.name.clone(), c.name_font, name_size, center, height * c.name_y);

        let rule_len = (headline.width + c.underline_margin).min(name_budget);
        let underline = Rule {
            x1: center - rule_len / 2.0,
            x2: center + rule_len / 2.0,
            y: headline.y - c.underline_drop * name_size,
            thickness: c.underline_thickness,
        };

        let body_budget = width * c.body_width;
        let lines = body_lines(record, &self.settings.brand_name);
        let body_size = fit_uniform(&lines, c.body_font, c.body_start_size, body_budget, c.body_min_size);
        let gap = c.line_spacing * body_size;
        let top = height * c.body_y;
        let [l1, l2, l3] = lines;
        let body = [
            TextPlacement::centered(l1, c.body_font, body_size, center, top),
            TextPlacement::centered(l2, c.body_font, body_size, center, top - gap),
            TextPlacement::centered(l3, c.body_font, body_size, center, top - 2.0 * gap),
        ];

        let closing_min = c.closing_min_size.min(body_size);
        let closing_size = fit_single(GOODWILL, c.body_font, body_size, body_budget, closing_min);
        let closing = TextPlacement::centered(
            GOODWILL.to_string(),
            c.body_font,
            closing_size,
            center,
            top - 4.0 * gap,
        );

        let link_text = format!("{LINK_PREFIX}{}", self.settings.verify_base_url);
        let link_size = fit_single(&link_text, c.body_font, body_size, width * c.link_width, closing_min);
        let link = TextPlacement::centered(link_text, c.body_font, link_size, center, height * c.link_y);
        let link_rect = link.bounds();
        let link_uri = verification_uri(&self.settings.verify_base_url, record.verification_code.as_deref());

        let footer = record.verification_code.as_deref().map(|code| {
            let text = format!("Verification ID: {code}");
            let size = fit_single(&text, c.body_font, body_size, width * c.footer_width, closing_min);
            let text_width = c.body_font.measure(&text, size);
            let x = width - width * c.footer_margin - text_width;
            TextPlacement::new(text, c.body_font, size, x, height * c.footer_y)
        });

        let qr = record.verification_code.as_ref().map(|_| {
            let size = height * c.qr_size;
            QrPlacement {
                payload: link_uri.clone(),
                x: width - width * c.footer_margin - size,
                y: height * c.qr_top - size,
                size,
            }
        });

        CertificateLayout {
            headline,
            underline,
            body,
            body_size,
            closing,
            link,
            link_uri,
            link_rect,
            footer,
            qr,
        }
    }

    pub fn draw(&self, layout: &CertificateLayout, canvas: &mut PageCanvas<'_>) -> Result<()> {
        let c = &self.settings.layout;
        let mut text = |t: &TextPlacement, color: Rgb| canvas.draw_text(&t.text, t.font, t.size, t.x, t.y, color);

        text(&layout.headline, c.text_color);
        for line in &layout.body {
            text(line, c.text_color);
        }
        text(&layout.closing, c.text_color);
        text(&layout.link, c.link_color);
        if let Some(footer) = &layout.footer {
            text(footer, c.text_color);
        }

        let rule = &layout.underline;
        canvas.draw_rule(rule.x1, rule.x2, rule.y, rule.thickness, c.text_color);
        canvas.add_link(layout.link_rect, &layout.link_uri);

        if let Some(qr) = &layout.qr {
            let matrix = QrMatrix::encode(&qr.payload)?;
            canvas.draw_qr(&matrix, qr.x, qr.y, qr.size, Rgb::BLACK);
            canvas.add_link(qr.bounds(), &qr.payload);
        }
        Ok(())
    }
}

/// The three body lines: lead-in, track sentence, date range.
pub fn body_lines(record: &CertificateRecord, brand: &str) -> [String; 3] {
    let label = &record.track_label;
    let sentence = match record.track {
        Track::Internship => format!("an internship in {label} at {brand}, held from"),
        Track::Training => format!("the {label} training course at {brand}, held from"),
    };
    [
        LEAD_IN.to_string(),
        sentence,
        date_range(record.start_date, record.end_date),
    ]
}

pub fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=20).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

pub fn ordinal(day: u32) -> String {
    format!("{day}{}", ordinal_suffix(day))
}

/// `1st June 2024`
pub fn long_date(date: NaiveDate) -> String {
    format!("{} {}", ordinal(date.day()), date.format("%B %Y"))
}

pub fn date_range(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} to {}", long_date(start), long_date(end))
}

pub(super) fn verification_uri(base: &str, code: Option<&str>) -> String {
    match code {
        Some(code) => {
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{base}{sep}code={code}")
        }
        None => base.to_string(),
    }
}
