//! QR codes carrying the verification link.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Luma};
use qrcode::{Color, QrCode};

use crate::error::Result;

/// Pixels per module in the PNG form.
const PNG_MODULE_PX: u32 = 8;

/// Module grid of an encoded payload, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct QrMatrix {
    width: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(payload: &str) -> Result<Self> {
        let code = QrCode::new(payload.as_bytes())?;
        let dark = code.to_colors().into_iter().map(|c| c == Color::Dark).collect();
        Ok(Self {
            width: code.width(),
            dark,
        })
    }

    /// Modules per side, without a quiet zone.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.width + x]
    }
}

/// `data:image/png;base64,...` image of `payload`, quiet zone included.
pub fn png_data_url(payload: &str) -> Result<String> {
    let code = QrCode::new(payload.as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(PNG_MODULE_PX, PNG_MODULE_PX)
        .build();

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}
