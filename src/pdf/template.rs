//! Template image loading and the background XObject built from it.

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Stream};
use tracing::info;

use super::canvas::PageCanvas;
use crate::error::{CertifyError, Result};

/// The fixed certificate background. Its pixel size is the page size.
///
/// Decoded and compressed once, then shared read-only by every render.
#[derive(Debug)]
pub struct TemplateSurface {
    width: u32,
    height: u32,
    /// Flate-compressed 8-bit RGB samples.
    pixels: Vec<u8>,
}

impl TemplateSurface {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            CertifyError::Configuration(format!(
                "certificate template {} is unreadable: {e}",
                path.display()
            ))
        })?;
        let surface = Self::from_bytes(&bytes).map_err(|e| match e {
            CertifyError::Configuration(msg) => {
                CertifyError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        info!(
            path = %path.display(),
            width = surface.width,
            height = surface.height,
            "Certificate template loaded"
        );
        Ok(surface)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).map_err(|e| {
            CertifyError::Configuration(format!("certificate template cannot be decoded: {e}"))
        })?;
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(CertifyError::Configuration(
                "certificate template has no pixels".to_string(),
            ));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(decoded.to_rgb8().as_raw())?;
        let pixels = encoder.finish()?;

        Ok(Self { width, height, pixels })
    }

    pub fn width(&self) -> f32 {
        self.width as f32
    }

    pub fn height(&self) -> f32 {
        self.height as f32
    }

    /// A fresh drawing surface the size of the template.
    pub fn canvas(&self) -> PageCanvas<'_> {
        PageCanvas::new(self)
    }

    pub(crate) fn image_xobject(&self) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(self.width),
                "Height" => i64::from(self.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            self.pixels.clone(),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// PNG bytes for a plain template of the given size.
    pub(crate) fn png_template(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([250, 246, 235]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn dimensions_come_from_the_image() {
        let surface = TemplateSurface::from_bytes(&png_template(320, 200)).unwrap();
        assert_eq!(surface.width(), 320.0);
        assert_eq!(surface.height(), 200.0);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.png");
        std::fs::write(&path, png_template(64, 48)).unwrap();

        let surface = TemplateSurface::load(&path).unwrap();
        assert_eq!((surface.width(), surface.height()), (64.0, 48.0));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TemplateSurface::load(&dir.path().join("absent.png")).unwrap_err();
        assert!(matches!(err, CertifyError::Configuration(_)));
    }

    #[test]
    fn corrupt_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG definitely not an image").unwrap();

        let err = TemplateSurface::load(&path).unwrap_err();
        match err {
            CertifyError::Configuration(msg) => assert!(msg.contains("broken.png")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn xobject_describes_rgb_samples() {
        let surface = TemplateSurface::from_bytes(&png_template(10, 4)).unwrap();
        let stream = surface.image_xobject();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 10);
        assert_eq!(stream.dict.get(b"Height").unwrap().as_i64().unwrap(), 4);
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceRGB");
    }
}
