//! Single-page PDF drawing surface built directly on lopdf's object graph.

use std::collections::BTreeSet;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

use super::fonts::FontFamily;
use super::qr::QrMatrix;
use super::template::TemplateSurface;
use crate::error::Result;

const BACKGROUND: &str = "Im0";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);

    fn operands(self) -> Vec<Object> {
        vec![self.0.into(), self.1.into(), self.2.into()]
    }
}

#[derive(Debug, Clone)]
struct LinkAnnotation {
    rect: [f32; 4],
    uri: String,
}

/// Collects drawing operations over the template background and serializes
/// them as a one-page document. Coordinates are PDF points, origin at the
/// bottom-left corner.
pub struct PageCanvas<'a> {
    template: &'a TemplateSurface,
    operations: Vec<Operation>,
    fonts: BTreeSet<FontFamily>,
    links: Vec<LinkAnnotation>,
}

impl<'a> PageCanvas<'a> {
    pub(crate) fn new(template: &'a TemplateSurface) -> Self {
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    template.width().into(),
                    0.into(),
                    0.into(),
                    template.height().into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(BACKGROUND.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ];
        Self {
            template,
            operations,
            fonts: BTreeSet::new(),
            links: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.template.width()
    }

    pub fn height(&self) -> f32 {
        self.template.height()
    }

    /// Draws `text` with its baseline starting at `(x, y)`.
    pub fn draw_text(&mut self, text: &str, font: FontFamily, size: f32, x: f32, y: f32, color: Rgb) {
        if text.is_empty() {
            return;
        }
        self.fonts.insert(font);
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("rg", color.operands()),
            Operation::new(
                "Tf",
                vec![Object::Name(font.resource_name().as_bytes().to_vec()), size.into()],
            ),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::String(to_win_ansi(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    pub fn draw_rule(&mut self, x1: f32, x2: f32, y: f32, thickness: f32, color: Rgb) {
        self.operations.extend([
            Operation::new("w", vec![thickness.into()]),
            Operation::new("RG", color.operands()),
            Operation::new("m", vec![x1.into(), y.into()]),
            Operation::new("l", vec![x2.into(), y.into()]),
            Operation::new("S", vec![]),
        ]);
    }

    /// Paints the dark modules of `qr` into the square with lower-left
    /// corner `(x, y)` and side `size`.
    pub fn draw_qr(&mut self, qr: &QrMatrix, x: f32, y: f32, size: f32, color: Rgb) {
        let module = size / qr.width() as f32;
        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new("rg", color.operands()));
        for row in 0..qr.width() {
            for col in 0..qr.width() {
                if qr.is_dark(col, row) {
                    let left = x + col as f32 * module;
                    let bottom = y + size - (row + 1) as f32 * module;
                    self.operations.push(Operation::new(
                        "re",
                        vec![left.into(), bottom.into(), module.into(), module.into()],
                    ));
                }
            }
        }
        self.operations.push(Operation::new("f", vec![]));
        self.operations.push(Operation::new("Q", vec![]));
    }

    /// Makes the rectangle `[x1, y1, x2, y2]` a clickable link to `uri`.
    pub fn add_link(&mut self, rect: [f32; 4], uri: &str) {
        self.links.push(LinkAnnotation {
            rect,
            uri: uri.to_string(),
        });
    }

    pub fn finish(self, title: &str) -> Result<Vec<u8>> {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();

        let mut fonts = Dictionary::new();
        for font in &self.fonts {
            let font_id = document.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), font_id);
        }

        let image_id = document.add_object(self.template.image_xobject());
        let resources_id = document.add_object(dictionary! {
            "Font" => fonts,
            "XObject" => dictionary! { BACKGROUND => image_id },
        });

        let content = Content {
            operations: self.operations,
        };
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&content.encode()?)?;
        let content_id = document.add_object(Stream::new(
            dictionary! { "Filter" => "FlateDecode" },
            encoder.finish()?,
        ));

        let annots: Vec<Object> = self
            .links
            .iter()
            .map(|link| {
                let action = dictionary! {
                    "Type" => "Action",
                    "S" => "URI",
                    "URI" => Object::string_literal(link.uri.as_str()),
                };
                let rect: Vec<Object> = link.rect.iter().map(|v| (*v).into()).collect();
                document
                    .add_object(dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Link",
                        "Rect" => rect,
                        "Border" => vec![0.into(), 0.into(), 0.into()],
                        "A" => action,
                    })
                    .into()
            })
            .collect();

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), self.template.width().into(), self.template.height().into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        };
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        let page_id = document.add_object(page);

        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = document.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Producer" => Object::string_literal("certify"),
        });
        document.trailer.set("Root", catalog_id);
        document.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        document.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn to_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}
