//! Width metrics for the standard PDF Type1 families used on certificates.
//!
//! Only the printable ASCII range is tabulated; the layout never draws
//! anything else. Widths are in 1/1000 em units, taken from the Adobe AFM
//! files for each face.

/// Fonts available to the layout. None of them is embedded; viewers supply
/// the standard faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FontFamily {
    Helvetica,
    HelveticaBold,
    TimesRoman,
    TimesBold,
}

/// Ascender and descender of the Helvetica faces, used for link boxes.
pub const ASCENT: f32 = 0.718;
pub const DESCENT: f32 = 0.207;

/// Width used for characters outside the table.
const FALLBACK_WIDTH: u16 = 556;

impl FontFamily {
    pub const ALL: [FontFamily; 4] = [
        FontFamily::Helvetica,
        FontFamily::HelveticaBold,
        FontFamily::TimesRoman,
        FontFamily::TimesBold,
    ];

    /// Looks a family up by its PostScript name, ignoring case.
    pub fn from_base_font(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|font| font.base_font().eq_ignore_ascii_case(name))
    }

    pub fn base_font(self) -> &'static str {
        match self {
            FontFamily::Helvetica => "Helvetica",
            FontFamily::HelveticaBold => "Helvetica-Bold",
            FontFamily::TimesRoman => "Times-Roman",
            FontFamily::TimesBold => "Times-Bold",
        }
    }

    /// Name of the font in the page resource dictionary.
    pub fn resource_name(self) -> &'static str {
        match self {
            FontFamily::Helvetica => "F1",
            FontFamily::HelveticaBold => "F2",
            FontFamily::TimesRoman => "F3",
            FontFamily::TimesBold => "F4",
        }
    }

    fn widths(self) -> &'static [u16; 95] {
        match self {
            FontFamily::Helvetica => &HELVETICA,
            FontFamily::HelveticaBold => &HELVETICA_BOLD,
            FontFamily::TimesRoman => &TIMES_ROMAN,
            FontFamily::TimesBold => &TIMES_BOLD,
        }
    }

    pub fn char_width(self, c: char) -> u16 {
        let code = c as u32;
        if (32..127).contains(&code) {
            self.widths()[(code - 32) as usize]
        } else {
            FALLBACK_WIDTH
        }
    }

    /// Advance width of `text` at `size` points.
    pub fn measure(self, text: &str, size: f32) -> f32 {
        let units: u32 = text.chars().map(|c| u32::from(self.char_width(c))).sum();
        units as f32 * size / 1000.0
    }
}

#[rustfmt::skip]
static HELVETICA: [u16; 95] = [
    // space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0 1 2 3 4 5 6 7 8 9 : ; < = > ?
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    // @ A B C D E F G H I J K L M N O
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    // P Q R S T U V W X Y Z [ \ ] ^ _
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    // ` a b c d e f g h i j k l m n o
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    // p q r s t u v w x y z { | } ~
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
static HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
static TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
static TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];
