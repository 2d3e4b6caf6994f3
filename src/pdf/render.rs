//! Record rendering seam and a built-in text renderer
//!
//! Turning a template and a record into drawn pages happens outside the
//! builder. A renderer only returns `RenderedPage` values; it never touches
//! the arena, which is what lets the assembler render records in parallel
//! and still commit them one at a time in input order.

use lopdf::{Dictionary, Object};
use crate::config::ColorSpace;
use crate::error::RenderError;
use crate::layout::{content_area, lines_that_fit, Margins, PageDimensions};
use crate::pdf::pages::RenderedPage;
use crate::pdf::value::name;
use crate::record::Record;

/// Per-build information handed to the renderer with every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    /// Color model requested by the compliance configuration
    pub color_space: ColorSpace,
    /// Total number of records in the build
    pub record_count: usize,
}

/// Produces the pages for one record
pub trait RecordRenderer {
    fn render(
        &self,
        context: &RenderContext,
        index: usize,
        record: &Record,
    ) -> std::result::Result<Vec<RenderedPage>, RenderError>;
}

impl<F> RecordRenderer for F
where
    F: Fn(&RenderContext, usize, &Record) -> std::result::Result<Vec<RenderedPage>, RenderError>,
{
    fn render(
        &self,
        context: &RenderContext,
        index: usize,
        record: &Record,
    ) -> std::result::Result<Vec<RenderedPage>, RenderError> {
        self(context, index, record)
    }
}

/// Renders each record as a plain listing of its fields in Helvetica
///
/// Fields print as `key: value`, one per line, top to bottom inside the
/// margins. A record longer than one page continues on further pages.
#[derive(Debug, Clone)]
pub struct TextPageRenderer {
    pub page: PageDimensions,
    pub margins: Margins,
    pub font_size: f32,
    /// Record keys to print; every key in the record when `None`
    pub fields: Option<Vec<String>>,
}

impl Default for TextPageRenderer {
    fn default() -> Self {
        Self {
            page: PageDimensions::letter(),
            margins: Margins::standard(),
            font_size: 12.0,
            fields: None,
        }
    }
}

impl TextPageRenderer {
    fn leading(&self) -> f64 {
        self.font_size as f64 * 1.2
    }

    fn lines_for(&self, index: usize, record: &Record) -> Vec<String> {
        let mut lines = vec![format!("Record {}", index + 1)];
        match &self.fields {
            Some(fields) => {
                for field in fields {
                    let value = record.text(field).unwrap_or_default();
                    lines.push(format!("{}: {}", field, value));
                }
            }
            None => {
                for (key, _) in record.iter() {
                    let value = record.text(key).unwrap_or_default();
                    lines.push(format!("{}: {}", key, value));
                }
            }
        }
        lines
    }

    fn page_content(&self, lines: &[String], color_space: ColorSpace) -> Vec<u8> {
        let (left, top, _, _) = content_area(&self.page, &self.margins);
        let leading = self.leading();

        let mut content = Vec::new();
        match color_space {
            ColorSpace::Rgb => content.extend_from_slice(b"0 0 0 rg\n"),
            ColorSpace::Cmyk => content.extend_from_slice(b"0 0 0 1 k\n"),
        }
        for (i, line) in lines.iter().enumerate() {
            let y = top - self.font_size as f64 - i as f64 * leading;
            content.extend_from_slice(b"BT\n");
            content.extend_from_slice(format!("/F1 {} Tf\n", self.font_size).as_bytes());
            content.extend_from_slice(format!("1 0 0 1 {:.2} {:.2} Tm\n", left, y).as_bytes());
            content.push(b'(');
            content.extend(encode_win_ansi(&escape_pdf_string(line)));
            content.extend_from_slice(b") Tj\nET\n");
        }
        content
    }
}

/// Helvetica is one of the 14 standard fonts, so nothing needs embedding
fn helvetica_resources() -> Dictionary {
    let mut font = Dictionary::new();
    font.set("Type", name("Font"));
    font.set("Subtype", name("Type1"));
    font.set("BaseFont", name("Helvetica"));
    font.set("Encoding", name("WinAnsiEncoding"));

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Dictionary(font));

    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    resources
}

/// Escape special characters in PDF strings
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

/// Encode text for a font declared with `/WinAnsiEncoding`
///
/// Characters outside the code page become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> u8 {
    match ch as u32 {
        code @ 0x20..=0x7E => code as u8,
        code @ 0xA0..=0xFF => code as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => b'?',
    }
}

impl RecordRenderer for TextPageRenderer {
    fn render(
        &self,
        context: &RenderContext,
        index: usize,
        record: &Record,
    ) -> std::result::Result<Vec<RenderedPage>, RenderError> {
        let per_page = lines_that_fit(&self.page, &self.margins, self.leading());
        if per_page == 0 {
            return Err("page margins leave no room for text".into());
        }

        let lines = self.lines_for(index, record);
        let pages = lines
            .chunks(per_page)
            .map(|chunk| {
                RenderedPage::new(self.page.media_box())
                    .with_resources(helvetica_resources())
                    .with_content(self.page_content(chunk, context.color_space))
            })
            .collect();
        Ok(pages)
    }
}
