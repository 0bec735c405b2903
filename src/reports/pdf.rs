//! In-memory PDF rendering for analysis reports and scan history.
//!
//! Documents are first laid out as a flat list of [`Block`]s, then drawn
//! onto US-letter pages with the built-in Helvetica faces. Text is wrapped
//! by character count using an average glyph width, which is close enough
//! for Helvetica at report sizes.

use base64ct::{Base64, Encoding};
use bytes::Bytes;
use image::DynamicImage;
use lazy_static::lazy_static;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference,
};
use regex::Regex;
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, warn};

use crate::users::repo_types::Image as Post;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const LINE_SPACING: f32 = 1.2;
/// Average Helvetica advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

const IMAGE_BOX_WIDTH: f32 = 500.0;
const IMAGE_BOX_HEIGHT: f32 = 300.0;

pub const IMAGE_NOTE: &str = "Note: Could not include image in the PDF";

lazy_static! {
    static ref DATA_URI: Regex =
        Regex::new(r"^data:image/[\w.+-]+;base64,(?P<data>.*)$").expect("valid regex");
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("pdf rendering failed: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Italic,
}

/// One unit of report content, in reading order.
#[derive(Debug, Clone)]
pub enum Block {
    /// Centered heading.
    Title(String),
    /// Left-aligned text, wrapped to the content width.
    Text { text: String, size: f32, face: Face },
    Image(DynamicImage),
    /// Vertical whitespace in points.
    Gap(f32),
}

impl Block {
    fn text(text: impl Into<String>, size: f32) -> Self {
        Block::Text {
            text: text.into(),
            size,
            face: Face::Regular,
        }
    }
}

/// A laid-out document ready to render.
#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl Report {
    /// All text in reading order, one entry per block.
    pub fn text(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Title(t) => Some(t.as_str()),
                Block::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_image(&self) -> bool {
        self.blocks.iter().any(|b| matches!(b, Block::Image(_)))
    }
}

/// Image to embed in an analysis report.
#[derive(Debug, Clone)]
pub enum ReportImage {
    /// No image was referenced.
    None,
    Bytes(Bytes),
    /// An image was referenced but could not be obtained.
    Unavailable,
}

/// Decodes a `data:image/<x>;base64,` URI. Anything else is `None`.
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let caps = DATA_URI.captures(uri.trim())?;
    Base64::decode_vec(caps.name("data")?.as_str().trim()).ok()
}

pub fn format_date(at: OffsetDateTime) -> String {
    at.format(format_description!("[month]/[day]/[year]"))
        .unwrap_or_else(|_| at.date().to_string())
}

fn format_date_time(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[month]/[day]/[year], [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| at.to_string())
}

pub fn analysis_report(result: &str, at: OffsetDateTime, image: ReportImage) -> Report {
    let mut blocks = vec![
        Block::Title("Plant Analysis Report".into()),
        Block::Gap(12.0),
        Block::text(format!("Date: {}", format_date(at)), 16.0),
        Block::Gap(12.0),
        Block::text(result, 14.0),
        Block::Gap(12.0),
    ];

    let decoded = match image {
        ReportImage::None => None,
        ReportImage::Unavailable => Some(None),
        ReportImage::Bytes(raw) => Some(
            image::load_from_memory(&raw)
                .map_err(|e| warn!(error = %e, "report image undecodable"))
                .ok(),
        ),
    };
    match decoded {
        None => {}
        Some(Some(img)) => blocks.push(Block::Image(img)),
        Some(None) => blocks.push(Block::Text {
            text: IMAGE_NOTE.into(),
            size: 12.0,
            face: Face::Italic,
        }),
    }

    Report {
        title: "Plant Analysis Report".into(),
        blocks,
    }
}

pub fn history_report(username: &str, posts: &[Post], at: OffsetDateTime) -> Report {
    let mut blocks = vec![
        Block::Title("Plant Analysis History".into()),
        Block::Gap(12.0),
        Block::text(format!("User: {username}"), 16.0),
        Block::Gap(12.0),
        Block::text(format!("Generated on: {}", format_date(at)), 14.0),
        Block::Gap(24.0),
    ];

    if posts.is_empty() {
        blocks.push(Block::text("No scans found in history.", 12.0));
    }
    for (i, post) in posts.iter().enumerate() {
        blocks.push(Block::Text {
            text: format!("Scan {}", i + 1),
            size: 14.0,
            face: Face::Bold,
        });
        blocks.push(Block::text(
            format!("Date: {}", format_date_time(post.created_at)),
            12.0,
        ));
        blocks.push(Block::text(format!("Image URL: {}", post.url), 12.0));
        if !post.plant_type.is_empty() {
            blocks.push(Block::text(format!("Plant Type: {}", post.plant_type), 12.0));
        }
        blocks.push(Block::Gap(12.0));
    }

    Report {
        title: "Plant Analysis History".into(),
        blocks,
    }
}

fn mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn get(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
            Face::Italic => &self.italic,
        }
    }
}

/// Drawing cursor. `y` is the baseline of the next line, measured from the
/// bottom of the page as PDF does.
struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl Cursor<'_> {
    fn ensure(&mut self, height: f32) {
        if self.y - height >= MARGIN {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            mm(PAGE_WIDTH),
            mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn line(&mut self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        let height = size * LINE_SPACING;
        self.ensure(height);
        self.y -= size;
        self.layer.use_text(text, size, mm(x), mm(self.y), font);
        self.y -= height - size;
    }
}

fn wrap_width(size: f32) -> usize {
    ((CONTENT_WIDTH / (size * AVG_GLYPH_WIDTH)) as usize).max(1)
}

/// Scale factor that fits `w`×`h` pixels inside the image box at 72 dpi.
fn fit_scale(w: u32, h: u32) -> f32 {
    if w == 0 || h == 0 {
        return 1.0;
    }
    (IMAGE_BOX_WIDTH / w as f32).min(IMAGE_BOX_HEIGHT / h as f32)
}

pub fn render(report: &Report) -> Result<Vec<u8>, ReportError> {
    let err = |e: printpdf::Error| ReportError::Render(format!("{e:?}"));

    let (doc, page, layer) = PdfDocument::new(
        report.title.as_str(),
        mm(PAGE_WIDTH),
        mm(PAGE_HEIGHT),
        "Page 1",
    );
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(err)?,
        italic: doc.add_builtin_font(BuiltinFont::HelveticaOblique).map_err(err)?,
    };
    let layer = doc.get_page(page).get_layer(layer);
    let mut cur = Cursor {
        doc: &doc,
        layer,
        y: PAGE_HEIGHT - MARGIN,
        pages: 1,
    };

    for block in &report.blocks {
        match block {
            Block::Title(text) => {
                let size = 24.0;
                let width = text.chars().count() as f32 * size * AVG_GLYPH_WIDTH;
                let x = MARGIN + ((CONTENT_WIDTH - width) / 2.0).max(0.0);
                cur.line(text, size, x, &fonts.bold);
            }
            Block::Text { text, size, face } => {
                let width = wrap_width(*size);
                for paragraph in text.lines() {
                    if paragraph.trim().is_empty() {
                        cur.ensure(*size);
                        cur.y -= *size;
                        continue;
                    }
                    for line in textwrap::wrap(paragraph, width) {
                        cur.line(&line, *size, MARGIN, fonts.get(*face));
                    }
                }
            }
            Block::Gap(h) => {
                cur.y -= h;
            }
            Block::Image(img) => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let scale = fit_scale(rgb.width(), rgb.height());
                let w = rgb.width() as f32 * scale;
                let h = rgb.height() as f32 * scale;
                cur.ensure(h);
                cur.y -= h;
                let x = MARGIN + ((CONTENT_WIDTH - w) / 2.0).max(0.0);
                Image::from_dynamic_image(&rgb).add_to_layer(
                    cur.layer.clone(),
                    ImageTransform {
                        translate_x: Some(mm(x)),
                        translate_y: Some(mm(cur.y)),
                        scale_x: Some(scale),
                        scale_y: Some(scale),
                        dpi: Some(72.0),
                        ..Default::default()
                    },
                );
            }
        }
    }

    let pages = cur.pages;
    drop(cur);
    let bytes = doc.save_to_bytes().map_err(err)?;
    debug!(pages, bytes = bytes.len(), "pdf rendered");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::services::png_fixture;
    use time::macros::datetime;
    use uuid::Uuid;

    fn post(url: &str, plant_type: &str) -> Post {
        let at = datetime!(2024-03-05 14:30:00 UTC);
        Post {
            id: Uuid::new_v4(),
            url: url.into(),
            public_id: "images-folder/x.png".into(),
            plant_type: plant_type.into(),
            analysis: String::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn report_without_image_has_text_and_valid_pdf() {
        let at = datetime!(2024-03-05 09:00:00 UTC);
        let report = analysis_report("A healthy fern.", at, ReportImage::None);
        let text = report.text();
        assert_eq!(text[0], "Plant Analysis Report");
        assert!(text.contains(&"Date: 03/05/2024"));
        assert!(text.contains(&"A healthy fern."));
        assert!(!text.contains(&IMAGE_NOTE));

        let bytes = render(&report).unwrap();
        assert!(!bytes.is_empty());
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn unavailable_or_broken_image_becomes_note() {
        let at = OffsetDateTime::now_utc();
        let missing = analysis_report("x", at, ReportImage::Unavailable);
        assert!(missing.text().contains(&IMAGE_NOTE));
        assert!(!missing.has_image());

        let broken = analysis_report("x", at, ReportImage::Bytes(Bytes::from_static(b"nope")));
        assert!(broken.text().contains(&IMAGE_NOTE));
        assert!(render(&broken).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn decodable_image_is_embedded() {
        let png = Bytes::from(png_fixture(8, 4));
        let report = analysis_report("x", OffsetDateTime::now_utc(), ReportImage::Bytes(png));
        assert!(report.has_image());
        assert!(!report.text().contains(&IMAGE_NOTE));
        assert!(render(&report).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn long_analysis_paginates() {
        let long = "Water sparingly and keep in bright indirect light. ".repeat(400);
        let report = analysis_report(&long, OffsetDateTime::now_utc(), ReportImage::None);
        assert!(render(&report).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn history_lists_scans_in_order() {
        let posts = vec![post("https://cdn/a.png", "Fern"), post("https://cdn/b.png", "")];
        let report = history_report("alice", &posts, OffsetDateTime::now_utc());
        let text = report.text();
        assert_eq!(text[0], "Plant Analysis History");
        assert!(text.contains(&"User: alice"));
        let scan1 = text.iter().position(|t| *t == "Scan 1").unwrap();
        let scan2 = text.iter().position(|t| *t == "Scan 2").unwrap();
        assert!(scan1 < scan2);
        assert!(text.contains(&"Image URL: https://cdn/a.png"));
        assert!(text.contains(&"Plant Type: Fern"));
        assert!(text.contains(&"Date: 03/05/2024, 14:30:00"));
        assert_eq!(text.iter().filter(|t| t.starts_with("Plant Type")).count(), 1);
    }

    #[test]
    fn empty_history_says_so() {
        let report = history_report("alice", &[], OffsetDateTime::now_utc());
        assert!(report.text().contains(&"No scans found in history."));
        assert!(render(&report).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn data_uri_decoding() {
        assert_eq!(decode_data_uri("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert!(decode_data_uri("data:text/plain;base64,aGk=").is_none());
        assert!(decode_data_uri("https://cdn/a.png").is_none());
        assert!(decode_data_uri("data:image/png;base64,***").is_none());
    }

    #[test]
    fn image_fit_keeps_aspect_inside_box() {
        let s = fit_scale(1000, 1000);
        assert!((s - 0.3).abs() < f32::EPSILON);
        let s = fit_scale(100, 10);
        assert!((100.0 * s - 500.0).abs() < 0.01);
    }
}
