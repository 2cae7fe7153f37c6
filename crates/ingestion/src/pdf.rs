//! PDF layout extraction module
//!
//! Walks each page's content stream with lopdf and rebuilds positioned text
//! lines (font size, boldness, bounding box). Also reads the `/Outlines`
//! table of contents and the `/Info` title when present.
//!
//! Coordinates in the returned layout use a top-left origin so they can be
//! handed to a viewer as highlight quads.

use crate::errors::IngestionError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

const DEFAULT_PAGE_WIDTH: f32 = 612.0;
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;
const MAX_OUTLINE_ENTRIES: usize = 10_000;

/// Axis-aligned box in top-left-origin page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Quad points `[x0,y0,x1,y0,x1,y1,x0,y1]`
    pub fn quad(&self) -> [f32; 8] {
        [
            self.x0, self.y0, self.x1, self.y0, self.x1, self.y1, self.x0, self.y1,
        ]
    }
}

/// A run of text sharing one baseline
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub font_size: f32,
    pub bold: bool,
    pub bbox: BBox,
}

impl TextLine {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Lines of one page, top to bottom
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub lines: Vec<TextLine>,
}

impl PageLayout {
    /// Plain text of the page, one line per text line
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Table of contents entry; `page` is 0-based
#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub level: u32,
    pub title: String,
    pub page: usize,
}

/// Everything the outline builder needs from a PDF
#[derive(Debug, Clone)]
pub struct PdfLayout {
    pub pages: Vec<PageLayout>,
    pub toc: Vec<TocEntry>,
    pub info_title: Option<String>,
}

/// Load a PDF from memory and extract its layout
pub fn load_layout(bytes: &[u8], file_name: &str) -> Result<PdfLayout, IngestionError> {
    let doc = Document::load_mem(bytes).map_err(|e| IngestionError::PdfParse {
        file: file_name.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let page_ids: BTreeMap<u32, ObjectId> = doc.get_pages();
    debug!(page_count = page_ids.len(), "Extracting layout from PDF");

    let mut pages = Vec::with_capacity(page_ids.len());
    for (page_num, page_id) in page_ids.iter() {
        match extract_page(&doc, *page_id) {
            Ok(page) => pages.push(page),
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
                pages.push(PageLayout {
                    width: DEFAULT_PAGE_WIDTH,
                    height: DEFAULT_PAGE_HEIGHT,
                    lines: Vec::new(),
                });
            }
        }
    }

    let page_index: HashMap<ObjectId, usize> = page_ids
        .values()
        .enumerate()
        .map(|(index, id)| (*id, index))
        .collect();

    Ok(PdfLayout {
        pages,
        toc: read_outlines(&doc, &page_index),
        info_title: read_info_title(&doc),
    })
}

// ============================================================================
// Object helpers
// ============================================================================

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn dict_get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|obj| resolve(doc, obj))
}

fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|o| o.as_dict().ok())
}

/// Look up a page attribute, following `/Parent` for inherited values
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..32 {
        if let Some(value) = dict_get(doc, current, key) {
            return Some(value);
        }
        current = dict_get(doc, current, b"Parent").and_then(|p| p.as_dict().ok())?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise single-byte)
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

// ============================================================================
// Page content
// ============================================================================

struct Fragment {
    text: String,
    x: f32,
    y: f32,
    width: f32,
    size: f32,
    bold: bool,
}

struct TextState {
    font_bold: bool,
    font_size: f32,
    leading: f32,
    tm: [f32; 6],
    tlm: [f32; 6],
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

impl TextState {
    fn new() -> Self {
        Self {
            font_bold: false,
            font_size: 10.0,
            leading: 0.0,
            tm: IDENTITY,
            tlm: IDENTITY,
        }
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        let m = self.tlm;
        self.tlm = [
            m[0],
            m[1],
            m[2],
            m[3],
            m[4] + tx * m[0] + ty * m[2],
            m[5] + tx * m[1] + ty * m[3],
        ];
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 { self.leading } else { self.font_size * 1.2 };
        self.translate(0.0, -leading);
    }

    fn effective_size(&self) -> f32 {
        let scale = (self.tm[2] * self.tm[2] + self.tm[3] * self.tm[3]).sqrt();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        (self.font_size * scale).abs()
    }

    fn show(&mut self, text: String, fragments: &mut Vec<Fragment>) {
        if text.is_empty() {
            return;
        }
        let size = self.effective_size();
        // Glyph widths are not read; half an em per character is close enough for line boxes.
        let width = text.chars().count() as f32 * size * 0.5;
        fragments.push(Fragment {
            text,
            x: self.tm[4],
            y: self.tm[5],
            width,
            size,
            bold: self.font_bold,
        });
        self.tm[4] += width;
    }
}

fn font_is_bold(doc: &Document, resources: Option<&Dictionary>, name: &[u8]) -> bool {
    let Some(fonts) = resources.and_then(|r| dict_get(doc, r, b"Font")).and_then(|f| f.as_dict().ok()) else {
        return false;
    };
    let Some(font) = dict_get(doc, fonts, name).and_then(|f| f.as_dict().ok()) else {
        return false;
    };
    match dict_get(doc, font, b"BaseFont") {
        Some(Object::Name(base)) => {
            let base = String::from_utf8_lossy(base).to_lowercase();
            ["bold", "black", "heavy"].iter().any(|k| base.contains(k))
        }
        _ => false,
    }
}

fn extract_page(doc: &Document, page_id: ObjectId) -> Result<PageLayout, String> {
    let page = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(|e| e.to_string())?;

    let (width, height) = match inherited(doc, page, b"MediaBox").and_then(|m| m.as_array().ok()) {
        Some(media) if media.len() == 4 => {
            let values: Vec<f32> = media.iter().filter_map(number).collect();
            if values.len() == 4 {
                ((values[2] - values[0]).abs(), (values[3] - values[1]).abs())
            } else {
                (DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
            }
        }
        _ => (DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT),
    };

    let resources = inherited(doc, page, b"Resources").and_then(|r| as_dict(doc, r));
    let raw = doc.get_page_content(page_id).map_err(|e| e.to_string())?;
    let content = Content::decode(&raw).map_err(|e| e.to_string())?;

    let mut bold_cache: HashMap<Vec<u8>, bool> = HashMap::new();
    let mut state = TextState::new();
    let mut fragments = Vec::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                state.tm = IDENTITY;
                state.tlm = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    state.font_bold = *bold_cache
                        .entry(name.clone())
                        .or_insert_with(|| font_is_bold(doc, resources, name));
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.translate(tx, ty);
            }
            "Tm" => {
                let values: Vec<f32> = operands.iter().filter_map(number).collect();
                if values.len() == 6 {
                    state.tm = [values[0], values[1], values[2], values[3], values[4], values[5]];
                    state.tlm = state.tm;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.show(text, &mut fragments);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.show(text, &mut fragments);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(text) = operands.get(2).and_then(string_operand) {
                    state.show(text, &mut fragments);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut text = String::new();
                    for item in items {
                        if let Some(s) = string_operand(item) {
                            text.push_str(&s);
                        } else if let Some(adjust) = number(item) {
                            // Large negative kerning is a word gap
                            if adjust < -200.0 && !text.ends_with(' ') {
                                text.push(' ');
                            }
                        }
                    }
                    state.show(text, &mut fragments);
                }
            }
            _ => {}
        }
    }

    Ok(PageLayout {
        width,
        height,
        lines: build_lines(fragments, height),
    })
}

/// Merge fragments on the same baseline, then order lines top to bottom
fn build_lines(fragments: Vec<Fragment>, page_height: f32) -> Vec<TextLine> {
    struct Pending {
        text: String,
        x0: f32,
        x1: f32,
        y: f32,
        size: f32,
        bold: bool,
    }

    let mut pending: Vec<Pending> = Vec::new();

    for frag in fragments {
        if let Some(line) = pending.last_mut() {
            let tolerance = (line.size.max(frag.size) * 0.3).max(1.0);
            if (line.y - frag.y).abs() <= tolerance {
                let gap = frag.x - line.x1;
                if gap > frag.size * 0.15 && !line.text.ends_with(' ') && !frag.text.starts_with(' ') {
                    line.text.push(' ');
                }
                line.text.push_str(&frag.text);
                line.x1 = line.x1.max(frag.x + frag.width);
                line.size = line.size.max(frag.size);
                continue;
            }
        }
        pending.push(Pending {
            text: frag.text,
            x0: frag.x,
            x1: frag.x + frag.width,
            y: frag.y,
            size: frag.size,
            bold: frag.bold,
        });
    }

    // Stable: lines sharing a baseline keep stream order
    pending.sort_by(|a, b| b.y.total_cmp(&a.y));

    pending
        .into_iter()
        .filter_map(|p| {
            let text = p.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            let size = (p.size * 100.0).round() / 100.0;
            Some(TextLine {
                text,
                font_size: size,
                bold: p.bold,
                bbox: BBox {
                    x0: p.x0,
                    y0: (page_height - p.y - size * 0.8).max(0.0),
                    x1: p.x1,
                    y1: (page_height - p.y + size * 0.2).max(0.0),
                },
            })
        })
        .collect()
}

// ============================================================================
// Document metadata
// ============================================================================

fn read_info_title(doc: &Document) -> Option<String> {
    let info = dict_get(doc, &doc.trailer, b"Info").and_then(|i| i.as_dict().ok())?;
    let title = dict_get(doc, info, b"Title").and_then(string_operand)?;
    let title = title.trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn outline_target(doc: &Document, item: &Dictionary, pages: &HashMap<ObjectId, usize>) -> Option<usize> {
    let dest = match dict_get(doc, item, b"Dest") {
        Some(dest) => dest,
        None => {
            let action = dict_get(doc, item, b"A").and_then(|a| a.as_dict().ok())?;
            dict_get(doc, action, b"D")?
        }
    };

    match dest.as_array().ok()?.first()? {
        Object::Reference(id) => pages.get(id).copied(),
        Object::Integer(index) if *index >= 0 => Some(*index as usize),
        _ => None,
    }
}

fn read_outlines(doc: &Document, pages: &HashMap<ObjectId, usize>) -> Vec<TocEntry> {
    let mut entries = Vec::new();

    let Some(catalog) = dict_get(doc, &doc.trailer, b"Root").and_then(|r| r.as_dict().ok()) else {
        return entries;
    };
    let Some(outlines) = dict_get(doc, catalog, b"Outlines").and_then(|o| o.as_dict().ok()) else {
        return entries;
    };

    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut stack: Vec<(ObjectId, u32)> = Vec::new();
    if let Ok(first) = outlines.get(b"First").and_then(|f| f.as_reference()) {
        stack.push((first, 1));
    }

    // Depth-first, siblings in order
    while let Some((id, level)) = stack.pop() {
        if !visited.insert(id) || entries.len() >= MAX_OUTLINE_ENTRIES {
            continue;
        }
        let Some(item) = doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
            continue;
        };

        if let Ok(next) = item.get(b"Next").and_then(|n| n.as_reference()) {
            stack.push((next, level));
        }
        if let Ok(child) = item.get(b"First").and_then(|c| c.as_reference()) {
            stack.push((child, level + 1));
        }

        let title = dict_get(doc, item, b"Title").and_then(string_operand);
        let page = outline_target(doc, item, pages);
        if let (Some(title), Some(page)) = (title, page) {
            entries.push(TocEntry { level, title, page });
        }
    }

    debug!(entries = entries.len(), "Read PDF outline");
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string(b"Hello"), "Hello");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
    }

    #[test]
    fn test_build_lines_merges_baseline() {
        let frags = vec![
            Fragment { text: "Hello".into(), x: 10.0, y: 700.0, width: 30.0, size: 12.0, bold: false },
            Fragment { text: "World".into(), x: 45.0, y: 700.0, width: 30.0, size: 12.0, bold: false },
            Fragment { text: "Top".into(), x: 10.0, y: 750.0, width: 18.0, size: 20.0, bold: true },
        ];
        let lines = build_lines(frags, 792.0);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Top");
        assert!(lines[0].bold);
        assert_eq!(lines[1].text, "Hello World");
        assert!(lines[0].bbox.y0 < lines[1].bbox.y0);
    }

    #[test]
    fn test_corrupt_pdf_is_parse_error() {
        let err = load_layout(b"not a pdf at all", "broken.pdf").unwrap_err();
        assert!(matches!(err, IngestionError::PdfParse { .. }));
    }

    #[test]
    fn test_quad_order() {
        let bbox = BBox { x0: 1.0, y0: 2.0, x1: 3.0, y1: 4.0 };
        assert_eq!(bbox.quad(), [1.0, 2.0, 3.0, 2.0, 3.0, 4.0, 1.0, 4.0]);
    }
}
