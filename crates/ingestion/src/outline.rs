//! Outline extraction
//!
//! Turns a [`PdfLayout`] into a titled document with a hierarchical outline.
//! The outline comes from the embedded table of contents when there is one,
//! otherwise from visual heading detection:
//! - body size is the median size of lines longer than five words
//! - a line scores for being larger than body text, bold, short, or
//!   matching a heading pattern
//! - the three largest heading sizes become H1, H2 and H3
//!
//! Documents with text but no detectable outline get one section per page.

use crate::errors::IngestionError;
use crate::pdf::{self, PdfLayout, TextLine};
use docmind_common::ids;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

const HEADING_SCORE_MIN: u32 = 2;
const DEFAULT_BODY_SIZE: f32 = 10.0;
const MAX_ANNOTATION_BODY_LINES: usize = 8;
const JUNK_LABELS: &[&str] = &["name", "age", "s.no", "date", "signature"];

/// One outline section; `page` is 1-based
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub section_id: String,
    pub level: String,
    pub text: String,
    pub page: usize,
    pub section_text: String,
    pub annotation: Option<serde_json::Value>,
}

/// Result of extracting a PDF
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub title: String,
    pub total_pages: usize,
    pub pages: Vec<String>,
    pub outline: Vec<OutlineEntry>,
}

/// Parse PDF bytes and build the outline
pub fn extract_document(bytes: &[u8], file_name: &str) -> Result<ExtractedDocument, IngestionError> {
    let layout = pdf::load_layout(bytes, file_name)?;
    Ok(build_document(&layout, file_name))
}

fn heading_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^(chapter|section|part)\s+[\dIVX]+",
            r"^\d+\.\d*(\.\d*)*\s+[A-Z]",
            r"(?i)^(abstract|introduction|conclusion|references|appendix)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn toc_suffix() -> Option<&'static Regex> {
    static SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();
    SUFFIX
        .get_or_init(|| Regex::new(r"(\.{3,}[\s\d]*|\s+\d+)$").ok())
        .as_ref()
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

struct Heading {
    level: String,
    text: String,
    /// Index into `PdfLayout::pages`
    page: usize,
    /// Index of the heading line on its page, when known
    line: Option<usize>,
}

/// Estimated body font size
pub fn body_font_size(layout: &PdfLayout) -> f32 {
    let mut sizes: Vec<f32> = layout
        .pages
        .iter()
        .flat_map(|p| p.lines.iter())
        .filter(|l| l.word_count() > 5 && l.font_size > 6.0)
        .map(|l| l.font_size)
        .collect();

    if sizes.is_empty() {
        return DEFAULT_BODY_SIZE;
    }
    sizes.sort_by(|a, b| a.total_cmp(b));
    let mid = sizes.len() / 2;
    if sizes.len() % 2 == 0 {
        (sizes[mid - 1] + sizes[mid]) / 2.0
    } else {
        sizes[mid]
    }
}

/// Heading score of a single line
pub fn heading_score(line: &TextLine, body_size: f32) -> u32 {
    let text = line.text.trim();
    if JUNK_LABELS.contains(&text.to_lowercase().as_str()) {
        return 0;
    }

    let mut score = 0;
    if line.font_size > body_size + 1.0 {
        score += 1;
    }
    if line.bold {
        score += 1;
    }
    if line.word_count() <= 12 {
        score += 1;
    }
    if heading_patterns().iter().any(|p| p.is_match(text)) {
        score += 2;
    }
    score
}

fn size_key(size: f32) -> i64 {
    (size * 100.0).round() as i64
}

fn visual_headings(layout: &PdfLayout, body_size: f32) -> Vec<Heading> {
    let candidates: Vec<(usize, usize, &TextLine)> = layout
        .pages
        .iter()
        .enumerate()
        .flat_map(|(page, p)| p.lines.iter().enumerate().map(move |(i, l)| (page, i, l)))
        .filter(|(_, _, l)| heading_score(l, body_size) >= HEADING_SCORE_MIN)
        .collect();

    let mut sizes: Vec<i64> = candidates.iter().map(|(_, _, l)| size_key(l.font_size)).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();
    sizes.truncate(3);

    candidates
        .into_iter()
        .filter_map(|(page, line, l)| {
            let rank = sizes.iter().position(|s| *s == size_key(l.font_size))?;
            Some(Heading {
                level: format!("H{}", rank + 1),
                text: l.text.clone(),
                page,
                line: Some(line),
            })
        })
        .collect()
}

fn toc_headings(layout: &PdfLayout) -> Vec<Heading> {
    let mut seen = HashSet::new();
    let mut headings = Vec::new();

    for entry in &layout.toc {
        if !(1..=3).contains(&entry.level) || entry.page >= layout.pages.len() {
            continue;
        }
        let raw = entry.title.trim();
        let title = match toc_suffix() {
            Some(re) => re.replace(raw, "").trim().to_string(),
            None => raw.to_string(),
        };
        if title.chars().count() < 3 {
            continue;
        }
        if !seen.insert((title.to_lowercase(), entry.page)) {
            continue;
        }

        let wanted = normalize(&title);
        let line = layout.pages[entry.page]
            .lines
            .iter()
            .position(|l| {
                let text = normalize(&l.text);
                text == wanted || (text.ends_with(&wanted) && text.len() <= wanted.len() + 8)
            });

        headings.push(Heading {
            level: format!("H{}", entry.level),
            text: title,
            page: entry.page,
            line,
        });
    }

    // Stable: same-page entries keep TOC order
    headings.sort_by_key(|h| h.page);
    headings
}

fn page_headings(layout: &PdfLayout) -> Vec<Heading> {
    layout
        .pages
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.lines.is_empty())
        .map(|(page, _)| Heading {
            level: "H1".to_string(),
            text: format!("Page {}", page + 1),
            page,
            line: None,
        })
        .collect()
}

fn find_title(layout: &PdfLayout, body_size: f32, file_name: &str) -> String {
    if let Some(first) = layout.pages.first() {
        let top = first.height * 0.3;
        let mut best: Option<&TextLine> = None;
        for line in first.lines.iter().filter(|l| l.bbox.y0 < top) {
            if best.map_or(true, |b| line.font_size > b.font_size) {
                best = Some(line);
            }
        }
        if let Some(line) = best {
            if (line.font_size >= body_size + 2.0 || line.bold) && line.text.chars().count() >= 3 {
                return line.text.clone();
            }
        }
    }

    if let Some(title) = &layout.info_title {
        return title.clone();
    }

    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled Document".to_string())
}

/// Build the outline, section text and annotations from a layout
pub fn build_document(layout: &PdfLayout, file_name: &str) -> ExtractedDocument {
    let body_size = body_font_size(layout);
    let title = find_title(layout, body_size, file_name);

    let mut headings = toc_headings(layout);
    if headings.is_empty() {
        headings = visual_headings(layout, body_size);
    }
    if headings.is_empty() {
        headings = page_headings(layout);
    }

    // Flat index of every line, pages in order
    let mut page_offsets = Vec::with_capacity(layout.pages.len() + 1);
    let mut flat: Vec<(usize, &TextLine)> = Vec::new();
    for (page, p) in layout.pages.iter().enumerate() {
        page_offsets.push(flat.len());
        flat.extend(p.lines.iter().map(|l| (page, l)));
    }
    page_offsets.push(flat.len());

    let position = |h: &Heading| page_offsets[h.page] + h.line.unwrap_or(0);
    let starts: Vec<usize> = headings
        .iter()
        .map(|h| position(h) + usize::from(h.line.is_some()))
        .collect();

    let outline = headings
        .iter()
        .enumerate()
        .map(|(i, heading)| {
            let start = starts[i];
            let next = headings.get(i + 1);
            let mut end = next.map(position).unwrap_or(flat.len());
            if end <= start {
                // Unanchored entries sharing a position take the rest of their page
                let anchored = heading.line.is_some() && next.is_some_and(|n| n.line.is_some());
                end = if anchored { start } else { page_offsets[heading.page + 1].max(start) };
            }

            let body = &flat[start.min(flat.len())..end.min(flat.len())];
            let section_text = body
                .iter()
                .map(|(_, l)| l.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            let mut quads: Vec<[f32; 8]> = Vec::new();
            if let Some(line) = heading.line {
                quads.push(layout.pages[heading.page].lines[line].bbox.quad());
            }
            quads.extend(
                body.iter()
                    .filter(|(page, _)| *page == heading.page)
                    .take(MAX_ANNOTATION_BODY_LINES)
                    .map(|(_, l)| l.bbox.quad()),
            );

            let annotation = (!quads.is_empty()).then(|| {
                serde_json::json!({
                    "page": heading.page + 1,
                    "quad_points": quads,
                })
            });

            OutlineEntry {
                section_id: ids::new_id(ids::SECTION),
                level: heading.level.clone(),
                text: heading.text.clone(),
                page: heading.page + 1,
                section_text,
                annotation,
            }
        })
        .collect();

    ExtractedDocument {
        title,
        total_pages: layout.pages.len(),
        pages: layout.pages.iter().map(|p| p.text()).collect(),
        outline,
    }
}

/// Quad points stored in an outline annotation
pub fn annotation_quads(annotation: Option<&serde_json::Value>) -> Vec<Vec<f32>> {
    annotation
        .and_then(|a| a.get("quad_points"))
        .and_then(|q| serde_json::from_value(q.clone()).ok())
        .unwrap_or_default()
}
