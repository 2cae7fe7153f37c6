//! PDF fixtures for tests
//!
//! Builds small, valid PDFs with lopdf: Helvetica body text, Helvetica-Bold
//! headings, an optional `/Info` title and an optional outline tree.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;

/// One line of fixture text
#[derive(Debug, Clone)]
pub struct FixtureLine {
    pub text: String,
    pub size: i64,
    pub bold: bool,
}

impl FixtureLine {
    pub fn heading(text: &str) -> Self {
        Self { text: text.to_string(), size: 18, bold: true }
    }

    pub fn body(text: &str) -> Self {
        Self { text: text.to_string(), size: 11, bold: false }
    }
}

/// Builder for a multi-page fixture PDF
#[derive(Debug, Clone, Default)]
pub struct PdfFixture {
    pages: Vec<Vec<FixtureLine>>,
    title: Option<String>,
    outline: Vec<(String, usize)>,
}

impl PdfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, lines: Vec<FixtureLine>) -> Self {
        self.pages.push(lines);
        self
    }

    pub fn info_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Add a top-level outline entry pointing at a 0-based page
    pub fn outline_entry(mut self, title: &str, page: usize) -> Self {
        self.outline.push((title.to_string(), page));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        let mut page_ids: Vec<ObjectId> = Vec::new();
        for lines in &self.pages {
            let mut operations = Vec::new();
            let mut y = PAGE_HEIGHT - 72;
            for line in lines {
                let font = if line.bold { "F2" } else { "F1" };
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec![font.into(), line.size.into()]));
                operations.push(Operation::new("Td", vec![72i64.into(), y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(line.text.as_str())]));
                operations.push(Operation::new("ET", vec![]));
                y -= line.size * 2;
            }

            let content = Content { operations };
            let encoded = content.encode().expect("fixture content encodes");
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0i64.into(), 0i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };

        if !self.outline.is_empty() {
            let outlines_id = doc.new_object_id();
            let item_ids: Vec<ObjectId> = self.outline.iter().map(|_| doc.new_object_id()).collect();

            for (i, (title, page)) in self.outline.iter().enumerate() {
                let target = page_ids.get(*page).copied().unwrap_or(page_ids[0]);
                let mut item = dictionary! {
                    "Title" => Object::string_literal(title.as_str()),
                    "Parent" => outlines_id,
                    "Dest" => vec![Object::Reference(target), "XYZ".into(), Object::Null, Object::Null, Object::Null],
                };
                if i > 0 {
                    item.set("Prev", item_ids[i - 1]);
                }
                if i + 1 < item_ids.len() {
                    item.set("Next", item_ids[i + 1]);
                }
                doc.objects.insert(item_ids[i], Object::Dictionary(item));
            }

            let outlines = dictionary! {
                "Type" => "Outlines",
                "First" => item_ids[0],
                "Last" => item_ids[item_ids.len() - 1],
                "Count" => item_ids.len() as i64,
            };
            doc.objects.insert(outlines_id, Object::Dictionary(outlines));
            catalog.set("Outlines", outlines_id);
        }

        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);

        if let Some(title) = &self.title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title.as_str()),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture PDF serializes");
        bytes
    }
}

/// Single-page PDF with one bold heading followed by body paragraphs
pub fn simple_pdf(heading: &str, body: &[&str]) -> Vec<u8> {
    let mut lines = vec![FixtureLine::heading(heading)];
    lines.extend(body.iter().map(|b| FixtureLine::body(b)));
    PdfFixture::new().page(lines).build()
}
