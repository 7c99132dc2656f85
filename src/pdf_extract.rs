// src/pdf_extract.rs

use crate::error::SliResult;
use lopdf::{Dictionary, Document, ObjectId};
use std::fs;
use std::path::Path;
use tracing::{debug, error, warn};

/// Fewer non-whitespace characters than this means the text layer is noise.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages at which a PDF counts as a scan.
const SCANNED_RATIO: f64 = 0.8;

/// Text read from one invoice source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceText {
    /// Empty when the source has no usable text layer.
    pub text: String,
    /// Page survey, present for PDFs that lopdf could open.
    pub scan: Option<PageScan>,
}

/// How many pages of a PDF carry images but no fonts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageScan {
    pub pages: usize,
    pub image_only: usize,
}

impl PageScan {
    /// Walk every page's resources. A page with XObjects and no fonts is image-only.
    pub fn of(doc: &Document) -> Self {
        let pages = doc.get_pages();
        let image_only = pages
            .values()
            .filter(|&&id| page_is_image_only(doc, id))
            .count();
        Self {
            pages: pages.len(),
            image_only,
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.pages == 0 {
            0.0
        } else {
            self.image_only as f64 / self.pages as f64
        }
    }

    pub fn is_scanned(&self) -> bool {
        self.pages > 0 && self.ratio() >= SCANNED_RATIO
    }
}

fn page_is_image_only(doc: &Document, page: ObjectId) -> bool {
    let Some(resources) = doc
        .get_dictionary(page)
        .ok()
        .and_then(|dict| resolve_dict(doc, dict, b"Resources"))
    else {
        return false;
    };
    let non_empty = |key: &[u8]| resolve_dict(doc, resources, key).is_some_and(|d| !d.is_empty());
    non_empty(b"XObject") && !non_empty(b"Font")
}

fn resolve_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    let obj = dict.get(key).ok()?;
    let (_, resolved) = doc.dereference(obj).ok()?;
    resolved.as_dict().ok()
}

/// Raw text of an invoice source. PDFs go through extraction; anything else
/// is read as UTF-8. Scanned or broken PDFs give empty text so the source
/// parses to zero items.
pub fn text_of(path: impl AsRef<Path>) -> SliResult<SourceText> {
    let path = path.as_ref();
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Ok(SourceText {
            text: fs::read_to_string(path)?,
            scan: None,
        });
    }

    let bytes = fs::read(path)?;
    let doc = match Document::load_mem(&bytes) {
        Ok(doc) => doc,
        Err(e) => {
            error!(error = %e, "Not a readable PDF");
            return Ok(SourceText::default());
        }
    };

    let scan = PageScan::of(&doc);
    debug!(
        pages = scan.pages,
        image_only = scan.image_only,
        "Surveyed PDF pages"
    );
    let text = if scan.is_scanned() {
        warn!(ratio = format!("{:.2}", scan.ratio()), "PDF is scanned; no text layer to parse");
        String::new()
    } else {
        text_layer(&bytes)
    };

    Ok(SourceText {
        text,
        scan: Some(scan),
    })
}

/// The PDF's text layer, or nothing when it is missing or too thin to parse.
fn text_layer(bytes: &[u8]) -> String {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => {
            let chars = text.chars().filter(|c| !c.is_whitespace()).count();
            if chars < MIN_TEXT_CHARS {
                warn!(chars, "Text layer too thin to parse");
                String::new()
            } else {
                debug!(chars, "Extracted text layer");
                text
            }
        }
        Err(e) => {
            warn!(error = %e, "Text extraction failed");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scan_ratio_threshold() {
        assert_eq!(PageScan::default().ratio(), 0.0);
        assert!(!PageScan::default().is_scanned());

        let four_of_five = PageScan {
            pages: 5,
            image_only: 4,
        };
        assert!((four_of_five.ratio() - 0.8).abs() < f64::EPSILON);
        assert!(four_of_five.is_scanned());
        assert!(!PageScan {
            pages: 5,
            image_only: 3
        }
        .is_scanned());
    }

    #[test]
    fn empty_document_has_no_pages() {
        let scan = PageScan::of(&Document::with_version("1.5"));
        assert_eq!(scan, PageScan::default());
    }

    #[test]
    fn plain_text_sources_pass_through() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Total Value\n2 EA X US 1.00 2.00 Thing 1234.56.7890").unwrap();

        let source = text_of(file.path()).unwrap();
        assert!(source.text.starts_with("Total Value"));
        assert_eq!(source.scan, None);
    }

    #[test]
    fn unreadable_pdf_yields_empty_text() {
        let mut file = tempfile::Builder::new().suffix(".PDF").tempfile().unwrap();
        file.write_all(b"not really a pdf").unwrap();

        assert_eq!(text_of(file.path()).unwrap(), SourceText::default());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(text_of(dir.path().join("gone.txt")).is_err());
    }
}
