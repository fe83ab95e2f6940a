
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Page separator in plain text exports
const FORM_FEED: char = '\x0c';

/// Text of one page. `number` is 1-based and `None` for unpaginated documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub number: Option<u32>,
    pub text: String,
}

/// Turns a document on disk into page texts
pub trait TextExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedPage>>;
}

impl<T: TextExtractor + ?Sized> TextExtractor for &T {
    #[inline]
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedPage>> {
        (**self).extract(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" | "md" | "markdown" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Extracts PDF, plain text and Markdown files based on their extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl FileExtractor {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Whether the file extension is one this extractor handles
    #[inline]
    pub fn supports(path: &Path) -> bool {
        DocumentKind::from_path(path).is_some()
    }

    fn extract_pdf(path: &Path) -> Result<Vec<ExtractedPage>> {
        let document = lopdf::Document::load(path)
            .map_err(|e| anyhow!("Failed to parse PDF {}: {}", path.display(), e))?;

        let pages = document.get_pages();
        debug!("PDF {} has {} pages", path.display(), pages.len());

        let extracted = pages
            .keys()
            .map(|&number| {
                let text = document.extract_text(&[number]).unwrap_or_else(|e| {
                    warn!(
                        "Failed to extract text from page {} of {}: {}",
                        number,
                        path.display(),
                        e
                    );
                    String::new()
                });
                ExtractedPage {
                    number: Some(number),
                    text,
                }
            })
            .collect();

        Ok(extracted)
    }

    fn extract_plain_text(path: &Path) -> Result<Vec<ExtractedPage>> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);

        if !text.contains(FORM_FEED) {
            return Ok(vec![ExtractedPage {
                number: None,
                text: text.into_owned(),
            }]);
        }

        Ok(text
            .split(FORM_FEED)
            .zip(1..)
            .map(|(page, number)| ExtractedPage {
                number: Some(number),
                text: page.to_string(),
            })
            .collect())
    }
}

impl TextExtractor for FileExtractor {
    #[inline]
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedPage>> {
        match DocumentKind::from_path(path) {
            Some(DocumentKind::Pdf) => Self::extract_pdf(path),
            Some(DocumentKind::PlainText) => Self::extract_plain_text(path),
            None => Err(anyhow!("Unsupported file type: {}", path.display())),
        }
    }
}
