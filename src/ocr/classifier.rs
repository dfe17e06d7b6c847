//! Text-based vs image-based PDF detection.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::pdf::{PdfError, PdfReader};
use crate::config::PdfSettings;

/// Decides whether a PDF needs OCR by sampling its first pages.
#[derive(Clone)]
pub struct PdfClassifier {
    reader: Arc<dyn PdfReader>,
    /// Pages inspected from the start of the document.
    pub sample_pages: u32,
    /// Trimmed characters a page needs to count as having text.
    pub min_page_chars: usize,
    /// Below this share of text pages the document is image-based.
    pub min_text_ratio: f64,
}

impl std::fmt::Debug for PdfClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfClassifier")
            .field("sample_pages", &self.sample_pages)
            .field("min_page_chars", &self.min_page_chars)
            .field("min_text_ratio", &self.min_text_ratio)
            .finish()
    }
}

impl PdfClassifier {
    pub fn new(reader: Arc<dyn PdfReader>) -> Self {
        Self::with_settings(reader, &PdfSettings::default())
    }

    pub fn with_settings(reader: Arc<dyn PdfReader>, settings: &PdfSettings) -> Self {
        Self {
            reader,
            sample_pages: settings.sample_pages,
            min_page_chars: settings.min_page_chars,
            min_text_ratio: settings.min_text_ratio,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn PdfReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_sample_pages(mut self, sample_pages: u32) -> Self {
        self.sample_pages = sample_pages;
        self
    }

    /// True when the PDF should go through OCR.
    ///
    /// Any failure to read the document counts as image-based.
    pub fn is_image_based(&self, path: &Path) -> bool {
        match self.sample(path) {
            Ok((with_text, sampled)) => {
                info!(
                    "PDF analysis: {}/{} sampled pages have extractable text",
                    with_text, sampled
                );
                (with_text as f64 / sampled as f64) < self.min_text_ratio
            }
            Err(e) => {
                warn!(
                    "Could not analyze {}, treating as image-based: {}",
                    path.display(),
                    e
                );
                true
            }
        }
    }

    /// Returns `(pages_with_text, pages_sampled)`; `pages_sampled` is never zero.
    fn sample(&self, path: &Path) -> Result<(u32, u32), PdfError> {
        let total = self.reader.page_count(path)?;
        let sampled = self.sample_pages.min(total);
        if sampled == 0 {
            return Err(PdfError::OpenFailed(format!(
                "{} has no pages to sample",
                path.display()
            )));
        }

        let mut with_text = 0;
        for page in 1..=sampled {
            let text = self.reader.page_text(path, page)?;
            if text.trim().chars().count() > self.min_page_chars {
                with_text += 1;
            }
        }
        Ok((with_text, sampled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves a fixed list of page texts; `None` pages fail to extract.
    struct FakeReader {
        pages: Option<Vec<Option<String>>>,
        reads: AtomicU32,
    }

    impl FakeReader {
        fn new(pages: Vec<Option<&str>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Some(pages.into_iter().map(|p| p.map(str::to_string)).collect()),
                reads: AtomicU32::new(0),
            })
        }

        fn unopenable() -> Arc<Self> {
            Arc::new(Self {
                pages: None,
                reads: AtomicU32::new(0),
            })
        }
    }

    impl PdfReader for FakeReader {
        fn page_count(&self, _path: &Path) -> Result<u32, PdfError> {
            self.pages
                .as_ref()
                .map(|p| p.len() as u32)
                .ok_or_else(|| PdfError::OpenFailed("corrupt".to_string()))
        }

        fn page_text(&self, _path: &Path, page: u32) -> Result<String, PdfError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.pages
                .as_ref()
                .and_then(|p| p.get(page as usize - 1).cloned().flatten())
                .ok_or_else(|| PdfError::ExtractionFailed(format!("page {}", page)))
        }
    }

    fn text(n: usize) -> String {
        "a".repeat(n)
    }

    fn classify(reader: Arc<FakeReader>) -> bool {
        PdfClassifier::new(reader).is_image_based(Path::new("cv.pdf"))
    }

    #[test]
    fn test_text_pdf_is_not_image_based() {
        let long = text(200);
        assert!(!classify(FakeReader::new(vec![Some(long.as_str()), Some(long.as_str())])));
    }

    #[test]
    fn test_half_text_pages_is_text_based() {
        let long = text(200);
        assert!(!classify(FakeReader::new(vec![Some(long.as_str()), Some("")])));
    }

    #[test]
    fn test_scanned_pdf_is_image_based() {
        assert!(classify(FakeReader::new(vec![Some(""), Some("  \n ")])));
    }

    #[test]
    fn test_exactly_fifty_chars_is_not_meaningful() {
        let fifty = format!("  {}  ", text(50));
        assert!(classify(FakeReader::new(vec![Some(fifty.as_str())])));
        let fifty_one = text(51);
        assert!(!classify(FakeReader::new(vec![Some(fifty_one.as_str())])));
    }

    #[test]
    fn test_only_first_pages_are_sampled() {
        let long = text(200);
        let reader = FakeReader::new(vec![Some(""), Some(""), Some(long.as_str()), Some(long.as_str())]);
        assert!(classify(reader.clone()));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_page_document_samples_one_page() {
        let long = text(80);
        let reader = FakeReader::new(vec![Some(long.as_str())]);
        assert!(!classify(reader.clone()));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreadable_document_is_image_based() {
        assert!(classify(FakeReader::unopenable()));
    }

    #[test]
    fn test_zero_pages_is_image_based() {
        assert!(classify(FakeReader::new(Vec::new())));
    }

    #[test]
    fn test_page_extraction_failure_is_image_based() {
        let long = text(200);
        assert!(classify(FakeReader::new(vec![Some(long.as_str()), None])));
    }

    #[test]
    fn test_sample_pages_is_configurable() {
        let long = text(200);
        let reader = FakeReader::new(vec![Some(long.as_str()), Some(""), Some("")]);
        let classifier = PdfClassifier::new(reader).with_sample_pages(3);
        assert!(classifier.is_image_based(Path::new("cv.pdf")));
    }
}
