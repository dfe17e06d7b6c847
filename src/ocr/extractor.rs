//! Document-to-text orchestration.
//!
//! [`TextExtractor`] routes a [`Document`] by kind: native text formats go to
//! a [`DocumentTextExtractor`], PDFs are classified and either read natively
//! or rasterized and OCRed page by page, and images are OCRed directly. Every
//! page is preprocessed once and handed to each registered engine; the
//! [`SelectionPolicy`] picks one candidate per page.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage};
use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::PdfClassifier;
use super::documents::{Document, DocumentKind, DocumentTextExtractor, FormatExtractor};
use super::pdf::{PdfError, PdfRasterizer, PdfReader, PopplerPdf};
use super::preprocess::Preprocessor;
use super::registry::EngineRegistry;
use super::selection::{EngineText, SelectionPolicy};
use super::transcript::Transcript;
use crate::config::Config;

/// Reason recorded for pages skipped after cancellation or timeout.
pub const CANCELLED_REASON: &str = "Cancelled before processing";

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to open document: {0}")]
    DocumentOpen(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Map a PDF collaborator error for a document that could not be opened.
    fn from_pdf(path: &Path, err: PdfError) -> Self {
        match err {
            PdfError::ToolNotFound(tool) => ExtractionError::ToolNotFound(tool),
            PdfError::Io(e) => ExtractionError::Io(e),
            other => ExtractionError::DocumentOpen(format!("{}: {}", path.display(), other)),
        }
    }
}

/// Method used to extract text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// DOC, DOCX or plain text read natively.
    Document,
    /// Text layer of a PDF.
    PdfText,
    /// Rasterized PDF pages through OCR.
    PdfOcr,
    /// A single image through OCR.
    ImageOcr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Document => "document",
            ExtractionMethod::PdfText => "pdf_text",
            ExtractionMethod::PdfOcr => "pdf_ocr",
            ExtractionMethod::ImageOcr => "image_ocr",
        }
    }
}

/// Result of text extraction.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub text: String,
    pub used_ocr: bool,
    pub method: ExtractionMethod,
    /// Number of pages processed (for PDFs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

/// An image to OCR, either on disk or already decoded.
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    Path(&'a Path),
    Raster(&'a DynamicImage),
}

/// Cancellation and deadline for one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl ExtractOptions {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// True once the token fired or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Turns documents into text using native extraction and the registered
/// OCR engines.
#[derive(Clone)]
pub struct TextExtractor {
    registry: Arc<EngineRegistry>,
    policy: SelectionPolicy,
    preprocessor: Preprocessor,
    classifier: PdfClassifier,
    reader: Arc<dyn PdfReader>,
    rasterizer: Arc<dyn PdfRasterizer>,
    documents: Arc<dyn DocumentTextExtractor>,
    dpi: u32,
    parallel_engines: bool,
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("classifier", &self.classifier)
            .field("dpi", &self.dpi)
            .field("parallel_engines", &self.parallel_engines)
            .finish()
    }
}

impl TextExtractor {
    /// Extractor with default settings and poppler-backed PDF access.
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        let poppler = Arc::new(PopplerPdf::new());
        Self {
            registry,
            policy: SelectionPolicy::default(),
            preprocessor: Preprocessor::default(),
            classifier: PdfClassifier::new(poppler.clone()),
            reader: poppler.clone(),
            rasterizer: poppler,
            documents: Arc::new(FormatExtractor::new()),
            dpi: 300,
            parallel_engines: false,
        }
    }

    /// Extractor configured from a loaded [`Config`].
    pub fn from_config(registry: Arc<EngineRegistry>, config: &Config) -> Self {
        let poppler = Arc::new(PopplerPdf::new());
        Self {
            policy: config.ocr.selection_policy(),
            preprocessor: Preprocessor::new(config.preprocess.clone()),
            classifier: PdfClassifier::with_settings(poppler.clone(), &config.pdf),
            dpi: config.pdf.dpi,
            parallel_engines: config.ocr.parallel_engines,
            ..Self::new(registry)
        }
    }

    /// Use `reader` for native text and classification.
    pub fn with_pdf_reader(mut self, reader: Arc<dyn PdfReader>) -> Self {
        self.classifier = self.classifier.with_reader(reader.clone());
        self.reader = reader;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_document_extractor(mut self, documents: Arc<dyn DocumentTextExtractor>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_parallel_engines(mut self, parallel: bool) -> Self {
        self.parallel_engines = parallel;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Extract text from a document.
    pub fn extract(&self, document: &Document) -> Result<Extraction, ExtractionError> {
        self.extract_with_options(document, &ExtractOptions::default())
    }

    /// Extract text, stopping OCR early once `options` is cancelled.
    pub fn extract_with_options(
        &self,
        document: &Document,
        options: &ExtractOptions,
    ) -> Result<Extraction, ExtractionError> {
        info!(
            "Extracting text from {} ({})",
            document.path.display(),
            document.kind.as_str()
        );
        match document.kind {
            DocumentKind::Doc | DocumentKind::Docx | DocumentKind::PlainText => {
                let text = self.documents.extract_text(document)?;
                Ok(Extraction {
                    text,
                    used_ocr: false,
                    method: ExtractionMethod::Document,
                    page_count: None,
                })
            }
            DocumentKind::Pdf => self.extract_pdf(&document.path, options),
            DocumentKind::Image => {
                let image = image::open(&document.path).map_err(|e| {
                    ExtractionError::DocumentOpen(format!("{}: {}", document.path.display(), e))
                })?;
                let text = if options.is_cancelled() {
                    warn!("Extraction cancelled before OCR");
                    String::new()
                } else {
                    self.extract_text_from_image(ImageInput::Raster(&image))
                };
                Ok(Extraction {
                    text,
                    used_ocr: true,
                    method: ExtractionMethod::ImageOcr,
                    page_count: Some(1),
                })
            }
        }
    }

    /// Run [`extract_with_options`](Self::extract_with_options) on the
    /// blocking thread pool.
    pub async fn extract_blocking_async(
        &self,
        document: Document,
        options: ExtractOptions,
    ) -> Result<Extraction, ExtractionError> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract_with_options(&document, &options))
            .await
            .map_err(|e| ExtractionError::ExtractionFailed(format!("extraction task failed: {}", e)))?
    }

    fn extract_pdf(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<Extraction, ExtractionError> {
        if self.classifier.is_image_based(path) {
            info!("Image-based PDF detected, using OCR");
            return self.ocr_pdf(path, options);
        }

        info!("Text-based PDF detected, using native extraction");
        match self.native_pdf_text(path) {
            Ok((text, pages)) => Ok(Extraction {
                text,
                used_ocr: false,
                method: ExtractionMethod::PdfText,
                page_count: Some(pages),
            }),
            Err(e) => {
                warn!("Native extraction failed, trying OCR: {}", e);
                self.ocr_pdf(path, options)
            }
        }
    }

    /// Non-empty page texts joined with newlines.
    fn native_pdf_text(&self, path: &Path) -> Result<(String, u32), PdfError> {
        let pages = self.reader.page_count(path)?;
        let mut parts = Vec::with_capacity(pages as usize);
        for page in 1..=pages {
            let text = self.reader.page_text(path, page)?;
            // pdftotext terminates every page with a form feed.
            let text = text.trim_end_matches(|c: char| c == '\u{c}' || c.is_whitespace());
            if !text.trim().is_empty() {
                parts.push(text.to_string());
            }
        }
        Ok((parts.join("\n"), pages))
    }

    /// Rasterize every page and OCR them in page order.
    fn ocr_pdf(&self, path: &Path, options: &ExtractOptions) -> Result<Extraction, ExtractionError> {
        let temp_dir = TempDir::new()?;
        let pages = self
            .rasterizer
            .rasterize(path, self.dpi, temp_dir.path())
            .map_err(|e| ExtractionError::from_pdf(path, e))?;

        let total = pages.len();
        let mut transcript = Transcript::new();
        for (i, page_path) in pages.iter().enumerate() {
            let page = i + 1;
            if options.is_cancelled() {
                transcript.push_error(page, CANCELLED_REASON);
                continue;
            }
            info!("Processing page {}/{}", page, total);
            match image::open(page_path) {
                Ok(image) => {
                    transcript.push_page(page, self.extract_text_from_image(ImageInput::Raster(&image)))
                }
                Err(e) => {
                    error!("Failed to load page {} image: {}", page, e);
                    transcript.push_error(page, e.to_string());
                }
            }
        }

        let text = transcript.render();
        info!("OCR completed. Extracted {} characters", text.chars().count());
        Ok(Extraction {
            text,
            used_ocr: true,
            method: ExtractionMethod::PdfOcr,
            page_count: Some(total as u32),
        })
    }

    /// OCR several page images of one document, labelling each block with
    /// its file name.
    pub fn extract_from_images(&self, paths: &[PathBuf]) -> String {
        self.extract_from_images_with_options(paths, &ExtractOptions::default())
    }

    pub fn extract_from_images_with_options(
        &self,
        paths: &[PathBuf],
        options: &ExtractOptions,
    ) -> String {
        let mut transcript = Transcript::new();
        for (i, path) in paths.iter().enumerate() {
            let page = i + 1;
            if options.is_cancelled() {
                transcript.push_error(page, CANCELLED_REASON);
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            info!("Processing image {}/{}: {}", page, paths.len(), name);

            match image::open(path) {
                Ok(image) => {
                    let text = self.extract_text_from_image(ImageInput::Raster(&image));
                    if text.is_empty() {
                        warn!("No text extracted from {}", name);
                    }
                    transcript.push_labelled(page, name, text);
                }
                Err(e) => {
                    error!("Error processing {}: {}", path.display(), e);
                    transcript.push_error(page, e.to_string());
                }
            }
        }

        let text = transcript.render();
        info!(
            "Multi-image OCR completed. Extracted {} characters from {} images",
            text.chars().count(),
            paths.len()
        );
        text
    }

    /// OCR one image with every available engine and keep the best result.
    ///
    /// Returns an empty string when the image cannot be loaded or no engine
    /// produced text.
    pub fn extract_text_from_image(&self, input: ImageInput<'_>) -> String {
        let loaded;
        let image = match input {
            ImageInput::Path(path) => match image::open(path) {
                Ok(image) => {
                    loaded = image;
                    &loaded
                }
                Err(e) => {
                    error!("Failed to load image from path {}: {}", path.display(), e);
                    return String::new();
                }
            },
            ImageInput::Raster(image) => image,
        };

        if !self.registry.has_engines() {
            warn!("No OCR engines available");
            return String::new();
        }

        let processed = self.preprocessor.process(image);
        let candidates = self.run_engines(&processed);
        match self.policy.select(&candidates) {
            Some(best) => {
                info!(
                    "Using {} result ({} chars)",
                    best.engine.display_name(),
                    best.char_len()
                );
                best.text.clone()
            }
            None => {
                warn!("No OCR engine produced text");
                String::new()
            }
        }
    }

    /// Non-empty output of each engine, in registry order.
    fn run_engines(&self, image: &GrayImage) -> Vec<EngineText> {
        let engines = self.registry.engines();
        let outputs: Vec<String> = if self.parallel_engines && engines.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = engines
                    .iter()
                    .map(|engine| scope.spawn(move || engine.extract_preprocessed(image)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_default())
                    .collect()
            })
        } else {
            engines
                .iter()
                .map(|engine| engine.extract_preprocessed(image))
                .collect()
        };

        engines
            .iter()
            .zip(outputs)
            .filter(|(_, text)| !text.is_empty())
            .map(|(engine, text)| {
                debug!("{} produced {} chars", engine.backend_type(), text.chars().count());
                EngineText::new(engine.backend_type(), text)
            })
            .collect()
    }
}
