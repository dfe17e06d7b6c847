//! OCR engine abstraction.
//!
//! Every engine implements [`OcrBackend`]. Engines are probed once when the
//! [`EngineRegistry`](super::EngineRegistry) is built; a successful probe
//! yields an [`EngineHandle`], which is the only thing the orchestrator ever
//! calls into.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GrayImage};
use thiserror::Error;
use tracing::{debug, warn};

use super::preprocess::Preprocessor;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Language data not found for '{0}'")]
    LanguageDataNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Available OCR backend types.
///
/// Declaration order is not significant; priority comes from the order in
/// which engines are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line. Fast, single pass.
    Tesseract,
    /// PaddleOCR via ONNX Runtime. Slower, reports per-region confidence.
    PaddleOcr,
    /// Pure Rust OCR engine (ocrs crate).
    Ocrs,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::PaddleOcr => "paddleocr",
            OcrBackendType::Ocrs => "ocrs",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "paddleocr" | "paddle" => Some(OcrBackendType::PaddleOcr),
            "ocrs" => Some(OcrBackendType::Ocrs),
            _ => None,
        }
    }

    /// Human-readable engine name.
    pub fn display_name(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "Tesseract",
            OcrBackendType::PaddleOcr => "PaddleOCR",
            OcrBackendType::Ocrs => "OCRS",
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single detected text region with the engine's confidence in it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub text: String,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
}

/// Result of OCR processing.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Extracted text content.
    pub text: String,
    /// Per-region detections, for engines that report confidence.
    pub regions: Option<Vec<TextRegion>>,
    /// Which backend produced this result.
    pub backend: OcrBackendType,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl OcrResult {
    /// Build a plain-text result timed from `start`.
    pub fn from_text(text: String, backend: OcrBackendType, start: Instant) -> Self {
        Self {
            text,
            regions: None,
            backend,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Build a region-based result timed from `start`.
    ///
    /// `text` is all regions joined with newlines; confidence filtering
    /// happens later in [`EngineHandle`].
    pub fn from_regions(regions: Vec<TextRegion>, backend: OcrBackendType, start: Instant) -> Self {
        let text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            regions: Some(regions),
            backend,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Final text for this result.
    ///
    /// Region-based results keep only regions whose confidence is above
    /// `min_confidence`, joined with single spaces.
    pub fn filtered_text(&self, min_confidence: f32) -> String {
        match &self.regions {
            Some(regions) => regions
                .iter()
                .filter(|r| r.confidence > min_confidence)
                .map(|r| r.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            None => self.text.trim().to_string(),
        }
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Initialize the engine's runtime and models.
    ///
    /// Called exactly once by the registry. Returns a short description of
    /// what was found (e.g. a version string).
    fn probe(&self) -> Result<String, OcrError>;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Run OCR on an already preprocessed image.
    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError>;
}

/// Configuration shared by OCR backends.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Language for OCR (e.g., "eng+vie").
    pub language: String,
    /// Path to model files (for backends that need them).
    pub model_path: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng+vie".to_string(),
            model_path: None,
        }
    }
}

/// A backend whose probe succeeded.
#[derive(Clone)]
pub struct EngineHandle {
    backend: Arc<dyn OcrBackend>,
    description: String,
    preprocessor: Preprocessor,
    min_confidence: f32,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("backend", &self.backend.backend_type())
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl EngineHandle {
    /// Probe `backend` and wrap it if it initialized.
    pub fn probe(
        backend: Arc<dyn OcrBackend>,
        preprocessor: Preprocessor,
        min_confidence: f32,
    ) -> Result<Self, OcrError> {
        let description = backend.probe()?;
        debug!("{} ready: {}", backend.backend_type(), description);
        Ok(Self {
            backend,
            description,
            preprocessor,
            min_confidence,
        })
    }

    pub fn backend_type(&self) -> OcrBackendType {
        self.backend.backend_type()
    }

    /// What the probe reported (e.g. a version string).
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Handles only exist for engines that initialized.
    pub fn is_available(&self) -> bool {
        true
    }

    /// Preprocess `image` and run the engine on it.
    ///
    /// Never fails: any engine error is logged and yields an empty string.
    pub fn extract(&self, image: &DynamicImage) -> String {
        let processed = self.preprocessor.process(image);
        self.extract_preprocessed(&processed)
    }

    /// Run the engine on an image that already went through the preprocessor.
    ///
    /// A panicking engine is treated like a failing one.
    pub fn extract_preprocessed(&self, image: &GrayImage) -> String {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.backend.recognize(image)));
        match outcome {
            Ok(Ok(result)) => {
                debug!(
                    "{} finished in {}ms",
                    result.backend, result.processing_time_ms
                );
                result.filtered_text(self.min_confidence)
            }
            Ok(Err(e)) => {
                warn!("{} OCR error: {}", self.backend.backend_type(), e);
                String::new()
            }
            Err(payload) => {
                warn!(
                    "{} panicked: {}",
                    self.backend.backend_type(),
                    panic_message(payload.as_ref())
                );
                String::new()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}
