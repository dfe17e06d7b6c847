//! Document-to-text pipeline.
//!
//! Extracts text from documents using:
//! - pdftotext (Poppler) for text-based PDFs
//! - OCR for image-based PDFs and image files, after preprocessing
//! - zip / antiword for DOCX and DOC
//!
//! ## OCR Backends
//!
//! - **Tesseract**: command-line OCR, fast, always compiled in
//! - **PaddleOCR**: CNN-based via ONNX, reports confidences (feature: ocr-paddle)
//! - **OCRS**: pure Rust OCR, no external binaries (feature: ocr-ocrs)
//!
//! Build an [`EngineRegistry`] once, wrap it in an `Arc`, and hand it to a
//! [`TextExtractor`].

mod backend;
mod classifier;
mod documents;
mod extractor;
mod pdf;
mod preprocess;
mod registry;
mod selection;
mod status;
mod tesseract;
mod transcript;

#[cfg(any(feature = "ocr-ocrs", feature = "ocr-paddle"))]
mod model_utils;
#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;
#[cfg(feature = "ocr-paddle")]
mod paddle_backend;

pub use backend::{
    check_binary, EngineHandle, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult,
    TextRegion,
};
pub use classifier::PdfClassifier;
pub use documents::{docx_xml_to_text, Document, DocumentKind, DocumentTextExtractor, FormatExtractor};
pub use extractor::{
    ExtractOptions, Extraction, ExtractionError, ExtractionMethod, ImageInput, TextExtractor,
    CANCELLED_REASON,
};
pub use pdf::{find_page_image, parse_page_count, PdfError, PdfRasterizer, PdfReader, PopplerPdf};
pub use preprocess::{PreprocessConfig, Preprocessor};
pub use registry::{AvailabilityRecord, EngineAvailability, EngineRegistry};
pub use selection::{EngineText, SelectionPolicy};
pub use status::{CapabilityReport, FormatSupport, OcrStatus, SupportedFormats};
pub use tesseract::TesseractBackend;
pub use transcript::{PageBlock, Transcript};

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
pub use paddle_backend::PaddleBackend;
