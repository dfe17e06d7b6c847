//! Engine availability reporting for health checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::backend::OcrBackendType;
use super::registry::AvailabilityRecord;

/// `{ "<engine>_available": bool, ..., "engines_count": n }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrStatus {
    #[serde(flatten)]
    pub engines: BTreeMap<String, bool>,
    pub engines_count: usize,
}

impl OcrStatus {
    pub fn from_record(record: &AvailabilityRecord) -> Self {
        let engines = record
            .entries()
            .iter()
            .map(|e| (status_key(e.engine), e.available))
            .collect();
        Self {
            engines,
            engines_count: record.available_count(),
        }
    }

    pub fn is_available(&self, engine: OcrBackendType) -> bool {
        self.engines
            .get(&status_key(engine))
            .copied()
            .unwrap_or(false)
    }

    pub fn has_ocr(&self) -> bool {
        self.engines_count > 0
    }
}

fn status_key(engine: OcrBackendType) -> String {
    format!("{}_available", engine.as_str())
}

/// How well a document format is handled with the current engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatSupport {
    /// Needs no OCR.
    Always,
    /// Needs OCR and at least one engine is available.
    WithOcr,
    /// Needs OCR and no engine is available.
    RequiresOcrSetup,
}

impl FormatSupport {
    fn for_ocr(status: &OcrStatus) -> Self {
        if status.has_ocr() {
            FormatSupport::WithOcr
        } else {
            FormatSupport::RequiresOcrSetup
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FormatSupport::RequiresOcrSetup)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FormatSupport::Always => "always supported",
            FormatSupport::WithOcr => "supported with OCR",
            FormatSupport::RequiresOcrSetup => "requires OCR setup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFormats {
    pub text_pdfs: FormatSupport,
    pub image_pdfs: FormatSupport,
    pub doc_docx: FormatSupport,
    pub images: FormatSupport,
}

/// Status plus what it means for each input format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub ocr_engines: OcrStatus,
    pub supported_formats: SupportedFormats,
    pub recommendations: Vec<String>,
}

impl CapabilityReport {
    pub fn new(status: OcrStatus) -> Self {
        let ocr = FormatSupport::for_ocr(&status);
        let mut recommendations = Vec::new();
        if status.has_ocr() {
            recommendations.push("OCR ready for image processing".to_string());
        } else {
            recommendations.push(
                "Install tesseract-ocr with Vietnamese data (tesseract-ocr-vie) or build with \
                 --features ocr-paddle to enable image PDF processing"
                    .to_string(),
            );
        }
        if !status.is_available(OcrBackendType::PaddleOcr) {
            recommendations.push("PaddleOCR recommended for complex layouts".to_string());
        }
        if !status.is_available(OcrBackendType::Tesseract) {
            recommendations.push("Tesseract recommended for speed".to_string());
        }

        Self {
            supported_formats: SupportedFormats {
                text_pdfs: FormatSupport::Always,
                image_pdfs: ocr,
                doc_docx: FormatSupport::Always,
                images: ocr,
            },
            ocr_engines: status,
            recommendations,
        }
    }
}
