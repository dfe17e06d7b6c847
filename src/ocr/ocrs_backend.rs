//! OCRS OCR backend implementation.
//!
//! Uses the ocrs crate for pure-Rust OCR without external dependencies.
//! This is a lightweight, CPU-based OCR engine.
//!
//! Models are automatically downloaded during the probe from:
//! https://ocrs-models.s3-accelerate.amazonaws.com/

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;

use image::{DynamicImage, GrayImage};

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
use super::model_utils::{ModelFile, ModelStore};

const STORE: ModelStore = ModelStore { subdir: "ocrs" };

const MODELS: [ModelFile; 2] = [
    ModelFile {
        filename: "text-detection.rten",
        url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
        size_hint: "2.5 MB",
    },
    ModelFile {
        filename: "text-recognition.rten",
        url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
        size_hint: "10 MB",
    },
];

/// OCRS OCR backend (pure Rust).
pub struct OcrsBackend {
    config: OcrConfig,
    /// OcrEngine is Send+Sync and its methods take &self, so no Mutex needed.
    engine: OnceLock<ocrs::OcrEngine>,
}

impl OcrsBackend {
    /// Create a new OCRS backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    /// Create a new OCRS backend with custom configuration.
    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            config,
            engine: OnceLock::new(),
        }
    }

    fn ensure_models(&self) -> Result<PathBuf, OcrError> {
        STORE.ensure(self.config.model_path.as_ref(), &MODELS)
    }

    fn load_engine(&self) -> Result<ocrs::OcrEngine, OcrError> {
        let model_dir = self.ensure_models()?;

        let detection_model = rten::Model::load_file(model_dir.join("text-detection.rten"))
            .map_err(|e| OcrError::OcrFailed(format!("Failed to load detection model: {}", e)))?;
        let recognition_model = rten::Model::load_file(model_dir.join("text-recognition.rten"))
            .map_err(|e| OcrError::OcrFailed(format!("Failed to load recognition model: {}", e)))?;

        ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| OcrError::OcrFailed(format!("Failed to create OCR engine: {}", e)))
    }

    fn run_ocrs(&self, image: &GrayImage) -> Result<String, OcrError> {
        let engine = self.engine.get().ok_or_else(|| {
            OcrError::BackendNotAvailable("OCRS used before it was probed".to_string())
        })?;

        let rgb_img = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let img_source = ocrs::ImageSource::from_bytes(rgb_img.as_raw(), (width, height))
            .map_err(|e| OcrError::ImageError(format!("Failed to convert image: {}", e)))?;

        let input = engine
            .prepare_input(img_source)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to prepare input: {}", e)))?;

        engine
            .get_text(&input)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to extract text: {}", e)))
    }
}

impl Default for OcrsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for OcrsBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Ocrs
    }

    fn probe(&self) -> Result<String, OcrError> {
        if self.engine.get().is_none() {
            let engine = self.load_engine()?;
            let _ = self.engine.set(engine);
        }
        Ok("ocrs (pure Rust)".to_string())
    }

    fn availability_hint(&self) -> String {
        STORE.hint(self.config.model_path.as_ref(), &MODELS, "OCRS", "12 MB")
    }

    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let text = self.run_ocrs(image)?;
        Ok(OcrResult::from_text(text, OcrBackendType::Ocrs, start))
    }
}
