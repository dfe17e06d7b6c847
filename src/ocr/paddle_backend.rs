//! PaddleOCR backend implementation.
//!
//! Uses paddle-ocr-rs for OCR via ONNX Runtime. This is the slower,
//! higher-accuracy engine: every detected line comes with a recognition
//! score, which is what confidence filtering works on.
//!
//! Models are automatically downloaded during the probe from the RapidOCR
//! mirrors. The recognition model follows the configured language: any
//! Latin-script language such as Vietnamese switches to the Latin model and
//! its dictionary, since the default model has no diacritics.

use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use image::{DynamicImage, GrayImage};
use paddle_ocr_rs::ocr_lite::OcrLite;
use tracing::debug;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult, TextRegion};
use super::model_utils::{ModelFile, ModelStore};

const STORE: ModelStore = ModelStore {
    subdir: "paddle-ocr",
};

const DET_MODEL: ModelFile = ModelFile {
    filename: "ch_PP-OCRv4_det_infer.onnx",
    url: "https://huggingface.co/SWHL/RapidOCR/resolve/main/PP-OCRv4/ch_PP-OCRv4_det_infer.onnx",
    size_hint: "4 MB",
};

const CLS_MODEL: ModelFile = ModelFile {
    filename: "ch_ppocr_mobile_v2.0_cls_infer.onnx",
    url: "https://www.modelscope.cn/models/RapidAI/RapidOCR/resolve/v3.4.0/onnx/PP-OCRv4/cls/ch_ppocr_mobile_v2.0_cls_infer.onnx",
    size_hint: "1 MB",
};

/// A recognition model and the character dictionary it decodes against.
/// Models without a dictionary carry it in their metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Recognizer {
    pub label: &'static str,
    pub model: ModelFile,
    pub dict: Option<ModelFile>,
}

/// Simplified Chinese plus English.
pub(crate) const CHINESE_REC: Recognizer = Recognizer {
    label: "PP-OCRv4 ch",
    model: ModelFile {
        filename: "ch_PP-OCRv4_rec_infer.onnx",
        url: "https://huggingface.co/SWHL/RapidOCR/resolve/main/PP-OCRv4/ch_PP-OCRv4_rec_infer.onnx",
        size_hint: "10 MB",
    },
    dict: None,
};

/// Latin script with diacritics (Vietnamese, French, German, ...).
pub(crate) const LATIN_REC: Recognizer = Recognizer {
    label: "PP-OCRv3 latin",
    model: ModelFile {
        filename: "latin_PP-OCRv3_rec_infer.onnx",
        url: "https://www.modelscope.cn/models/RapidAI/RapidOCR/resolve/v3.4.0/onnx/PP-OCRv3/rec/latin_PP-OCRv3_rec_mobile_infer.onnx",
        size_hint: "8 MB",
    },
    dict: Some(ModelFile {
        filename: "latin_dict.txt",
        url: "https://raw.githubusercontent.com/PaddlePaddle/PaddleOCR/release/2.7/ppocr/utils/dict/latin_dict.txt",
        size_hint: "2 KB",
    }),
};

/// Tesseract language codes whose text needs the Latin recognizer.
const LATIN_LANGUAGES: &[&str] = &[
    "vie", "fra", "deu", "spa", "por", "ita", "nld", "pol", "ces", "slk", "ron", "hun", "tur",
    "swe", "dan", "nor", "fin", "est", "lav", "lit", "hrv", "slv", "ind", "msa", "cat",
];

/// Pick the recognizer for a `+`-separated language list such as `eng+vie`.
/// English alone stays on the Chinese/English model.
pub(crate) fn recognizer_for(language: &str) -> Recognizer {
    let needs_latin = language
        .split('+')
        .map(str::trim)
        .any(|code| LATIN_LANGUAGES.contains(&code));
    if needs_latin {
        LATIN_REC
    } else {
        CHINESE_REC
    }
}

impl Recognizer {
    fn files(&self) -> Vec<ModelFile> {
        let mut files = vec![DET_MODEL, CLS_MODEL, self.model];
        files.extend(self.dict);
        files
    }
}

const PADDING: u32 = 50;
const MAX_SIDE_LEN: u32 = 1024;
const BOX_SCORE_THRESH: f32 = 0.5;
const BOX_THRESH: f32 = 0.3;
const UNCLIP_RATIO: f32 = 1.6;

/// PaddleOCR backend via ONNX Runtime.
pub struct PaddleBackend {
    config: OcrConfig,
    recognizer: Recognizer,
    /// Loaded by `probe`; `detect` needs `&mut self`, hence the Mutex.
    engine: OnceLock<Mutex<OcrLite>>,
}

impl PaddleBackend {
    /// Create a new PaddleOCR backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    /// Create a new PaddleOCR backend; the recognition model follows
    /// `config.language`.
    pub fn with_config(config: OcrConfig) -> Self {
        let recognizer = recognizer_for(&config.language);
        Self {
            config,
            recognizer,
            engine: OnceLock::new(),
        }
    }

    fn load_engine(&self) -> Result<OcrLite, OcrError> {
        let model_dir = STORE.ensure(self.config.model_path.as_ref(), &self.recognizer.files())?;
        let path = |file: &ModelFile| model_dir.join(file.filename).to_string_lossy().to_string();
        let det = path(&DET_MODEL);
        let cls = path(&CLS_MODEL);
        let rec = path(&self.recognizer.model);

        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .clamp(1, 4);

        debug!(
            "Loading PaddleOCR {} for language {}",
            self.recognizer.label, self.config.language
        );
        let mut ocr = OcrLite::new();
        let init = match &self.recognizer.dict {
            Some(dict) => ocr.init_models_with_dict(&det, &cls, &rec, &path(dict), threads),
            None => ocr.init_models(&det, &cls, &rec, threads),
        };
        init.map_err(|e| OcrError::OcrFailed(format!("Failed to init PaddleOCR: {}", e)))?;
        Ok(ocr)
    }

    fn hint(&self) -> String {
        STORE.hint(
            self.config.model_path.as_ref(),
            &self.recognizer.files(),
            "PaddleOCR",
            "15 MB",
        )
    }

    fn run_paddle(&self, image: &GrayImage) -> Result<Vec<TextRegion>, OcrError> {
        let engine = self.engine.get().ok_or_else(|| {
            OcrError::BackendNotAvailable("PaddleOCR used before it was probed".to_string())
        })?;
        // A panic inside `detect` poisons the lock; the engine itself is still usable.
        let mut ocr = engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let result = ocr
            .detect(
                &rgb,
                PADDING,
                MAX_SIDE_LEN,
                BOX_SCORE_THRESH,
                BOX_THRESH,
                UNCLIP_RATIO,
                false,
                false,
            )
            .map_err(|e| OcrError::OcrFailed(format!("PaddleOCR detection failed: {}", e)))?;

        Ok(result
            .text_blocks
            .into_iter()
            .map(|block| TextRegion {
                text: block.text,
                confidence: block.text_score,
            })
            .collect())
    }
}

impl Default for PaddleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for PaddleBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::PaddleOcr
    }

    fn probe(&self) -> Result<String, OcrError> {
        if self.engine.get().is_none() {
            let ocr = self.load_engine()?;
            // Another thread may have won; either engine is fine.
            let _ = self.engine.set(Mutex::new(ocr));
        }
        Ok(format!("PaddleOCR {} ({})", self.recognizer.label, self.hint()))
    }

    fn availability_hint(&self) -> String {
        self.hint()
    }

    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let regions = self.run_paddle(image)?;
        Ok(OcrResult::from_regions(
            regions,
            OcrBackendType::PaddleOcr,
            start,
        ))
    }
}
