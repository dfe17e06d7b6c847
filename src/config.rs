//! Configuration management for doctext using the prefer crate.
//!
//! Config files are discovered by prefer (`doctext.toml`, `doctext.yaml`,
//! `doctext.json`, ... in the usual locations) and parsed with serde. Every
//! field has a default, so an empty or missing file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ocr::{OcrBackendType, OcrConfig, PreprocessConfig, SelectionPolicy};

/// Environment variable overriding `ocr.engines` (comma separated).
pub const ENGINES_ENV: &str = "DOCTEXT_OCR_ENGINES";
/// Environment variable overriding `ocr.language`.
pub const LANGUAGE_ENV: &str = "DOCTEXT_OCR_LANGUAGE";

/// OCR engine selection and result reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Engines to probe at startup, in priority order.
    pub engines: Vec<String>,
    /// Tesseract-style language string (e.g. "eng+vie").
    pub language: String,
    /// Engines whose output wins once it is long enough, in order.
    pub preferred: Vec<String>,
    /// Length a preferred engine's output must exceed to win outright.
    pub min_preferred_chars: usize,
    /// Regions at or below this confidence are dropped.
    pub min_confidence: f32,
    /// Run all engines on a page concurrently.
    pub parallel_engines: bool,
    /// Directory holding model files for model-based engines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engines: vec!["tesseract".to_string(), "paddleocr".to_string()],
            language: "eng+vie".to_string(),
            preferred: vec!["paddleocr".to_string()],
            min_preferred_chars: 50,
            min_confidence: 0.5,
            parallel_engines: false,
            model_path: None,
        }
    }
}

impl OcrSettings {
    /// Selection policy built from `preferred`; unknown names are skipped.
    pub fn selection_policy(&self) -> SelectionPolicy {
        let preferred = self
            .preferred
            .iter()
            .filter_map(|name| {
                let parsed = OcrBackendType::from_str(name);
                if parsed.is_none() {
                    warn!("Ignoring unknown preferred OCR engine '{}'", name);
                }
                parsed
            })
            .collect();
        SelectionPolicy::new(preferred, self.min_preferred_chars)
    }

    /// Settings handed to each backend.
    pub fn backend_config(&self) -> OcrConfig {
        OcrConfig {
            language: self.language.clone(),
            model_path: self.model_path.clone(),
        }
    }

    /// Apply `DOCTEXT_OCR_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(engines) = std::env::var(ENGINES_ENV) {
            self.engines = parse_engine_list(&engines);
        }
        if let Ok(language) = std::env::var(LANGUAGE_ENV) {
            if !language.trim().is_empty() {
                self.language = language.trim().to_string();
            }
        }
        self
    }
}

/// Parse a comma-separated engine list, dropping blanks.
pub fn parse_engine_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// PDF handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    /// Rasterization resolution for OCR.
    pub dpi: u32,
    /// Pages inspected from the start of the document when classifying.
    pub sample_pages: u32,
    /// Trimmed characters a page needs to count as having text.
    pub min_page_chars: usize,
    /// Below this share of text pages the PDF is treated as scanned.
    pub min_text_ratio: f64,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            sample_pages: 2,
            min_page_chars: 50,
            min_text_ratio: 0.5,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrSettings,
    pub preprocess: PreprocessConfig,
    pub pdf: PdfSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    pub async fn load() -> Self {
        match prefer::load("doctext").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("{}; using defaults", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => {
                debug!("No doctext config file found, using defaults");
                Self::default_with_env()
            }
        }
    }

    /// Default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.ocr = config.ocr.with_env_overrides();
        config
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        config.ocr = config.ocr.with_env_overrides();
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }
}
