//! The set of OCR engines usable by this process.
//!
//! Engines are probed exactly once, when the registry is built. The outcome
//! is kept in an [`AvailabilityRecord`] that never changes afterwards, so the
//! registry can be shared across threads behind an `Arc` without locking.

use std::sync::Arc;

use tracing::{info, warn};

use super::backend::{EngineHandle, OcrBackend, OcrBackendType};
use super::preprocess::Preprocessor;
use super::status::OcrStatus;
use super::tesseract::TesseractBackend;
use crate::config::OcrSettings;

#[cfg(feature = "ocr-ocrs")]
use super::ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
use super::paddle_backend::PaddleBackend;

/// Outcome of probing one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineAvailability {
    pub engine: OcrBackendType,
    pub available: bool,
    /// Version/description on success, the probe error otherwise.
    pub detail: String,
}

/// Per-engine probe results, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityRecord {
    entries: Vec<EngineAvailability>,
}

impl AvailabilityRecord {
    pub fn entries(&self) -> &[EngineAvailability] {
        &self.entries
    }

    pub fn is_available(&self, engine: OcrBackendType) -> bool {
        self.entries
            .iter()
            .any(|e| e.engine == engine && e.available)
    }

    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|e| e.available).count()
    }

    fn push(&mut self, entry: EngineAvailability) {
        self.entries.push(entry);
    }
}

/// Probed OCR engines, in priority order.
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    engines: Vec<EngineHandle>,
    record: AvailabilityRecord,
}

impl EngineRegistry {
    /// A registry with no engines; OCR yields empty text.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Probe each backend independently, keeping the ones that initialize.
    pub fn probe_all(
        backends: Vec<Arc<dyn OcrBackend>>,
        preprocessor: &Preprocessor,
        min_confidence: f32,
    ) -> Self {
        let mut registry = Self::empty();
        for backend in backends {
            registry.probe_one(backend, preprocessor, min_confidence);
        }
        info!(
            "OCR registry initialized with {} of {} engines",
            registry.engines.len(),
            registry.record.entries().len()
        );
        registry
    }

    /// Build backends named in `settings.engines` and probe them.
    ///
    /// Unknown names are skipped with a warning. Known engines that were not
    /// compiled in are recorded as unavailable.
    pub fn from_settings(settings: &OcrSettings, preprocessor: &Preprocessor) -> Self {
        let mut registry = Self::empty();
        for name in &settings.engines {
            let Some(engine) = OcrBackendType::from_str(name) else {
                warn!("Unknown OCR engine '{}' in configuration", name);
                continue;
            };
            if registry.record.entries().iter().any(|e| e.engine == engine) {
                continue;
            }
            match create_backend(engine, settings) {
                Some(backend) => {
                    registry.probe_one(backend, preprocessor, settings.min_confidence)
                }
                None => {
                    warn!(
                        "{} not available: not compiled in (enable the matching ocr-* feature)",
                        engine.display_name()
                    );
                    registry.record.push(EngineAvailability {
                        engine,
                        available: false,
                        detail: "not compiled in".to_string(),
                    });
                }
            }
        }
        info!(
            "OCR registry initialized with {} of {} engines",
            registry.engines.len(),
            registry.record.entries().len()
        );
        registry
    }

    fn probe_one(
        &mut self,
        backend: Arc<dyn OcrBackend>,
        preprocessor: &Preprocessor,
        min_confidence: f32,
    ) {
        let engine = backend.backend_type();
        match EngineHandle::probe(backend.clone(), preprocessor.clone(), min_confidence) {
            Ok(handle) => {
                info!("{} OCR initialized successfully", engine.display_name());
                self.record.push(EngineAvailability {
                    engine,
                    available: true,
                    detail: handle.description().to_string(),
                });
                self.engines.push(handle);
            }
            Err(e) => {
                warn!("{} not available: {}", engine.display_name(), e);
                info!("{}", backend.availability_hint());
                self.record.push(EngineAvailability {
                    engine,
                    available: false,
                    detail: e.to_string(),
                });
            }
        }
    }

    /// Usable engines, in priority order.
    pub fn engines(&self) -> &[EngineHandle] {
        &self.engines
    }

    pub fn get(&self, engine: OcrBackendType) -> Option<&EngineHandle> {
        self.engines.iter().find(|h| h.backend_type() == engine)
    }

    pub fn is_available(&self, engine: OcrBackendType) -> bool {
        self.record.is_available(engine)
    }

    pub fn has_engines(&self) -> bool {
        !self.engines.is_empty()
    }

    pub fn record(&self) -> &AvailabilityRecord {
        &self.record
    }

    /// Availability snapshot for health checks. Reads the cached record only.
    pub fn status(&self) -> OcrStatus {
        OcrStatus::from_record(&self.record)
    }
}

/// Create a backend for `engine`, or `None` if it was not compiled in.
fn create_backend(engine: OcrBackendType, settings: &OcrSettings) -> Option<Arc<dyn OcrBackend>> {
    let config = settings.backend_config();
    match engine {
        OcrBackendType::Tesseract => Some(Arc::new(TesseractBackend::with_config(config))),
        #[cfg(feature = "ocr-paddle")]
        OcrBackendType::PaddleOcr => Some(Arc::new(PaddleBackend::with_config(config))),
        #[cfg(feature = "ocr-ocrs")]
        OcrBackendType::Ocrs => Some(Arc::new(OcrsBackend::with_config(config))),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
