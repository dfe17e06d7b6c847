//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction.
//! This is the fast, widely-available engine.

use std::process::Command;
use std::time::Instant;

use image::GrayImage;
use tempfile::TempDir;
use tracing::debug;

use super::backend::{
    check_binary, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult,
};

/// Characters Tesseract may emit: digits, the Latin alphabet, the Vietnamese
/// precomposed letters and the space.
pub const CHAR_WHITELIST: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyzÀÁÂÃÈÉÊÌÍÒÓÔÕÙÚĂĐĨŨƠàáâãèéêìíòóôõùúăđĩũơƯĂẠẢẤẦẨẪẬẮẰẲẴẶẸẺẼỀỀỂưăạảấầẩẫậắằẳẵặẹẻẽềềểỄỆỈỊỌỎỐỒỔỖỘỚỜỞỠỢỤỦỨỪễệỉịọỏốồổỗộớờởỡợụủứừỬỮỰỲỴÝỶỸửữựỳỵýỷỹ ";

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: OcrConfig,
}

impl TesseractBackend {
    /// Create a new Tesseract backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: OcrConfig::default(),
        }
    }

    /// Create a new Tesseract backend with custom configuration.
    pub fn with_config(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Arguments passed after `<image> stdout`.
    fn engine_args(&self) -> Vec<String> {
        vec![
            "-l".to_string(),
            self.config.language.clone(),
            "--oem".to_string(),
            "3".to_string(),
            "--psm".to_string(),
            "6".to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", CHAR_WHITELIST),
        ]
    }

    /// Languages installed for the local tesseract.
    fn installed_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new("tesseract")
            .arg("--list-langs")
            .output()
            .map_err(|_| OcrError::BackendNotAvailable("tesseract not found".to_string()))?;

        if !output.status.success() {
            return Err(OcrError::BackendNotAvailable(
                "tesseract --list-langs failed".to_string(),
            ));
        }

        // Some builds print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).to_string();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_language_list(&listing))
    }

    /// Run Tesseract on an image.
    fn run_tesseract(&self, image: &GrayImage) -> Result<String, OcrError> {
        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save(&image_path)
            .map_err(|e| OcrError::ImageError(format!("Failed to write image: {}", e)))?;

        let output = Command::new("tesseract")
            .arg(&image_path)
            .arg("stdout")
            .args(self.engine_args())
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `tesseract --list-langs` output, skipping the header line.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn probe(&self) -> Result<String, OcrError> {
        let output = Command::new("tesseract")
            .arg("--version")
            .output()
            .map_err(|_| OcrError::BackendNotAvailable(self.availability_hint()))?;
        if !output.status.success() {
            return Err(OcrError::BackendNotAvailable(self.availability_hint()));
        }

        let mut banner = String::from_utf8_lossy(&output.stdout).to_string();
        if banner.trim().is_empty() {
            banner = String::from_utf8_lossy(&output.stderr).to_string();
        }
        let version = banner
            .lines()
            .next()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "tesseract (unknown version)".to_string());

        let installed = self.installed_languages()?;
        for lang in self.config.language.split('+').map(str::trim) {
            if !installed.iter().any(|l| l == lang) {
                return Err(OcrError::LanguageDataNotFound(lang.to_string()));
            }
        }
        debug!("tesseract languages: {}", installed.join(", "));

        Ok(version)
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            "Tesseract not installed. Install with: apt install tesseract-ocr tesseract-ocr-vie"
                .to_string()
        } else {
            format!(
                "Tesseract is installed; language data required: {}",
                self.config.language
            )
        }
    }

    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let text = self.run_tesseract(image)?;
        Ok(OcrResult::from_text(text, OcrBackendType::Tesseract, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_list_skips_header() {
        let listing = "List of available languages in \"/usr/share/tesseract-ocr/5/tessdata/\" (3):\neng\nosd\nvie\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "vie"]);
    }

    #[test]
    fn test_engine_args_carry_language_and_whitelist() {
        let backend = TesseractBackend::with_config(OcrConfig {
            language: "eng+vie".to_string(),
            model_path: None,
        });
        let args = backend.engine_args();
        assert_eq!(&args[..6], ["-l", "eng+vie", "--oem", "3", "--psm", "6"]);
        assert!(args[7].starts_with("tessedit_char_whitelist=0123456789"));
        assert!(args[7].contains('ữ'));
        assert!(args[7].ends_with(' '));
    }

    #[test]
    fn test_whitelist_covers_latin_alphabet() {
        for c in ('a'..='z').chain('A'..='Z').chain('0'..='9') {
            assert!(CHAR_WHITELIST.contains(c), "missing {}", c);
        }
    }
}
