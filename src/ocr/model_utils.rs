//! Locating and fetching the model files of the ONNX/rten engines.
//!
//! Each engine owns a [`ModelStore`] (one subdirectory name) and asks it for
//! a directory holding a given set of [`ModelFile`]s. The set can differ per
//! language, so presence is checked against the requested files rather than
//! a fixed list.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::backend::OcrError;

/// One downloadable model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFile {
    pub filename: &'static str,
    pub url: &'static str,
    /// Approximate size, shown while downloading.
    pub size_hint: &'static str,
}

/// Model directory layout for a single engine.
#[derive(Debug, Clone, Copy)]
pub struct ModelStore {
    pub subdir: &'static str,
}

impl ModelStore {
    /// `<data dir>/doctext/<subdir>/models`, where downloads land by default.
    pub fn default_dir(&self) -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("doctext")
            .join(self.subdir)
            .join("models")
    }

    /// Directories searched for models, the configured one first.
    pub fn search_dirs(&self, configured: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = configured.cloned().into_iter().collect();
        candidates.push(self.default_dir());
        candidates.extend(dirs::home_dir().map(|h| h.join(".doctext").join(self.subdir)));
        candidates.push(PathBuf::from("/usr/share/doctext").join(self.subdir));
        candidates.push(PathBuf::from("models").join(self.subdir));
        candidates
    }

    /// First search directory that holds every file in `files`.
    pub fn locate(&self, configured: Option<&PathBuf>, files: &[ModelFile]) -> Option<PathBuf> {
        self.search_dirs(configured)
            .into_iter()
            .find(|dir| has_all(dir, files))
    }

    /// Locate `files`, downloading whatever is missing into the configured
    /// directory (or the default one) when no complete directory exists.
    pub fn ensure(
        &self,
        configured: Option<&PathBuf>,
        files: &[ModelFile],
    ) -> Result<PathBuf, OcrError> {
        if let Some(dir) = self.locate(configured, files) {
            debug!("Using {} models in {}", self.subdir, dir.display());
            return Ok(dir);
        }

        let target = configured.cloned().unwrap_or_else(|| self.default_dir());
        std::fs::create_dir_all(&target)?;
        for file in files {
            let dest = target.join(file.filename);
            if dest.exists() {
                continue;
            }
            info!("Downloading {} (~{})", file.filename, file.size_hint);
            fetch(file.url, &dest)?;
        }
        Ok(target)
    }

    /// Human-readable line for the status report.
    pub fn hint(
        &self,
        configured: Option<&PathBuf>,
        files: &[ModelFile],
        engine: &str,
        total_size: &str,
    ) -> String {
        match self.locate(configured, files) {
            Some(dir) => format!("{} models found at {}", engine, dir.display()),
            None => format!(
                "{} models will be downloaded on first use (~{}) to {}",
                engine,
                total_size,
                configured
                    .cloned()
                    .unwrap_or_else(|| self.default_dir())
                    .display()
            ),
        }
    }
}

fn has_all(dir: &Path, files: &[ModelFile]) -> bool {
    files.iter().all(|file| dir.join(file.filename).is_file())
}

/// Download `url` to `dest` with curl, or wget when curl is not installed.
/// A partial file is removed on failure.
fn fetch(url: &str, dest: &Path) -> Result<(), OcrError> {
    let attempts: [(&str, &[&str]); 2] = [("curl", &["-fsSL", "-o"]), ("wget", &["-q", "-O"])];

    for (tool, args) in attempts {
        match Command::new(tool).args(args).arg(dest).arg(url).status() {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => {
                let _ = std::fs::remove_file(dest);
                return Err(OcrError::OcrFailed(format!(
                    "{} could not download {} ({})",
                    tool, url, status
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(OcrError::Io(e)),
        }
    }

    Err(OcrError::BackendNotAvailable(
        "neither curl nor wget is installed; cannot download models".to_string(),
    ))
}
