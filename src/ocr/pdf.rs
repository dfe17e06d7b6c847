//! PDF access through poppler-utils (`pdfinfo`, `pdftotext`, `pdftoppm`).

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

use thiserror::Error;
use tracing::debug;

/// Errors from PDF collaborators.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Failed to open PDF: {0}")]
    OpenFailed(String),

    #[error("PDF extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Native text access to a PDF.
pub trait PdfReader: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<u32, PdfError>;

    /// Text layer of one page, 1-based.
    fn page_text(&self, path: &Path, page: u32) -> Result<String, PdfError>;
}

/// Renders PDF pages to image files.
pub trait PdfRasterizer: Send + Sync {
    /// Render every page into `out_dir` at `dpi`, returning the files in
    /// page order.
    fn rasterize(&self, path: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>, PdfError>;
}

const PDFINFO: &str = "pdfinfo (install poppler-utils)";
const PDFTOTEXT: &str = "pdftotext (install poppler-utils)";
const PDFTOPPM: &str = "pdftoppm (install poppler-utils)";

fn handle_cmd_output(
    result: std::io::Result<Output>,
    tool_name: &str,
    on_failure: impl FnOnce(String) -> PdfError,
) -> Result<String, PdfError> {
    match result {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => Err(on_failure(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PdfError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(PdfError::Io(e)),
    }
}

fn check_cmd_status(
    result: std::io::Result<ExitStatus>,
    tool_name: &str,
    error_msg: &str,
) -> Result<(), PdfError> {
    match result {
        Ok(s) if s.success() => Ok(()),
        Ok(_) => Err(PdfError::OpenFailed(error_msg.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PdfError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(PdfError::Io(e)),
    }
}

/// Read the `Pages:` line of `pdfinfo` output.
pub fn parse_page_count(info: &str) -> Option<u32> {
    info.lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|s| s.trim().parse().ok())
}

/// Find the image file pdftoppm wrote for `page_num`.
///
/// pdftoppm pads the page number to the width of the last page number, so
/// page 1 may be `page-1.png`, `page-01.png`, `page-001.png`, ...
pub fn find_page_image(dir: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let path = dir.join(format!("page-{:0width$}.png", page_num, width = digits));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// PDF collaborator backed by the poppler command line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopplerPdf;

impl PopplerPdf {
    pub fn new() -> Self {
        Self
    }
}

impl PdfReader for PopplerPdf {
    fn page_count(&self, path: &Path) -> Result<u32, PdfError> {
        let output = Command::new("pdfinfo").arg(path).output();
        let info = handle_cmd_output(output, PDFINFO, |stderr| {
            PdfError::OpenFailed(format!("{}: {}", path.display(), stderr))
        })?;
        parse_page_count(&info).ok_or_else(|| {
            PdfError::OpenFailed(format!("{}: no page count reported", path.display()))
        })
    }

    fn page_text(&self, path: &Path, page: u32) -> Result<String, PdfError> {
        let page_str = page.to_string();
        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(path)
            .arg("-")
            .output();
        handle_cmd_output(output, PDFTOTEXT, |stderr| {
            PdfError::ExtractionFailed(format!("pdftotext failed on page {}: {}", page, stderr))
        })
    }
}

impl PdfRasterizer for PopplerPdf {
    fn rasterize(&self, path: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>, PdfError> {
        let page_count = self.page_count(path)?;
        let dpi_str = dpi.to_string();

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi_str])
            .arg(path)
            .arg(out_dir.join("page"))
            .status();
        check_cmd_status(
            status,
            PDFTOPPM,
            &format!("pdftoppm failed to convert {}", path.display()),
        )?;

        let mut pages = Vec::with_capacity(page_count as usize);
        for page in 1..=page_count {
            let image = find_page_image(out_dir, page).ok_or_else(|| {
                PdfError::ExtractionFailed(format!("No image generated for page {}", page))
            })?;
            pages.push(image);
        }
        debug!("Rasterized {} pages at {} DPI", pages.len(), dpi);
        Ok(pages)
    }
}
