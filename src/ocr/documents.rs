//! Document kinds and native text extraction for non-PDF formats.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::extractor::ExtractionError;

/// Kind of an input document, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Doc,
    Docx,
    PlainText,
    Image,
}

impl DocumentKind {
    /// Case-insensitive extension lookup.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "doc" => Some(DocumentKind::Doc),
            "docx" => Some(DocumentKind::Docx),
            "txt" | "text" | "md" => Some(DocumentKind::PlainText),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => {
                Some(DocumentKind::Image)
            }
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Kinds whose text is read natively, without the PDF or OCR path.
    pub fn is_text_document(&self) -> bool {
        matches!(
            self,
            DocumentKind::Doc | DocumentKind::Docx | DocumentKind::PlainText
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Doc => "doc",
            DocumentKind::Docx => "docx",
            DocumentKind::PlainText => "text",
            DocumentKind::Image => "image",
        }
    }
}

/// An input file. The pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Infer the kind from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ExtractionError> {
        let path = path.into();
        let kind = DocumentKind::from_path(&path).ok_or_else(|| {
            ExtractionError::UnsupportedFileType(
                path.extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string()),
            )
        })?;
        Ok(Self { path, kind })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Native text extraction for DOC, DOCX and plain text.
pub trait DocumentTextExtractor: Send + Sync {
    fn extract_text(&self, document: &Document) -> Result<String, ExtractionError>;
}

/// Default extractor: plain text read lossily, DOCX unpacked with `zip`,
/// DOC through `antiword`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatExtractor;

impl FormatExtractor {
    pub fn new() -> Self {
        Self
    }

    fn read_plain_text(path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_docx(path: &Path) -> Result<String, ExtractionError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| {
            ExtractionError::DocumentOpen(format!("{}: {}", path.display(), e))
        })?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| {
                ExtractionError::DocumentOpen(format!(
                    "{}: missing word/document.xml ({})",
                    path.display(),
                    e
                ))
            })?
            .read_to_string(&mut xml)?;
        Ok(docx_xml_to_text(&xml))
    }

    fn read_doc(path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new("antiword")
            .args(["-m", "UTF-8.txt"])
            .arg(path)
            .output();
        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => Err(ExtractionError::ExtractionFailed(format!(
                "antiword failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                ExtractionError::ToolNotFound("antiword (install antiword)".to_string()),
            ),
            Err(e) => Err(ExtractionError::Io(e)),
        }
    }
}

impl DocumentTextExtractor for FormatExtractor {
    fn extract_text(&self, document: &Document) -> Result<String, ExtractionError> {
        debug!("Reading {} as {}", document.path.display(), document.kind.as_str());
        match document.kind {
            DocumentKind::PlainText => Self::read_plain_text(&document.path),
            DocumentKind::Docx => Self::read_docx(&document.path),
            DocumentKind::Doc => Self::read_doc(&document.path),
            other => Err(ExtractionError::UnsupportedFileType(
                other.as_str().to_string(),
            )),
        }
    }
}

/// Flatten WordprocessingML body text: one line per paragraph.
///
/// Only `w:t` runs are emitted, so field instructions (`w:instrText`) and
/// tracked deletions (`w:delText`) stay out of the text. Tab stop
/// definitions inside `w:tabs` are not tabs.
pub fn docx_xml_to_text(xml: &str) -> String {
    let mut text = String::new();
    let mut reader = Reader::from_str(xml);
    let mut in_text = false;
    let mut in_tab_stops = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tabs" => in_tab_stops = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" if !in_tab_stops => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => match e.unescape() {
                Ok(chunk) => text.push_str(&chunk),
                Err(err) => {
                    debug!("Keeping undecodable text run as-is: {}", err);
                    text.push_str(&String::from_utf8_lossy(e));
                }
            },
            Ok(Event::CData(ref e)) if in_text => text.push_str(&String::from_utf8_lossy(e)),
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"tabs" => in_tab_stops = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    "Malformed document.xml at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
    }

    text.trim_end().to_string()
}
