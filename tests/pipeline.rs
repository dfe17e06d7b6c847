//! End-to-end behaviour of the extraction pipeline with fake engines and
//! fake PDF collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GrayImage, Luma};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use doctext::ocr::{
    Document, DocumentKind, EngineRegistry, ExtractOptions, ExtractionError, ExtractionMethod,
    ImageInput, OcrBackend, OcrBackendType, OcrError, OcrResult, PdfError, PdfRasterizer,
    PdfReader, Preprocessor, SelectionPolicy, TextExtractor, TextRegion, CANCELLED_REASON,
};

/// Reports which page it saw: pages are rendered 10px wide per page number.
struct PageEcho {
    engine: OcrBackendType,
    label: &'static str,
}

impl OcrBackend for PageEcho {
    fn backend_type(&self) -> OcrBackendType {
        self.engine
    }
    fn probe(&self) -> Result<String, OcrError> {
        Ok(format!("{} test engine", self.label))
    }
    fn availability_hint(&self) -> String {
        String::new()
    }
    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        Ok(OcrResult::from_text(
            format!("{} page {}", self.label, image.width() / 10),
            self.engine,
            Instant::now(),
        ))
    }
}

/// Returns the same regions for every image.
struct Regions {
    engine: OcrBackendType,
    regions: Vec<TextRegion>,
}

impl OcrBackend for Regions {
    fn backend_type(&self) -> OcrBackendType {
        self.engine
    }
    fn probe(&self) -> Result<String, OcrError> {
        Ok("regions".to_string())
    }
    fn availability_hint(&self) -> String {
        String::new()
    }
    fn recognize(&self, _image: &GrayImage) -> Result<OcrResult, OcrError> {
        Ok(OcrResult::from_regions(
            self.regions.clone(),
            self.engine,
            Instant::now(),
        ))
    }
}

/// Echoes pages like [`PageEcho`] but panics on one of them.
struct PanicsOnPage {
    page: u32,
}

impl OcrBackend for PanicsOnPage {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }
    fn probe(&self) -> Result<String, OcrError> {
        Ok("flaky".to_string())
    }
    fn availability_hint(&self) -> String {
        String::new()
    }
    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        let page = image.width() / 10;
        if page == self.page {
            panic!("native library crashed on page {}", page);
        }
        Ok(OcrResult::from_text(
            format!("flaky page {}", page),
            OcrBackendType::Tesseract,
            Instant::now(),
        ))
    }
}

/// Echoes the page, then cancels the job it is running in.
struct CancelsAfterFirstPage {
    token: CancellationToken,
}

impl OcrBackend for CancelsAfterFirstPage {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }
    fn probe(&self) -> Result<String, OcrError> {
        Ok("cancelling".to_string())
    }
    fn availability_hint(&self) -> String {
        String::new()
    }
    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        self.token.cancel();
        Ok(OcrResult::from_text(
            format!("page {}", image.width() / 10),
            OcrBackendType::Tesseract,
            Instant::now(),
        ))
    }
}

struct Unavailable;

impl OcrBackend for Unavailable {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::PaddleOcr
    }
    fn probe(&self) -> Result<String, OcrError> {
        Err(OcrError::ModelNotFound("det model".to_string()))
    }
    fn availability_hint(&self) -> String {
        "download the models".to_string()
    }
    fn recognize(&self, _image: &GrayImage) -> Result<OcrResult, OcrError> {
        Err(OcrError::BackendNotAvailable("never probed".to_string()))
    }
}

/// In-memory PDF: `None` pages fail native extraction.
struct FakePdf {
    texts: Vec<Option<String>>,
    fail_raster: bool,
    /// Page whose rendered image is written as garbage bytes.
    corrupt_page: Option<usize>,
    raster_calls: AtomicUsize,
}

impl FakePdf {
    fn new(texts: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            texts: texts.into_iter().map(|t| t.map(str::to_string)).collect(),
            fail_raster: false,
            corrupt_page: None,
            raster_calls: AtomicUsize::new(0),
        })
    }

    fn scanned(pages: usize) -> Arc<Self> {
        Self::new(vec![Some(""); pages])
    }

    fn scanned_with_corrupt_page(pages: usize, corrupt: usize) -> Arc<Self> {
        Arc::new(Self {
            texts: vec![Some(String::new()); pages],
            fail_raster: false,
            corrupt_page: Some(corrupt),
            raster_calls: AtomicUsize::new(0),
        })
    }

    fn damaged() -> Arc<Self> {
        Arc::new(Self {
            texts: Vec::new(),
            fail_raster: true,
            corrupt_page: None,
            raster_calls: AtomicUsize::new(0),
        })
    }
}

impl PdfReader for FakePdf {
    fn page_count(&self, _path: &Path) -> Result<u32, PdfError> {
        if self.fail_raster {
            return Err(PdfError::OpenFailed("damaged xref table".to_string()));
        }
        Ok(self.texts.len() as u32)
    }

    fn page_text(&self, _path: &Path, page: u32) -> Result<String, PdfError> {
        self.texts
            .get(page as usize - 1)
            .cloned()
            .flatten()
            .ok_or_else(|| PdfError::ExtractionFailed(format!("page {}", page)))
    }
}

impl PdfRasterizer for FakePdf {
    fn rasterize(&self, _path: &Path, _dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>, PdfError> {
        self.raster_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_raster {
            return Err(PdfError::OpenFailed("damaged xref table".to_string()));
        }
        (1..=self.texts.len())
            .map(|page| {
                let path = out_dir.join(format!("page-{:02}.png", page));
                if self.corrupt_page == Some(page) {
                    std::fs::write(&path, b"\x89PNG truncated").unwrap();
                } else {
                    write_page(&path, page);
                }
                Ok(path)
            })
            .collect()
    }
}

fn write_page(path: &Path, page: usize) {
    GrayImage::from_pixel(10 * page as u32, 20, Luma([255]))
        .save(path)
        .unwrap();
}

fn registry(backends: Vec<Arc<dyn OcrBackend>>) -> Arc<EngineRegistry> {
    Arc::new(EngineRegistry::probe_all(
        backends,
        &Preprocessor::default(),
        0.5,
    ))
}

fn tesseract_echo() -> Arc<dyn OcrBackend> {
    Arc::new(PageEcho {
        engine: OcrBackendType::Tesseract,
        label: "tesseract",
    })
}

fn extractor_for(pdf: &Arc<FakePdf>, backends: Vec<Arc<dyn OcrBackend>>) -> TextExtractor {
    TextExtractor::new(registry(backends))
        .with_pdf_reader(pdf.clone())
        .with_rasterizer(pdf.clone())
}

fn pdf_document() -> Document {
    Document::new("resume.pdf", DocumentKind::Pdf)
}

fn long_line(word: &str) -> String {
    std::iter::repeat(word).take(20).collect::<Vec<_>>().join(" ")
}

#[test]
fn text_pdf_uses_native_text_without_ocr() {
    let first = long_line("Experience");
    let third = long_line("Education");
    let pdf = FakePdf::new(vec![Some(first.as_str()), Some("\u{c}"), Some(third.as_str())]);
    let extractor = extractor_for(&pdf, vec![tesseract_echo()]);

    let extraction = extractor.extract(&pdf_document()).unwrap();

    assert!(!extraction.used_ocr);
    assert_eq!(extraction.method, ExtractionMethod::PdfText);
    assert_eq!(extraction.text, format!("{}\n{}", first, third));
    assert_eq!(extraction.page_count, Some(3));
    assert_eq!(pdf.raster_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn scanned_pdf_is_ocred_in_page_order() {
    let pdf = FakePdf::scanned(3);
    let extractor = extractor_for(&pdf, vec![tesseract_echo()]);

    let extraction = extractor.extract(&pdf_document()).unwrap();

    assert!(extraction.used_ocr);
    assert_eq!(extraction.method, ExtractionMethod::PdfOcr);
    assert_eq!(
        extraction.text,
        "--- Page 1 ---\ntesseract page 1\n\n\
         --- Page 2 ---\ntesseract page 2\n\n\
         --- Page 3 ---\ntesseract page 3\n"
    );
}

#[test]
fn page_order_survives_parallel_engines() {
    let pdf = FakePdf::scanned(4);
    let extractor = extractor_for(
        &pdf,
        vec![
            tesseract_echo(),
            Arc::new(PageEcho {
                engine: OcrBackendType::Ocrs,
                label: "ocrs",
            }) as Arc<dyn OcrBackend>,
        ],
    )
    .with_policy(SelectionPolicy::new(Vec::new(), 50))
    .with_parallel_engines(true);

    let text = extractor.extract(&pdf_document()).unwrap().text;
    let markers: Vec<&str> = text.lines().filter(|l| l.starts_with("---")).collect();
    assert_eq!(
        markers,
        vec![
            "--- Page 1 ---",
            "--- Page 2 ---",
            "--- Page 3 ---",
            "--- Page 4 ---"
        ]
    );
    // "tesseract page N" is longer than "ocrs page N".
    assert!(text.lines().filter(|l| l.starts_with("tesseract")).count() == 4);
}

#[test]
fn failed_native_extraction_falls_back_to_ocr() {
    let good = long_line("Skills");
    let pdf = FakePdf::new(vec![Some(good.as_str()), Some(good.as_str()), None]);
    let extractor = extractor_for(&pdf, vec![tesseract_echo()]);

    let extraction = extractor.extract(&pdf_document()).unwrap();

    assert!(extraction.used_ocr);
    assert_eq!(pdf.raster_calls.load(Ordering::SeqCst), 1);
    assert!(extraction.text.contains("--- Page 3 ---\ntesseract page 3"));
}

#[test]
fn unopenable_pdf_is_a_document_error() {
    let pdf = FakePdf::damaged();
    let extractor = extractor_for(&pdf, vec![tesseract_echo()]);

    let err = extractor.extract(&pdf_document()).unwrap_err();
    assert!(matches!(err, ExtractionError::DocumentOpen(_)));
}

#[test]
fn zero_engines_yield_empty_ocr_text() {
    let pdf = FakePdf::scanned(2);
    let extractor = extractor_for(&pdf, Vec::new());

    let extraction = extractor.extract(&pdf_document()).unwrap();
    assert!(extraction.used_ocr);
    assert_eq!(extraction.text, "");

    let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 20, Luma([255])));
    assert_eq!(extractor.extract_text_from_image(ImageInput::Raster(&page)), "");
}

#[test]
fn preferred_engine_wins_when_long_enough() {
    let paddle_text = "Kỹ năng: Rust, Python, SQL, Docker, Kubernetes, AWS, Linux";
    assert!(paddle_text.chars().count() > 50);
    let tesseract: Arc<dyn OcrBackend> = Arc::new(Regions {
        engine: OcrBackendType::Tesseract,
        regions: vec![TextRegion {
            text: long_line("noise"),
            confidence: 0.9,
        }],
    });
    let paddle: Arc<dyn OcrBackend> = Arc::new(Regions {
        engine: OcrBackendType::PaddleOcr,
        regions: vec![
            TextRegion {
                text: paddle_text.to_string(),
                confidence: 0.95,
            },
            TextRegion {
                text: "???".to_string(),
                confidence: 0.2,
            },
        ],
    });
    let extractor = TextExtractor::new(registry(vec![tesseract, paddle]));

    let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 20, Luma([255])));
    assert_eq!(
        extractor.extract_text_from_image(ImageInput::Raster(&page)),
        paddle_text
    );
}

#[test]
fn unavailable_engine_does_not_block_the_others() {
    let reg = registry(vec![Arc::new(Unavailable) as Arc<dyn OcrBackend>, tesseract_echo()]);
    let status = reg.status();
    assert_eq!(status.engines_count, 1);
    assert!(!status.is_available(OcrBackendType::PaddleOcr));
    assert!(status.is_available(OcrBackendType::Tesseract));

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["paddleocr_available"], false);
    assert_eq!(json["tesseract_available"], true);
    assert_eq!(json["engines_count"], 1);
}

#[test]
fn failing_image_in_batch_becomes_error_block() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("p1.png");
    let broken = dir.path().join("p2.png");
    let third = dir.path().join("p3.png");
    write_page(&first, 1);
    std::fs::write(&broken, b"definitely not a png").unwrap();
    write_page(&third, 3);

    let extractor = TextExtractor::new(registry(vec![tesseract_echo()]));
    let text = extractor.extract_from_images(&[first, broken, third]);

    let markers: Vec<&str> = text.lines().filter(|l| l.starts_with("---")).collect();
    assert_eq!(
        markers,
        vec![
            "--- Page 1 (p1.png) ---",
            "--- Page 2 (Error) ---",
            "--- Page 3 (p3.png) ---"
        ]
    );
    assert!(text.contains("tesseract page 1"));
    assert!(text.contains("Error processing image: "));
    assert!(text.contains("tesseract page 3"));
}

#[test]
fn cancelled_batch_marks_remaining_pages() {
    let dir = TempDir::new().unwrap();
    let pages: Vec<PathBuf> = (1..=2)
        .map(|i| {
            let path = dir.path().join(format!("p{}.png", i));
            write_page(&path, i);
            path
        })
        .collect();

    let token = CancellationToken::new();
    token.cancel();
    let options = ExtractOptions::default().with_cancel(token);
    let extractor = TextExtractor::new(registry(vec![tesseract_echo()]));
    let text = extractor.extract_from_images_with_options(&pages, &options);

    assert_eq!(
        text,
        format!(
            "--- Page 1 (Error) ---\nError processing image: {reason}\n\n\
             --- Page 2 (Error) ---\nError processing image: {reason}\n",
            reason = CANCELLED_REASON
        )
    );
}

#[test]
fn undecodable_pdf_page_becomes_error_block() {
    let pdf = FakePdf::scanned_with_corrupt_page(3, 2);
    let extractor = extractor_for(&pdf, vec![tesseract_echo()]);

    let extraction = extractor.extract(&pdf_document()).unwrap();

    assert!(extraction.used_ocr);
    assert_eq!(extraction.page_count, Some(3));
    let markers: Vec<&str> = extraction
        .text
        .lines()
        .filter(|l| l.starts_with("---"))
        .collect();
    assert_eq!(
        markers,
        vec!["--- Page 1 ---", "--- Page 2 (Error) ---", "--- Page 3 ---"]
    );
    assert!(extraction.text.contains("tesseract page 1"));
    assert!(extraction.text.contains("--- Page 2 (Error) ---\nError processing image: "));
    assert!(extraction.text.contains("tesseract page 3"));
}

#[test]
fn cancellation_mid_pdf_keeps_finished_pages() {
    let pdf = FakePdf::scanned(3);
    let token = CancellationToken::new();
    let engine: Arc<dyn OcrBackend> = Arc::new(CancelsAfterFirstPage {
        token: token.clone(),
    });
    let extractor = extractor_for(&pdf, vec![engine]);
    let options = ExtractOptions::default().with_cancel(token);

    let extraction = extractor
        .extract_with_options(&pdf_document(), &options)
        .unwrap();

    assert_eq!(
        extraction.text,
        format!(
            "--- Page 1 ---\npage 1\n\n\
             --- Page 2 (Error) ---\nError processing image: {reason}\n\n\
             --- Page 3 (Error) ---\nError processing image: {reason}\n",
            reason = CANCELLED_REASON
        )
    );
}

#[test]
fn panicking_engine_only_loses_its_page() {
    let dir = TempDir::new().unwrap();
    let pages: Vec<PathBuf> = (1..=3)
        .map(|i| {
            let path = dir.path().join(format!("p{}.png", i));
            write_page(&path, i);
            path
        })
        .collect();

    let engine: Arc<dyn OcrBackend> = Arc::new(PanicsOnPage { page: 2 });
    let extractor = TextExtractor::new(registry(vec![engine]));
    let text = extractor.extract_from_images(&pages);

    assert_eq!(
        text,
        "--- Page 1 (p1.png) ---\nflaky page 1\n\n--- Page 3 (p3.png) ---\nflaky page 3\n"
    );
}

#[test]
fn panicking_engine_in_parallel_mode_falls_back_to_the_other() {
    let pdf = FakePdf::scanned(2);
    let extractor = extractor_for(
        &pdf,
        vec![
            Arc::new(PanicsOnPage { page: 1 }) as Arc<dyn OcrBackend>,
            Arc::new(PageEcho {
                engine: OcrBackendType::Ocrs,
                label: "ocrs",
            }),
        ],
    )
    .with_parallel_engines(true);

    let text = extractor.extract(&pdf_document()).unwrap().text;
    assert!(text.contains("--- Page 1 ---\nocrs page 1"));
    assert!(text.contains("--- Page 2 ---\n"));
}

#[test]
fn image_document_is_ocred_without_markers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.png");
    write_page(&path, 2);

    let extractor = TextExtractor::new(registry(vec![tesseract_echo()]));
    let document = Document::from_path(&path).unwrap();
    let extraction = extractor.extract(&document).unwrap();

    assert!(extraction.used_ocr);
    assert_eq!(extraction.method, ExtractionMethod::ImageOcr);
    assert_eq!(extraction.text, "tesseract page 2");
}

#[test]
fn text_documents_skip_ocr() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cv.txt");
    std::fs::write(&path, "Họ và tên: Trần Thị B").unwrap();

    let extractor = TextExtractor::new(registry(vec![tesseract_echo()]));
    let extraction = extractor.extract(&Document::from_path(&path).unwrap()).unwrap();

    assert!(!extraction.used_ocr);
    assert_eq!(extraction.method, ExtractionMethod::Document);
    assert_eq!(extraction.text, "Họ và tên: Trần Thị B");
}

#[tokio::test]
async fn async_wrapper_runs_on_blocking_pool() {
    let pdf = FakePdf::scanned(1);
    let extractor = extractor_for(&pdf, vec![tesseract_echo()]);

    let extraction = extractor
        .extract_blocking_async(pdf_document(), ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(extraction.text, "--- Page 1 ---\ntesseract page 1\n");
}
