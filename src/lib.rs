//! doctext - turn uploaded documents into plain text.
//!
//! PDFs are classified as text-based or scanned; scanned pages and images go
//! through image preprocessing and one or more OCR engines, whose candidate
//! transcripts are reconciled into a single text.

pub mod config;
pub mod ocr;
