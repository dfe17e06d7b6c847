//! Text extraction commands.

use std::path::{Path, PathBuf};

use console::style;

use doctext::config::Config;
use doctext::ocr::{Document, ExtractOptions};

use crate::cli::helpers::{build_extractor, truncate};

/// Extract text from a single document.
pub async fn cmd_extract(
    config: &Config,
    file: &Path,
    json: bool,
    options: ExtractOptions,
) -> anyhow::Result<()> {
    let document = Document::from_path(file)?;
    let extractor = build_extractor(config).await?;
    let extraction = extractor.extract_blocking_async(document, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
        return Ok(());
    }

    let source = if extraction.used_ocr {
        style("OCR").yellow()
    } else {
        style("native text").green()
    };
    eprintln!(
        "{} {} ({}, {})",
        style("✓").green(),
        truncate(&file.display().to_string(), 60),
        extraction.method.as_str(),
        source
    );
    if let Some(pages) = extraction.page_count {
        eprintln!("  {:<10} {}", "Pages:", pages);
    }
    eprintln!("  {:<10} {}", "Chars:", extraction.text.chars().count());
    println!("{}", extraction.text);
    Ok(())
}

/// OCR a batch of page images into one labelled transcript.
pub async fn cmd_images(
    config: &Config,
    files: Vec<PathBuf>,
    options: ExtractOptions,
) -> anyhow::Result<()> {
    let extractor = build_extractor(config).await?;
    if !extractor.registry().has_engines() {
        eprintln!(
            "{} No OCR engines available; run `doctext status` for details",
            style("!").yellow()
        );
    }

    let count = files.len();
    let transcript = tokio::task::spawn_blocking(move || {
        extractor.extract_from_images_with_options(&files, &options)
    })
    .await?;

    eprintln!(
        "{} Processed {} images, {} chars",
        style("✓").green(),
        count,
        transcript.chars().count()
    );
    println!("{}", transcript);
    Ok(())
}
