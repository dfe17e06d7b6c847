//! OCR engine status command.

use console::style;

use doctext::config::Config;
use doctext::ocr::{CapabilityReport, FormatSupport};

use crate::cli::helpers::build_registry;

pub async fn cmd_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let registry = build_registry(config).await?;
    let report = CapabilityReport::new(registry.status());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", style("OCR Engines").bold());
    println!("{}", "-".repeat(50));
    for entry in registry.record().entries() {
        let status = if entry.available {
            style("✓ available").green()
        } else {
            style("✗ not available").red()
        };
        println!("  {:<15} {}", entry.engine.display_name(), status);
        println!("                  {}", style(&entry.detail).dim());
    }
    if registry.record().entries().is_empty() {
        println!("  {}", style("no engines configured").dim());
    }

    println!("\n{}", style("Supported Formats:").cyan());
    let formats = &report.supported_formats;
    for (name, support) in [
        ("Text PDFs", formats.text_pdfs),
        ("Image PDFs", formats.image_pdfs),
        ("DOC/DOCX", formats.doc_docx),
        ("Images", formats.images),
    ] {
        let line = match support {
            FormatSupport::RequiresOcrSetup => style(support.describe()).yellow(),
            _ => style(support.describe()).green(),
        };
        println!("  {:<15} {}", name, line);
    }

    println!("\n{}", style("Recommendations:").cyan());
    for recommendation in &report.recommendations {
        println!("  {} {}", style("→").green(), recommendation);
    }
    Ok(())
}
