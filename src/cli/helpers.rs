//! Shared helper functions for CLI commands.

use std::sync::Arc;

use doctext::config::Config;
use doctext::ocr::{EngineRegistry, Preprocessor, TextExtractor};

/// Probe the configured engines off the async runtime.
pub async fn build_registry(config: &Config) -> anyhow::Result<Arc<EngineRegistry>> {
    let settings = config.ocr.clone();
    let preprocessor = Preprocessor::new(config.preprocess.clone());
    let registry = tokio::task::spawn_blocking(move || {
        EngineRegistry::from_settings(&settings, &preprocessor)
    })
    .await?;
    Ok(Arc::new(registry))
}

pub async fn build_extractor(config: &Config) -> anyhow::Result<TextExtractor> {
    let registry = build_registry(config).await?;
    Ok(TextExtractor::from_config(registry, config))
}

/// Truncate a string to `max` characters, marking the cut with "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Nguyễn Văn Anh.pdf", 10), "Nguyễn ...");
    }
}
