//! Choosing one transcript out of several engines' output.

use super::backend::OcrBackendType;

/// Non-empty text produced by one engine for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineText {
    pub engine: OcrBackendType,
    pub text: String,
}

impl EngineText {
    pub fn new(engine: OcrBackendType, text: impl Into<String>) -> Self {
        Self {
            engine,
            text: text.into(),
        }
    }

    /// Length in characters, not bytes; Vietnamese text is mostly multi-byte.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Reconciles candidate transcripts of the same image.
///
/// Engines listed in `preferred` win outright, in list order, once their
/// output is longer than `min_preferred_chars`. Otherwise the longest
/// candidate wins; on equal length the candidate that comes first (engine
/// priority order) is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub preferred: Vec<OcrBackendType>,
    pub min_preferred_chars: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            preferred: vec![OcrBackendType::PaddleOcr],
            min_preferred_chars: 50,
        }
    }
}

impl SelectionPolicy {
    pub fn new(preferred: Vec<OcrBackendType>, min_preferred_chars: usize) -> Self {
        Self {
            preferred,
            min_preferred_chars,
        }
    }

    /// Pick the best candidate. `candidates` must be in engine priority order.
    pub fn select<'a>(&self, candidates: &'a [EngineText]) -> Option<&'a EngineText> {
        for engine in &self.preferred {
            if let Some(candidate) = candidates
                .iter()
                .find(|c| c.engine == *engine && c.char_len() > self.min_preferred_chars)
            {
                return Some(candidate);
            }
        }

        let mut best: Option<&EngineText> = None;
        for candidate in candidates {
            match best {
                Some(current) if candidate.char_len() <= current.char_len() => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}
