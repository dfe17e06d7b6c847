//! Multi-page transcripts with page markers.

/// One page's contribution to a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBlock {
    /// Recognized text.
    Text {
        page: usize,
        label: Option<String>,
        text: String,
    },
    /// The page could not be processed.
    Error { page: usize, reason: String },
}

impl PageBlock {
    pub fn page(&self) -> usize {
        match self {
            PageBlock::Text { page, .. } | PageBlock::Error { page, .. } => *page,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PageBlock::Error { .. })
    }

    fn render_into(&self, lines: &mut Vec<String>) {
        match self {
            PageBlock::Text {
                page,
                label: Some(label),
                text,
            } => {
                lines.push(format!("--- Page {} ({}) ---", page, label));
                lines.push(text.clone());
            }
            PageBlock::Text { page, text, .. } => {
                lines.push(format!("--- Page {} ---", page));
                lines.push(text.clone());
            }
            PageBlock::Error { page, reason } => {
                lines.push(format!("--- Page {} (Error) ---", page));
                lines.push(format!("Error processing image: {}", reason));
            }
        }
        lines.push(String::new());
    }
}

/// Page blocks in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    blocks: Vec<PageBlock>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text block for 1-based `page`; empty text adds nothing.
    pub fn push_page(&mut self, page: usize, text: String) {
        if !text.is_empty() {
            self.blocks.push(PageBlock::Text {
                page,
                label: None,
                text,
            });
        }
    }

    /// Like [`push_page`](Self::push_page) with a label such as a file name.
    pub fn push_labelled(&mut self, page: usize, label: impl Into<String>, text: String) {
        if !text.is_empty() {
            self.blocks.push(PageBlock::Text {
                page,
                label: Some(label.into()),
                text,
            });
        }
    }

    pub fn push_error(&mut self, page: usize, reason: impl Into<String>) {
        self.blocks.push(PageBlock::Error {
            page,
            reason: reason.into(),
        });
    }

    pub fn blocks(&self) -> &[PageBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_error()).count()
    }

    /// Marker line, text, blank line per block; lines joined with `\n`.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.blocks.len() * 3);
        for block in &self.blocks {
            block.render_into(&mut lines);
        }
        lines.join("\n")
    }
}

impl std::fmt::Display for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
