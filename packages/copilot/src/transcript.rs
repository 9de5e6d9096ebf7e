//! Append-only display history.

use copilot_render::{MarkdownRenderer, Renderer};
use ratatui::text::Line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Received from the server.
    Inbound,
    /// Typed locally and echoed after sending.
    Echo,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub origin: Origin,
    /// The text exactly as it was handed to the renderer.
    pub source: String,
    pub lines: Vec<Line<'static>>,
}

/// Entries are rendered once, when appended, and never touched again.
pub struct Transcript {
    renderer: Box<dyn Renderer + Send>,
    entries: Vec<Entry>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::with_renderer(MarkdownRenderer::default())
    }

    pub fn with_renderer(renderer: impl Renderer + Send + 'static) -> Self {
        Self {
            renderer: Box::new(renderer),
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, origin: Origin, text: &str) -> &Entry {
        let lines = self.renderer.render(text);
        self.entries.push(Entry {
            origin,
            source: text.to_string(),
            lines,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
