//! Rendering of chat payloads into styled terminal lines.
//!
//! Payloads are untrusted text from the server or the local user. They are
//! sanitised (terminal escapes and control characters stripped), parsed as
//! Markdown, and fenced code blocks are highlighted with tree-sitter when the
//! fence names a known language.

mod highlight;
mod markdown;
mod sanitize;

use ratatui::text::Line;

pub use highlight::{Highlight, TokenKind, highlight, language_for_fence};
pub use markdown::{MarkdownRenderer, MarkdownTheme};
pub use sanitize::sanitize;

/// Converts a raw text payload into displayable lines.
pub trait Renderer {
    fn render(&self, text: &str) -> Vec<Line<'static>>;
}

/// Flatten rendered lines back to unstyled text, one line per row.
pub fn plain_text(lines: &[Line<'_>]) -> String {
    lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
