//! Markdown to styled terminal lines.
//!
//! Parsing is done by [pulldown-cmark]; this module only walks the event
//! stream and keeps a small style stack. Fenced code blocks are handed to
//! [`crate::highlight`] when their fence names a known language.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use tree_sitter::Language;

use crate::Renderer;
use crate::highlight::{Highlight, TokenKind, highlight, language_for_fence};
use crate::sanitize::sanitize;

const CODE_INDENT: &str = "  ";
const QUOTE_PREFIX: &str = "│ ";

/// Styles applied to each Markdown element and code token class.
#[derive(Debug, Clone)]
pub struct MarkdownTheme {
    pub headings: [Style; 6],
    pub code_inline: Style,
    pub code_block: Style,
    pub blockquote: Style,
    pub link: Style,
    pub link_url: Style,
    pub emphasis: Style,
    pub strong: Style,
    pub strikethrough: Style,
    pub list_bullet: Style,
    pub horizontal_rule: Style,
    pub html: Style,
    pub keyword: Style,
    pub string: Style,
    pub comment: Style,
    pub number: Style,
    pub constant: Style,
    pub type_name: Style,
}

impl Default for MarkdownTheme {
    fn default() -> Self {
        let bold = Style::new().add_modifier(Modifier::BOLD);
        Self {
            headings: [
                bold.fg(Color::Rgb(255, 255, 255)),
                bold.fg(Color::Rgb(200, 200, 255)),
                bold.fg(Color::Rgb(180, 180, 230)),
                bold.fg(Color::Rgb(160, 160, 210)),
                bold.fg(Color::Rgb(140, 140, 190)),
                bold.fg(Color::Rgb(120, 120, 170)),
            ],
            code_inline: Style::new().fg(Color::Rgb(230, 180, 80)),
            code_block: Style::new().fg(Color::Rgb(200, 200, 200)),
            blockquote: Style::new()
                .fg(Color::Rgb(150, 150, 150))
                .add_modifier(Modifier::ITALIC),
            link: Style::new()
                .fg(Color::Rgb(100, 150, 255))
                .add_modifier(Modifier::UNDERLINED),
            link_url: Style::new().add_modifier(Modifier::DIM),
            emphasis: Style::new().add_modifier(Modifier::ITALIC),
            strong: bold,
            strikethrough: Style::new().add_modifier(Modifier::CROSSED_OUT),
            list_bullet: Style::new().fg(Color::Rgb(180, 180, 100)),
            horizontal_rule: Style::new()
                .fg(Color::Rgb(100, 100, 100))
                .add_modifier(Modifier::DIM),
            html: Style::new().add_modifier(Modifier::DIM),
            keyword: Style::new().fg(Color::Rgb(198, 120, 221)),
            string: Style::new().fg(Color::Rgb(152, 195, 121)),
            comment: Style::new()
                .fg(Color::Rgb(92, 99, 112))
                .add_modifier(Modifier::ITALIC),
            number: Style::new().fg(Color::Rgb(209, 154, 102)),
            constant: Style::new().fg(Color::Rgb(86, 182, 194)),
            type_name: Style::new().fg(Color::Rgb(229, 192, 123)),
        }
    }
}

impl MarkdownTheme {
    pub fn token(&self, kind: TokenKind) -> Style {
        match kind {
            TokenKind::Keyword => self.keyword,
            TokenKind::String => self.string,
            TokenKind::Comment => self.comment,
            TokenKind::Number => self.number,
            TokenKind::Constant => self.constant,
            TokenKind::Type => self.type_name,
        }
    }

    fn heading(&self, level: HeadingLevel) -> Style {
        let idx = match level {
            HeadingLevel::H1 => 0,
            HeadingLevel::H2 => 1,
            HeadingLevel::H3 => 2,
            HeadingLevel::H4 => 3,
            HeadingLevel::H5 => 4,
            HeadingLevel::H6 => 5,
        };
        self.headings[idx]
    }
}

/// Renders sanitised Markdown into lines of styled spans.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    theme: MarkdownTheme,
    rule_width: u16,
}

impl MarkdownRenderer {
    pub fn new(theme: MarkdownTheme) -> Self {
        Self {
            theme,
            rule_width: 40,
        }
    }

    /// Set the width for horizontal rules.
    #[must_use]
    pub fn rule_width(mut self, width: u16) -> Self {
        self.rule_width = width;
        self
    }

    pub fn theme(&self) -> &MarkdownTheme {
        &self.theme
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(MarkdownTheme::default())
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, text: &str) -> Vec<Line<'static>> {
        let clean = sanitize(text);
        let options =
            Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
        let mut state = RenderState::new(&self.theme, self.rule_width);
        state.process(Parser::new_ext(&clean, options));
        state.finish()
    }
}

// ---------------------------------------------------------------------------
// Internal render state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum StyleContext {
    Heading(HeadingLevel),
    Emphasis,
    Strong,
    Strikethrough,
    Blockquote,
    Link,
}

#[derive(Debug, Clone)]
struct ListState {
    ordered: bool,
    next_number: u64,
}

/// Link target plus the span index its visible text starts at.
struct OpenLink {
    url: String,
    first_span: usize,
}

struct CodeBlock {
    language: Option<Language>,
    text: String,
}

struct RenderState<'t> {
    theme: &'t MarkdownTheme,
    rule_width: u16,
    lines: Vec<Line<'static>>,
    current_spans: Vec<Span<'static>>,
    style_stack: Vec<StyleContext>,
    list_stack: Vec<ListState>,
    links: Vec<OpenLink>,
    code_block: Option<CodeBlock>,
    blockquote_depth: usize,
    needs_blank: bool,
    /// Only the list bullet is pending on the current line.
    item_start: bool,
    /// Cells already emitted in the current table row.
    table_cells: usize,
}

impl<'t> RenderState<'t> {
    fn new(theme: &'t MarkdownTheme, rule_width: u16) -> Self {
        Self {
            theme,
            rule_width,
            lines: Vec::new(),
            current_spans: Vec::new(),
            style_stack: Vec::new(),
            list_stack: Vec::new(),
            links: Vec::new(),
            code_block: None,
            blockquote_depth: 0,
            needs_blank: false,
            item_start: false,
            table_cells: 0,
        }
    }

    fn process<'a>(&mut self, parser: impl Iterator<Item = Event<'a>>) {
        for event in parser {
            match event {
                Event::Start(tag) => self.start_tag(tag),
                Event::End(tag) => self.end_tag(tag),
                Event::Text(text) => self.text(&text),
                Event::Code(code) => {
                    self.push_span(Span::styled(format!("`{code}`"), self.theme.code_inline))
                }
                Event::InlineMath(math) | Event::DisplayMath(math) => {
                    self.push_span(Span::styled(math.to_string(), self.theme.code_inline))
                }
                Event::Html(html) | Event::InlineHtml(html) => self.html(&html),
                Event::SoftBreak => self.push_span(Span::raw(" ")),
                Event::HardBreak => self.flush_line(),
                Event::Rule => self.horizontal_rule(),
                Event::TaskListMarker(done) => {
                    let marker = if done { "[x] " } else { "[ ] " };
                    self.push_span(Span::styled(marker, self.theme.list_bullet));
                }
                Event::FootnoteReference(label) => {
                    self.push_span(Span::styled(format!("[^{label}]"), self.theme.link_url))
                }
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_blank();
                self.style_stack.push(StyleContext::Heading(level));
            }
            // Loose list items wrap their text in paragraphs; keep it beside the bullet.
            Tag::Paragraph if self.item_start => {}
            Tag::Paragraph if !self.list_stack.is_empty() => self.flush_line(),
            Tag::Paragraph | Tag::HtmlBlock => self.flush_blank(),
            Tag::Emphasis => self.style_stack.push(StyleContext::Emphasis),
            Tag::Strong => self.style_stack.push(StyleContext::Strong),
            Tag::Strikethrough => self.style_stack.push(StyleContext::Strikethrough),
            Tag::CodeBlock(kind) => {
                self.flush_blank();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => language_for_fence(&info),
                    CodeBlockKind::Indented => None,
                };
                self.code_block = Some(CodeBlock {
                    language,
                    text: String::new(),
                });
            }
            Tag::BlockQuote(_) => {
                self.flush_blank();
                self.blockquote_depth += 1;
                self.style_stack.push(StyleContext::Blockquote);
            }
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.links.push(OpenLink {
                    url: dest_url.to_string(),
                    first_span: self.current_spans.len(),
                });
                self.style_stack.push(StyleContext::Link);
            }
            Tag::List(start) => self.list_stack.push(ListState {
                ordered: start.is_some(),
                next_number: start.unwrap_or(0),
            }),
            Tag::Item => {
                self.flush_line();
                let prefix = self.list_prefix();
                let indent = "  ".repeat(self.list_stack.len().saturating_sub(1));
                self.push_span(Span::styled(
                    format!("{indent}{prefix}"),
                    self.theme.list_bullet,
                ));
                self.item_start = true;
            }
            Tag::Table(_) => self.flush_blank(),
            Tag::TableHead | Tag::TableRow => self.table_cells = 0,
            Tag::TableCell => {
                if self.table_cells > 0 {
                    self.push_span(Span::raw(" | "));
                }
                self.table_cells += 1;
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.style_stack.pop();
                self.flush_line();
                self.needs_blank = true;
            }
            TagEnd::Paragraph => {
                self.flush_line();
                self.needs_blank = self.list_stack.is_empty();
            }
            TagEnd::HtmlBlock => {
                self.flush_line();
                self.needs_blank = true;
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.style_stack.pop();
            }
            TagEnd::CodeBlock => {
                if let Some(block) = self.code_block.take() {
                    self.flush_code_block(block);
                }
                self.needs_blank = true;
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.style_stack.pop();
                self.blockquote_depth = self.blockquote_depth.saturating_sub(1);
                self.needs_blank = true;
            }
            TagEnd::Link | TagEnd::Image => {
                self.style_stack.pop();
                self.close_link();
            }
            TagEnd::List(_) => {
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.flush_line();
                    self.needs_blank = true;
                }
            }
            TagEnd::Item | TagEnd::TableHead | TagEnd::TableRow => self.flush_line(),
            TagEnd::Table => {
                self.flush_line();
                self.needs_blank = true;
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(block) = self.code_block.as_mut() {
            block.text.push_str(text);
            return;
        }
        let style = self.current_style();
        self.push_span(Span::styled(text.to_string(), style));
    }

    fn html(&mut self, html: &str) {
        for piece in html.split_inclusive('\n') {
            let content = piece.trim_end_matches('\n');
            if !content.is_empty() {
                self.push_span(Span::styled(content.to_string(), self.theme.html));
            }
            if piece.ends_with('\n') {
                self.flush_line();
            }
        }
    }

    fn horizontal_rule(&mut self) {
        self.flush_blank();
        let rule = "─".repeat(self.rule_width as usize);
        self.lines
            .push(Line::styled(rule, self.theme.horizontal_rule));
        self.needs_blank = true;
    }

    /// Append the target after the link text unless the text already is the URL.
    fn close_link(&mut self) {
        let Some(link) = self.links.pop() else {
            return;
        };
        if link.url.is_empty() {
            return;
        }
        let shown: String = self
            .current_spans
            .get(link.first_span..)
            .unwrap_or_default()
            .iter()
            .map(|s| s.content.as_ref())
            .collect();
        if shown.trim() != link.url {
            self.push_span(Span::styled(format!(" ({})", link.url), self.theme.link_url));
        }
    }

    fn flush_code_block(&mut self, block: CodeBlock) {
        let source = block.text.strip_suffix('\n').unwrap_or(&block.text);
        let highlights = block
            .language
            .as_ref()
            .map(|lang| highlight(source, lang))
            .unwrap_or_default();

        let mut offset = 0;
        for row in source.split('\n') {
            let range = offset..offset + row.len();
            offset = range.end + 1;

            let mut spans = self.quote_prefix();
            spans.push(Span::raw(CODE_INDENT));
            spans.extend(code_spans(source, range, &highlights, self.theme));
            self.lines.push(Line::from(spans));
        }
    }

    // -- helpers --

    fn push_span(&mut self, span: Span<'static>) {
        self.item_start = false;
        if self.current_spans.is_empty() {
            self.current_spans = self.quote_prefix();
        }
        self.current_spans.push(span);
    }

    fn quote_prefix(&self) -> Vec<Span<'static>> {
        if self.blockquote_depth == 0 {
            return Vec::new();
        }
        vec![Span::styled(
            QUOTE_PREFIX.repeat(self.blockquote_depth),
            self.theme.blockquote,
        )]
    }

    fn current_style(&self) -> Style {
        self.style_stack
            .iter()
            .fold(Style::default(), |acc, ctx| {
                let s = match ctx {
                    StyleContext::Heading(level) => self.theme.heading(*level),
                    StyleContext::Emphasis => self.theme.emphasis,
                    StyleContext::Strong => self.theme.strong,
                    StyleContext::Strikethrough => self.theme.strikethrough,
                    StyleContext::Blockquote => self.theme.blockquote,
                    StyleContext::Link => self.theme.link,
                };
                acc.patch(s)
            })
    }

    fn list_prefix(&mut self) -> String {
        match self.list_stack.last_mut() {
            Some(list) if list.ordered => {
                let n = list.next_number;
                list.next_number += 1;
                format!("{n}. ")
            }
            _ => String::from("• "),
        }
    }

    fn flush_line(&mut self) {
        if !self.current_spans.is_empty() {
            let spans = std::mem::take(&mut self.current_spans);
            self.lines.push(Line::from(spans));
        }
    }

    fn flush_blank(&mut self) {
        self.flush_line();
        if self.needs_blank && !self.lines.is_empty() {
            self.lines.push(Line::default());
        }
        self.needs_blank = false;
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush_line();
        self.lines
    }
}

/// Split one source row into spans, clipping highlights to the row.
fn code_spans(
    source: &str,
    row: std::ops::Range<usize>,
    highlights: &[Highlight],
    theme: &MarkdownTheme,
) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut pos = row.start;
    let mut push = |range: std::ops::Range<usize>, style: Style| {
        if let Some(text) = source.get(range) {
            if !text.is_empty() {
                spans.push(Span::styled(text.to_string(), style));
            }
        }
    };

    for hl in highlights
        .iter()
        .filter(|h| h.range.start < row.end && h.range.end > row.start)
    {
        let start = hl.range.start.max(row.start);
        let end = hl.range.end.min(row.end);
        if start > pos {
            push(pos..start, theme.code_block);
        }
        push(start..end, theme.code_block.patch(theme.token(hl.kind)));
        pos = end;
    }
    if pos < row.end {
        push(pos..row.end, theme.code_block);
    }
    spans
}
