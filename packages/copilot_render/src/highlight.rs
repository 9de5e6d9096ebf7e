// =============================================================================
// Syntax highlighting (tree-sitter)
// =============================================================================

use std::ops::Range;

use tree_sitter::{Language, Node, Parser};
use tree_sitter_language::LanguageFn;

/// Token classes a code block is coloured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    String,
    Comment,
    Number,
    Constant,
    Type,
}

/// A classified byte range of the highlighted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub range: Range<usize>,
    pub kind: TokenKind,
}

/// Map a fenced code block info string (```` ```rust ````) to a tree-sitter language.
///
/// Only the first word is considered, case-insensitively, so
/// `"Python title=x.py"` and `"rust,ignore"` both resolve.
pub fn language_for_fence(info: &str) -> Option<Language> {
    let tag = info
        .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    let lang_fn: LanguageFn = match tag.as_str() {
        "rust" | "rs" => tree_sitter_rust::LANGUAGE,
        "javascript" | "js" | "jsx" | "mjs" | "cjs" => tree_sitter_javascript::LANGUAGE,
        "typescript" | "ts" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
        "tsx" => tree_sitter_typescript::LANGUAGE_TSX,
        "python" | "py" | "pyi" => tree_sitter_python::LANGUAGE,
        "go" | "golang" => tree_sitter_go::LANGUAGE,
        "json" => tree_sitter_json::LANGUAGE,
        "toml" => tree_sitter_toml_ng::LANGUAGE,
        "css" => tree_sitter_css::LANGUAGE,
        "html" | "htm" | "svelte" => tree_sitter_html::LANGUAGE,
        "bash" | "sh" | "shell" | "zsh" => tree_sitter_bash::LANGUAGE,
        _ => return None,
    };
    Some(lang_fn.into())
}

/// Parse `source` and return non-overlapping highlights in document order.
///
/// A parser failure yields no highlights; the block is then shown unstyled.
pub fn highlight(source: &str, language: &Language) -> Vec<Highlight> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(language) {
        tracing::debug!(error = %e, "incompatible tree-sitter language");
        return Vec::new();
    }
    let Some(tree) = parser.parse(source, None) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect(tree.root_node(), &mut out);
    out
}

/// Classified nodes are taken whole; their children are not visited, which is
/// what keeps the output free of overlaps.
fn collect(node: Node<'_>, out: &mut Vec<Highlight>) {
    if let Some(kind) = classify(&node) {
        if node.start_byte() < node.end_byte() {
            out.push(Highlight {
                range: node.start_byte()..node.end_byte(),
                kind,
            });
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(child, out);
    }
}

fn classify(node: &Node<'_>) -> Option<TokenKind> {
    let kind = node.kind();
    if kind.contains("comment") {
        return Some(TokenKind::Comment);
    }
    if kind.contains("string")
        || kind == "char_literal"
        || kind == "attribute_value"
        || kind == "quoted_attribute_value"
    {
        return Some(TokenKind::String);
    }
    match kind {
        "integer_literal" | "float_literal" | "int_literal" | "integer" | "float"
        | "integer_value" | "float_value" => Some(TokenKind::Number),
        _ if kind.contains("number") => Some(TokenKind::Number),
        "boolean_literal" | "boolean" | "true" | "false" | "null" | "nil" | "none"
        | "undefined" => Some(TokenKind::Constant),
        "type_identifier" | "primitive_type" | "predefined_type" | "tag_name" => {
            Some(TokenKind::Type)
        }
        _ if !node.is_named() && is_keyword_like(kind) => Some(TokenKind::Keyword),
        _ => None,
    }
}

/// Anonymous nodes spelled as lowercase words are the grammar's keywords
/// (`fn`, `def`, `return`); punctuation never matches.
fn is_keyword_like(kind: &str) -> bool {
    kind.len() > 1 && kind.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_of(source: &str, fence: &str) -> Vec<(String, TokenKind)> {
        let lang = language_for_fence(fence).unwrap();
        highlight(source, &lang)
            .into_iter()
            .map(|h| (source[h.range].to_string(), h.kind))
            .collect()
    }

    #[test]
    fn known_fences_resolve() {
        for fence in [
            "rust", "rs", "js", "javascript", "ts", "tsx", "py", "python", "go", "json",
            "toml", "css", "html", "bash", "sh",
        ] {
            assert!(language_for_fence(fence).is_some(), "expected language for {fence}");
        }
    }

    #[test]
    fn fence_is_case_insensitive_and_takes_first_word() {
        assert!(language_for_fence("Rust").is_some());
        assert!(language_for_fence("rust,ignore").is_some());
        assert!(language_for_fence("python title=x.py").is_some());
    }

    #[test]
    fn unknown_fences_do_not_resolve() {
        assert!(language_for_fence("").is_none());
        assert!(language_for_fence("brainfuck").is_none());
        assert!(language_for_fence("md").is_none());
    }

    #[test]
    fn rust_keywords_strings_and_comments() {
        let tokens = kinds_of("fn main() { let s = \"hi\"; // note\n}", "rust");
        assert!(tokens.contains(&("fn".to_string(), TokenKind::Keyword)));
        assert!(tokens.contains(&("let".to_string(), TokenKind::Keyword)));
        assert!(tokens.contains(&("\"hi\"".to_string(), TokenKind::String)));
        assert!(
            tokens
                .iter()
                .any(|(text, kind)| *kind == TokenKind::Comment && text.trim_end() == "// note")
        );
    }

    #[test]
    fn rust_numbers_types_and_booleans() {
        let tokens = kinds_of("let x: u32 = 42; let y = true;", "rust");
        assert!(tokens.contains(&("u32".to_string(), TokenKind::Type)));
        assert!(tokens.contains(&("42".to_string(), TokenKind::Number)));
        assert!(tokens.contains(&("true".to_string(), TokenKind::Constant)));
    }

    #[test]
    fn python_def_is_keyword() {
        let tokens = kinds_of("def f():\n    return 1\n", "py");
        assert!(tokens.contains(&("def".to_string(), TokenKind::Keyword)));
        assert!(tokens.contains(&("return".to_string(), TokenKind::Keyword)));
    }

    #[test]
    fn highlights_are_ordered_and_disjoint() {
        let src = "fn a() -> &'static str { \"x\" } // c\nconst N: i64 = 7;";
        let hl = highlight(src, &language_for_fence("rust").unwrap());
        assert!(!hl.is_empty());
        for pair in hl.windows(2) {
            assert!(pair[0].range.end <= pair[1].range.start);
        }
    }

    #[test]
    fn punctuation_is_not_a_keyword() {
        assert!(!is_keyword_like("{"));
        assert!(!is_keyword_like("->"));
        assert!(!is_keyword_like("x"));
        assert!(is_keyword_like("return"));
        assert!(is_keyword_like("else_if"));
    }
}
