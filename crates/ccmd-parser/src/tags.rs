use std::sync::OnceLock;

use ccmd_core::{SourceLocation, SourceSpan, TemplateError};
use regex::Regex;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text {
        value: String,
        location: SourceSpan,
    },
    Output {
        expr: String,
        location: SourceSpan,
    },
    If {
        condition: String,
        location: SourceSpan,
    },
    ElseIf {
        condition: String,
        location: SourceSpan,
    },
    Else {
        location: SourceSpan,
    },
    For {
        item: String,
        index: Option<String>,
        iterable: String,
        location: SourceSpan,
    },
    Let {
        name: String,
        expr: String,
        location: SourceSpan,
    },
    End {
        location: SourceSpan,
    },
}

impl TemplateNode {
    pub fn location(&self) -> &SourceSpan {
        match self {
            Self::Text { location, .. }
            | Self::Output { location, .. }
            | Self::If { location, .. }
            | Self::ElseIf { location, .. }
            | Self::Else { location }
            | Self::For { location, .. }
            | Self::Let { location, .. }
            | Self::End { location } => location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTemplate {
    pub nodes: Vec<TemplateNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    IfAfterElse,
    For,
}

/// Splits `source` into literal text and `{{ … }}` tags.
///
/// Tag bodies are kept verbatim; only the block keywords (`if`, `else`,
/// `for`, `let`, `end`) are recognised and checked for balance.
pub fn parse_template(source: &str) -> Result<ParsedTemplate, TemplateError> {
    let lines = LineIndex::new(source);
    let mut nodes = Vec::new();
    let mut blocks: Vec<(BlockKind, SourceSpan)> = Vec::new();
    let mut cursor = 0usize;
    let mut trim_next_text = false;

    while let Some(found) = source[cursor..].find(OPEN) {
        let open = cursor + found;
        let mut body_start = open + OPEN.len();
        let trim_left = has_trim_marker_after(source, body_start);
        if trim_left {
            body_start += 1;
        }

        let mut text = &source[cursor..open];
        if trim_next_text {
            text = text.trim_start();
        }
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            nodes.push(TemplateNode::Text {
                value: text.to_string(),
                location: lines.span(cursor, open),
            });
        }

        let close = find_tag_close(source, body_start).ok_or_else(|| {
            TemplateError::with_span(
                "TEMPLATE_TAG_UNCLOSED",
                "Tag opened with \"{{\" is never closed with \"}}\".",
                lines.span(open, source.len()),
            )
        })?;
        let mut body_end = close;
        let trim_right = has_trim_marker_before(source, body_start, close);
        if trim_right {
            body_end -= 1;
        }

        let location = lines.span(open, close + CLOSE.len());
        let body = source[body_start..body_end].trim();
        if let Some(node) = classify_tag(body, location)? {
            track_block(&node, &mut blocks)?;
            nodes.push(node);
        }

        cursor = close + CLOSE.len();
        trim_next_text = trim_right;
    }

    let mut tail = &source[cursor..];
    if trim_next_text {
        tail = tail.trim_start();
    }
    if !tail.is_empty() {
        nodes.push(TemplateNode::Text {
            value: tail.to_string(),
            location: lines.span(cursor, source.len()),
        });
    }

    if let Some((_, opened_at)) = blocks.pop() {
        return Err(TemplateError::with_span(
            "TEMPLATE_BLOCK_UNCLOSED",
            "Block is missing its {{ end }}.",
            opened_at,
        ));
    }

    Ok(ParsedTemplate { nodes })
}

fn classify_tag(body: &str, location: SourceSpan) -> Result<Option<TemplateNode>, TemplateError> {
    if body.is_empty() {
        return Err(TemplateError::with_span(
            "TEMPLATE_TAG_EMPTY",
            "Tag has no content.",
            location,
        ));
    }
    if body.starts_with("/*") {
        if !body.ends_with("*/") {
            return Err(TemplateError::with_span(
                "TEMPLATE_COMMENT_UNCLOSED",
                "Comment tag must end with \"*/\".",
                location,
            ));
        }
        return Ok(None);
    }
    if body == "end" {
        return Ok(Some(TemplateNode::End { location }));
    }
    if body == "else" {
        return Ok(Some(TemplateNode::Else { location }));
    }
    if let Some(captures) = else_if_regex().captures(body) {
        return Ok(Some(TemplateNode::ElseIf {
            condition: captures[1].trim().to_string(),
            location,
        }));
    }
    if let Some(captures) = if_regex().captures(body) {
        return Ok(Some(TemplateNode::If {
            condition: captures[1].trim().to_string(),
            location,
        }));
    }
    if let Some(captures) = for_regex().captures(body) {
        let binding = captures[1].trim();
        let Some(names) = binding_regex().captures(binding) else {
            return Err(TemplateError::with_span(
                "TEMPLATE_FOR_BINDING",
                format!("Invalid loop binding \"{}\".", binding),
                location,
            ));
        };
        let (item, index) = match names.get(1) {
            Some(single) => (single.as_str().to_string(), None),
            None => (names[2].to_string(), Some(names[3].to_string())),
        };
        return Ok(Some(TemplateNode::For {
            item,
            index,
            iterable: captures[2].trim().to_string(),
            location,
        }));
    }
    if let Some(captures) = let_regex().captures(body) {
        return Ok(Some(TemplateNode::Let {
            name: captures[1].to_string(),
            expr: captures[2].trim().to_string(),
            location,
        }));
    }
    if keyword_only_regex().is_match(body) {
        return Err(TemplateError::with_span(
            "TEMPLATE_BLOCK_SYNTAX",
            format!("Incomplete block tag \"{}\".", body),
            location,
        ));
    }

    Ok(Some(TemplateNode::Output {
        expr: body.to_string(),
        location,
    }))
}

fn track_block(
    node: &TemplateNode,
    blocks: &mut Vec<(BlockKind, SourceSpan)>,
) -> Result<(), TemplateError> {
    match node {
        TemplateNode::If { location, .. } => blocks.push((BlockKind::If, location.clone())),
        TemplateNode::For { location, .. } => blocks.push((BlockKind::For, location.clone())),
        TemplateNode::ElseIf { location, .. } => match blocks.last() {
            Some((BlockKind::If, _)) => {}
            _ => {
                return Err(TemplateError::with_span(
                    "TEMPLATE_BLOCK_UNEXPECTED",
                    "{{ else if }} must follow {{ if }} or another {{ else if }}.",
                    location.clone(),
                ))
            }
        },
        TemplateNode::Else { location } => match blocks.last_mut() {
            Some((kind @ BlockKind::If, _)) => *kind = BlockKind::IfAfterElse,
            _ => {
                return Err(TemplateError::with_span(
                    "TEMPLATE_BLOCK_UNEXPECTED",
                    "{{ else }} must close an {{ if }} branch.",
                    location.clone(),
                ))
            }
        },
        TemplateNode::End { location } => {
            if blocks.pop().is_none() {
                return Err(TemplateError::with_span(
                    "TEMPLATE_BLOCK_UNEXPECTED",
                    "{{ end }} without an open block.",
                    location.clone(),
                ));
            }
        }
        TemplateNode::Text { .. } | TemplateNode::Output { .. } | TemplateNode::Let { .. } => {}
    }
    Ok(())
}

/// `{{-` only trims when followed by whitespace, so `{{-1}}` stays an expression.
fn has_trim_marker_after(source: &str, body_start: usize) -> bool {
    let mut chars = source[body_start..].chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

fn has_trim_marker_before(source: &str, body_start: usize, close: usize) -> bool {
    if close < body_start + 2 {
        return false;
    }
    let mut chars = source[body_start..close].chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Finds the `}}` that ends a tag, skipping over quoted string literals.
fn find_tag_close(source: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, ch) in source[from..].char_indices() {
        let index = from + offset;
        if let Some(open_quote) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open_quote {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '}' if source[index..].starts_with(CLOSE) => return Some(index),
            _ => {}
        }
    }
    None
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .char_indices()
                .filter(|(_, ch)| *ch == '\n')
                .map(|(index, _)| index + 1),
        );
        Self { starts }
    }

    fn location(&self, offset: usize) -> SourceLocation {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        SourceLocation {
            line: line + 1,
            column: offset - self.starts[line] + 1,
        }
    }

    fn span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan {
            start: self.location(start),
            end: self.location(end),
        }
    }
}

fn if_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)^if\s+(.+)$").expect("if regex"))
}

fn else_if_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)^else\s+if\s+(.+)$").expect("else if regex"))
}

fn for_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)^for\s+(.+?)\s+in\s+(.+)$").expect("for regex"))
}

fn binding_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?:([A-Za-z_]\w*)|\(\s*([A-Za-z_]\w*)\s*,\s*([A-Za-z_]\w*)\s*\))$")
            .expect("binding regex")
    })
}

fn let_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)^let\s+([A-Za-z_]\w*)\s*=\s*(.+)$").expect("let regex"))
}

fn keyword_only_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^(?:if|for|let|else\s+if)\b").expect("keyword regex"))
}
