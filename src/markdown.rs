//! Assistant content handling: fenced code extraction, language labels and
//! syntax highlighting.

use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const SYNTAX_THEME: &str = "base16-ocean.dark";

/// A fenced code block from an assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Empty when the fence carries no language tag
    pub language: String,
    pub code: String,
}

/// A piece of assistant content, in reading order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Code(CodeBlock),
}

/// Derive a display label from a fence info string (` ```rust,ignore ` → `rust`).
pub fn language_label(info: &str) -> String {
    let token = info
        .split(|c: char| c.is_whitespace() || c == ',')
        .find(|part| !part.is_empty())
        .unwrap_or("");
    token.strip_prefix("language-").unwrap_or(token).to_string()
}

/// Split content into prose and code blocks.
pub fn segments(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut code: Option<CodeBlock> = None;
    let mut list_depth = 0usize;

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                flush_text(&mut text, &mut segments);
                let language = match kind {
                    CodeBlockKind::Fenced(info) => language_label(&info),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some(CodeBlock {
                    language,
                    code: String::new(),
                });
            }
            Event::End(Tag::CodeBlock(_)) => {
                if let Some(mut block) = code.take() {
                    if block.code.ends_with('\n') {
                        block.code.pop();
                    }
                    segments.push(Segment::Code(block));
                }
            }
            Event::Text(value) => match code.as_mut() {
                Some(block) => block.code.push_str(&value),
                None => text.push_str(&value),
            },
            Event::Code(value) => {
                text.push('`');
                text.push_str(&value);
                text.push('`');
            }
            Event::Html(value) => text.push_str(&value),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Rule => text.push_str("────────\n"),
            Event::Start(Tag::List(_)) => list_depth += 1,
            Event::End(Tag::List(_)) => list_depth = list_depth.saturating_sub(1),
            Event::Start(Tag::Item) => {
                text.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                text.push_str("• ");
            }
            Event::End(Tag::Item) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Event::End(Tag::Paragraph) | Event::End(Tag::Heading(..)) => {
                text.push('\n');
                if list_depth == 0 {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }

    if let Some(block) = code.take() {
        segments.push(Segment::Code(block));
    }
    flush_text(&mut text, &mut segments);
    segments
}

/// All code blocks in `content`, in order
pub fn code_blocks(content: &str) -> Vec<CodeBlock> {
    segments(content)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Code(block) => Some(block),
            Segment::Text(_) => None,
        })
        .collect()
}

fn flush_text(text: &mut String, segments: &mut Vec<Segment>) {
    let trimmed = text.trim_end();
    if !trimmed.trim().is_empty() {
        segments.push(Segment::Text(trimmed.to_string()));
    }
    text.clear();
}

/// Convert a syntect style to ratatui style
fn syntect_style_to_ratatui(style: syntect::highlighting::Style) -> Style {
    Style::default().fg(Color::Rgb(
        style.foreground.r,
        style.foreground.g,
        style.foreground.b,
    ))
}

/// Highlight a code block into display lines. Unknown languages fall back to plain text.
pub fn highlight(block: &CodeBlock, base: Style) -> Vec<Line<'static>> {
    let syntax = SYNTAX_SET
        .find_syntax_by_token(&block.language)
        .or_else(|| SYNTAX_SET.find_syntax_by_extension(&block.language))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

    let Some(theme) = THEME_SET.themes.get(SYNTAX_THEME) else {
        return block
            .code
            .lines()
            .map(|line| Line::from(Span::styled(line.to_string(), base)))
            .collect();
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    for line in LinesWithEndings::from(&block.code) {
        let spans: Vec<Span<'static>> = match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => ranges
                .into_iter()
                .map(|(style, text)| {
                    Span::styled(
                        text.trim_end_matches('\n').to_string(),
                        base.patch(syntect_style_to_ratatui(style)),
                    )
                })
                .collect(),
            Err(_) => vec![Span::styled(line.trim_end_matches('\n').to_string(), base)],
        };
        lines.push(Line::from(spans));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_label_strips_prefix_and_attributes() {
        assert_eq!(language_label("rust"), "rust");
        assert_eq!(language_label("language-python"), "python");
        assert_eq!(language_label("rust,ignore"), "rust");
        assert_eq!(language_label("js title=app.js"), "js");
        assert_eq!(language_label(""), "");
    }

    #[test]
    fn segments_split_prose_and_code() {
        let content = "Here you go:\n\n```rust\nfn main() {}\n```\n\nThat's it.";
        let segments = segments(content);
        assert_eq!(
            segments,
            vec![
                Segment::Text("Here you go:".to_string()),
                Segment::Code(CodeBlock {
                    language: "rust".to_string(),
                    code: "fn main() {}".to_string(),
                }),
                Segment::Text("That's it.".to_string()),
            ]
        );
    }

    #[test]
    fn code_blocks_keep_order_and_untagged_fences() {
        let content = "```\nplain\n```\n\n```toml\nkey = 1\n```";
        let blocks = code_blocks(content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "");
        assert_eq!(blocks[0].code, "plain");
        assert_eq!(blocks[1].language, "toml");
    }

    #[test]
    fn unterminated_fence_still_yields_block() {
        let blocks = code_blocks("```sh\necho hi\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "echo hi");
    }

    #[test]
    fn lists_render_with_bullets() {
        let segments = segments("- one\n- two");
        assert_eq!(segments, vec![Segment::Text("• one\n• two".to_string())]);
    }

    #[test]
    fn highlight_produces_one_line_per_source_line() {
        let block = CodeBlock {
            language: "rust".to_string(),
            code: "let a = 1;\nlet b = 2;".to_string(),
        };
        let lines = highlight(&block, Style::default());
        assert_eq!(lines.len(), 2);
        let first: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(first, "let a = 1;");
    }

    #[test]
    fn highlight_unknown_language_falls_back() {
        let block = CodeBlock {
            language: "no-such-lang".to_string(),
            code: "x".to_string(),
        };
        assert_eq!(highlight(&block, Style::default()).len(), 1);
    }
}
