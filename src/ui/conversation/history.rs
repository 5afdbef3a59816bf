//! Message pane: renders the active conversation's view model

use crate::controller::MessageView;
use crate::events::ConversationRole;
use crate::markdown::{self, Segment};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Label shown on every code block header
pub const COPY_LABEL: &str = "📄 Copy";

/// The visible message pane
pub struct ConversationHistory<'a> {
    messages: &'a [MessageView],
    pending: usize,
    /// Lines scrolled up from the bottom
    scroll_back: u16,
    title: &'a str,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(messages: &'a [MessageView], title: &'a str) -> Self {
        Self {
            messages,
            pending: 0,
            scroll_back: 0,
            title,
        }
    }

    pub fn pending(mut self, pending: usize) -> Self {
        self.pending = pending;
        self
    }

    pub fn scroll_back(mut self, scroll_back: u16) -> Self {
        self.scroll_back = scroll_back;
        self
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("💬 {}", self.title));

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() && self.pending == 0 {
            let welcome_lines = vec![
                Line::from(vec![Span::styled("Welcome to chatdesk!", Style::default().fg(Color::Green))]),
                Line::from(vec![Span::raw("")]),
                Line::from(vec![Span::styled(
                    "Type below to start a conversation, or pick one from the list.",
                    Style::default().fg(Color::Gray),
                )]),
                Line::from(vec![Span::styled(
                    "Enter to send, Shift+Enter for a new line, Tab to switch panels.",
                    Style::default().fg(Color::DarkGray),
                )]),
            ];

            for (i, line) in welcome_lines.iter().enumerate().take(inner_area.height as usize) {
                buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
            }
            return;
        }

        let mut all_lines = pane_lines(self.messages, inner_area.width);
        if self.pending > 0 {
            all_lines.push(thinking_line());
        }

        // Anchor to the bottom, then step back by the scroll offset
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let end = total.saturating_sub(self.scroll_back as usize).max(height.min(total));
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Furthest the pane can scroll up when drawn into `area`
pub fn max_scroll_back(messages: &[MessageView], pending: usize, area: Rect) -> u16 {
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2) as usize;
    let total = pane_lines(messages, inner_width).len() + usize::from(pending > 0);
    u16::try_from(total.saturating_sub(inner_height)).unwrap_or(u16::MAX)
}

fn thinking_line() -> Line<'static> {
    let dots = match (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        / 300)
        % 4
    {
        0 => ".",
        1 => "..",
        2 => "...",
        _ => "   ",
    };

    Line::from(vec![
        Span::styled("🤖 ", Style::default().fg(Color::Green)),
        Span::styled("thinking", Style::default().fg(Color::Green)),
        Span::styled(dots, Style::default().fg(Color::Yellow)),
    ])
}

/// Lay out every message as display lines. Code blocks are numbered from 1
/// across the whole pane, matching `/copy <n>`.
pub fn pane_lines(messages: &[MessageView], width: u16) -> Vec<Line<'static>> {
    let content_width = width.saturating_sub(2) as usize;
    let mut lines = Vec::new();
    let mut block_number = 0;

    for message in messages {
        match message {
            MessageView::Turn(turn) => {
                lines.push(header_line(turn.role));
                match turn.role {
                    ConversationRole::User => {
                        push_verbatim(&mut lines, &turn.content, content_width, Style::default().fg(Color::Blue));
                    }
                    ConversationRole::Assistant => {
                        for segment in markdown::segments(&turn.content) {
                            match segment {
                                Segment::Text(text) => {
                                    push_wrapped(&mut lines, &text, content_width, Style::default());
                                }
                                Segment::Code(block) => {
                                    block_number += 1;
                                    lines.push(code_header(&block.language, block_number, content_width));
                                    for line in markdown::highlight(&block, Style::default()) {
                                        let mut spans = vec![Span::styled("│ ", Style::default().fg(Color::DarkGray))];
                                        spans.extend(line.spans);
                                        lines.push(Line::from(spans));
                                    }
                                }
                            }
                        }
                    }
                }
            }
            MessageView::Notice(text) => {
                lines.push(Line::from(vec![Span::styled(
                    "⚠️  Reply failed",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )]));
                push_wrapped(&mut lines, text, content_width, Style::default().fg(Color::Red));
            }
        }
        // spacing between messages
        lines.push(Line::from(vec![Span::raw("")]));
    }

    lines
}

fn header_line(role: ConversationRole) -> Line<'static> {
    let (icon, color) = match role {
        ConversationRole::User => ("👤", Color::Blue),
        ConversationRole::Assistant => ("🤖", Color::Green),
    };
    Line::from(vec![Span::styled(
        format!("{icon} {}", role.display_name()),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )])
}

fn code_header(language: &str, number: usize, width: usize) -> Line<'static> {
    let label = if language.is_empty() { "text" } else { language };
    let copy = format!("{COPY_LABEL} [{number}]");
    let used = label.chars().count() + copy.chars().count() + 4;
    let fill = "─".repeat(width.saturating_sub(used).max(1));

    Line::from(vec![
        Span::styled("┌ ", Style::default().fg(Color::DarkGray)),
        Span::styled(label.to_string(), Style::default().fg(Color::Cyan)),
        Span::styled(format!(" {fill} "), Style::default().fg(Color::DarkGray)),
        Span::styled(copy, Style::default().fg(Color::Yellow)),
    ])
}

fn push_wrapped(lines: &mut Vec<Line<'static>>, text: &str, width: usize, style: Style) {
    for paragraph in text.split('\n') {
        for content_line in wrap_text(paragraph, width) {
            lines.push(Line::from(vec![Span::raw("  "), Span::styled(content_line, style)]));
        }
    }
}

/// Hard-wrap each line at `width` characters, keeping all whitespace
fn push_verbatim(lines: &mut Vec<Line<'static>>, text: &str, width: usize, style: Style) {
    for paragraph in text.split('\n') {
        let chars: Vec<char> = paragraph.chars().collect();
        if width == 0 || chars.is_empty() {
            lines.push(Line::from(vec![Span::raw("  "), Span::styled(paragraph.to_string(), style)]));
            continue;
        }
        for chunk in chars.chunks(width) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(chunk.iter().collect::<String>(), style),
            ]));
        }
    }
}

/// Wrap text to fit within the given width
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let word_width = word.chars().count();
        if current_width > 0 && current_width + word_width + 1 > width {
            lines.push(std::mem::take(&mut current_line));
            current_width = 0;
        }
        if current_width > 0 {
            current_line.push(' ');
            current_width += 1;
        }
        current_line.push_str(word);
        current_width += word_width;
    }

    if !current_line.is_empty() || lines.is_empty() {
        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Turn;

    fn text_of(line: &Line) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn wrap_breaks_on_word_boundaries() {
        assert_eq!(wrap_text("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn user_content_is_rendered_verbatim() {
        let messages = vec![MessageView::Turn(Turn::user("```rust\nnot code\n```"))];
        let rendered: Vec<String> = pane_lines(&messages, 80).iter().map(text_of).collect();
        assert!(rendered.iter().any(|line| line.contains("```rust")));
        assert!(!rendered.iter().any(|line| line.contains(COPY_LABEL)));
    }

    #[test]
    fn user_content_keeps_indentation_and_spacing() {
        let messages = vec![MessageView::Turn(Turn::user("fn main() {\n    let  x = 1;\n}"))];
        let rendered: Vec<String> = pane_lines(&messages, 80).iter().map(text_of).collect();
        assert_eq!(rendered[1], "  fn main() {");
        assert_eq!(rendered[2], "      let  x = 1;");
        assert_eq!(rendered[3], "  }");
    }

    #[test]
    fn long_user_lines_wrap_at_the_pane_width() {
        let messages = vec![MessageView::Turn(Turn::user("abcdefghij  kl"))];
        let rendered: Vec<String> = pane_lines(&messages, 8).iter().map(text_of).collect();
        assert_eq!(rendered[1], "  abcdef");
        assert_eq!(rendered[2], "  ghij  ");
        assert_eq!(rendered[3], "  kl");
    }

    #[test]
    fn code_blocks_get_language_and_numbered_copy_labels() {
        let messages = vec![
            MessageView::Turn(Turn::assistant("```python\nprint(1)\n```")),
            MessageView::Turn(Turn::user("more")),
            MessageView::Turn(Turn::assistant("```\nplain\n```")),
        ];
        let rendered: Vec<String> = pane_lines(&messages, 60).iter().map(text_of).collect();

        let headers: Vec<&String> = rendered.iter().filter(|line| line.contains(COPY_LABEL)).collect();
        assert_eq!(headers.len(), 2);
        assert!(headers[0].contains("python"));
        assert!(headers[0].ends_with("[1]"));
        assert!(headers[1].contains("text"));
        assert!(headers[1].ends_with("[2]"));
        assert!(rendered.iter().any(|line| line == "│ print(1)"));
    }

    #[test]
    fn notices_are_rendered() {
        let messages = vec![MessageView::Notice("connection refused".to_string())];
        let rendered: Vec<String> = pane_lines(&messages, 60).iter().map(text_of).collect();
        assert!(rendered[0].contains("Reply failed"));
        assert!(rendered[1].contains("connection refused"));
    }
}
