use crate::controller::SummaryView;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Conversation list, most recently created first
pub struct ConversationList<'a> {
    summaries: &'a [SummaryView],
    cursor: Option<usize>,
    has_focus: bool,
}

impl<'a> ConversationList<'a> {
    pub fn new(summaries: &'a [SummaryView]) -> Self {
        Self {
            summaries,
            cursor: None,
            has_focus: false,
        }
    }

    pub fn cursor(mut self, cursor: Option<usize>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn focused(mut self, has_focus: bool) -> Self {
        self.has_focus = has_focus;
        self
    }
}

/// Glyph shown before a title
pub fn status_glyph(summary: &SummaryView) -> &'static str {
    if summary.active {
        "🟢"
    } else if summary.unread {
        "🟠"
    } else {
        "⚪"
    }
}

pub fn summary_line(summary: &SummaryView, selected: bool) -> Line<'static> {
    let mut title_style = if summary.unread {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else if summary.active {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    if selected {
        title_style = title_style.bg(Color::DarkGray);
    }

    let mut spans = vec![
        Span::raw(format!("{} ", status_glyph(summary))),
        Span::styled(summary.title.clone(), title_style),
    ];
    if summary.pending > 0 {
        spans.push(Span::styled(" …", Style::default().fg(Color::Yellow)));
    }
    if selected {
        spans.push(Span::styled(" ❌", Style::default().fg(Color::Red)));
    }
    Line::from(spans)
}

impl Widget for ConversationList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Conversations ({})", self.summaries.len()))
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });
        let inner = block.inner(area);
        block.render(area, buf);

        if self.summaries.is_empty() {
            let hint = Line::from(vec![Span::styled("No conversations yet", Style::default().fg(Color::DarkGray))]);
            buf.set_line(inner.x, inner.y, &hint, inner.width);
            return;
        }

        // Keep the cursor in view
        let height = inner.height as usize;
        let offset = self
            .cursor
            .map_or(0, |cursor| (cursor + 1).saturating_sub(height));

        for (row, (index, summary)) in self
            .summaries
            .iter()
            .enumerate()
            .skip(offset)
            .take(height)
            .enumerate()
        {
            let selected = self.has_focus && self.cursor == Some(index);
            let line = summary_line(summary, selected);
            buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
        }
    }
}
