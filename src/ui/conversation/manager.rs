use crate::controller::{ConversationController, ReplyOutcome, ReplyRequest};
use crate::error::Result;
use crate::events::{AppEvent, ReplyEnvelope};
use crate::host::HostCommands;
use crate::markdown::{self, CodeBlock};
use crate::ui::conversation::history;
use crate::ui::conversation::{
    get_help_text, ComposerResult, ConversationComposer, ConversationHistory, ConversationList,
    ParsedCommand, SlashCommand,
};
use arboard::Clipboard;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COPIED_FLASH: Duration = Duration::from_secs(1);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const SIDEBAR_WIDTH: u16 = 30;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Which panel receives key input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Composer,
}

struct StatusMessage {
    text: String,
    expires_at: Instant,
}

/// Wires the controller to input, the host commands and the widgets
pub struct ConversationManager {
    controller: ConversationController,
    composer: ConversationComposer,
    host: Arc<dyn HostCommands>,
    events: mpsc::UnboundedSender<AppEvent>,
    saves: Option<mpsc::UnboundedSender<String>>,
    save_worker: Option<JoinHandle<()>>,
    focus: Focus,
    cursor: usize,
    scroll_back: u16,
    /// Where the message pane was last drawn
    pane_area: Cell<Rect>,
    show_help: bool,
    status: Option<StatusMessage>,
    clipboard: Option<Clipboard>,
}

impl ConversationManager {
    /// Must be called inside a tokio runtime; it starts the save worker.
    pub fn new(
        controller: ConversationController,
        host: Arc<dyn HostCommands>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let (saves, save_worker) = spawn_save_worker(Arc::clone(&host));

        Self {
            controller,
            composer: ConversationComposer::new("Ask anything..."),
            host,
            events,
            saves: Some(saves),
            save_worker: Some(save_worker),
            focus: Focus::Composer,
            cursor: 0,
            scroll_back: 0,
            pane_area: Cell::new(Rect::default()),
            show_help: false,
            status: None,
            clipboard: None,
        }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    #[cfg(test)]
    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        if self.show_help {
            self.show_help = false;
            return ConversationAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return ConversationAction::Exit,
            KeyCode::Char('n') if ctrl => {
                self.new_conversation();
                return ConversationAction::None;
            }
            KeyCode::Char('y') if ctrl => {
                self.copy_code(None);
                return ConversationAction::None;
            }
            KeyCode::PageUp => {
                self.scroll_back = self.scroll_back.saturating_add(5).min(self.max_scroll_back());
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(5);
                return ConversationAction::None;
            }
            KeyCode::Tab if !self.composer.palette_open() => {
                self.set_focus(match self.focus {
                    Focus::Sidebar => Focus::Composer,
                    Focus::Composer => Focus::Sidebar,
                });
                return ConversationAction::None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Sidebar => {
                self.handle_sidebar_key(key);
                ConversationAction::None
            }
            Focus::Composer => match self.composer.handle_key(key) {
                ComposerResult::Submitted(input) => {
                    self.submit(&input);
                    ConversationAction::None
                }
                ComposerResult::Command(command) => self.handle_slash_command(command),
                ComposerResult::None => ConversationAction::None,
            },
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        let count = self.controller.summaries().len();
        match key.code {
            KeyCode::Up => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.cursor + 1 < count {
                    self.cursor += 1;
                }
            }
            KeyCode::Enter => self.select_at_cursor(),
            KeyCode::Delete | KeyCode::Char('d') => self.remove_at_cursor(),
            KeyCode::Esc => self.set_focus(Focus::Composer),
            _ => {}
        }
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.composer.set_focus(focus == Focus::Composer);
        if focus == Focus::Sidebar {
            self.cursor = self.active_index().unwrap_or(0);
        }
    }

    /// Send user input and request a reply
    pub fn submit(&mut self, input: &str) {
        let Some(request) = self.controller.submit(input) else {
            return;
        };
        self.scroll_back = 0;
        self.cursor = self.active_index().unwrap_or(0);
        self.spawn_reply(request);
        self.persist();
    }

    fn spawn_reply(&self, request: ReplyRequest) {
        let host = Arc::clone(&self.host);
        let events = self.events.clone();

        tokio::spawn(async move {
            let ReplyRequest {
                conversation_id,
                turns,
            } = request;
            debug!(conversation_id = %conversation_id, turns = turns.len(), "Requesting reply");

            let envelope = match host.send_content(&conversation_id, &turns).await {
                Ok(response) => {
                    if response.id != conversation_id {
                        warn!(
                            requested = %conversation_id,
                            answered = %response.id,
                            "Reply tagged with a different conversation"
                        );
                    }
                    ReplyEnvelope::success(response.id, response.content)
                        .requested_by(conversation_id)
                }
                Err(err) => ReplyEnvelope::failure(conversation_id, err.to_string()),
            };

            if events.send(AppEvent::Reply(envelope)).is_err() {
                debug!("UI closed before the reply arrived");
            }
        });
    }

    /// Apply a background event to the conversation state
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Reply(envelope) => {
                let outcome = self.controller.dispatch_reply(envelope);
                if outcome == (ReplyOutcome::Appended { visible: true }) {
                    self.scroll_back = 0;
                }
                if outcome.requires_save() {
                    self.persist();
                }
            }
        }
    }

    /// Queue a save of the whole map
    fn persist(&self) {
        let json = match self.controller.snapshot_json() {
            Ok(json) => json,
            Err(err) => {
                error!(error = %err, "Failed to serialize conversations");
                return;
            }
        };
        let queued = self
            .saves
            .as_ref()
            .is_some_and(|saves| saves.send(json).is_ok());
        if !queued {
            error!("Save worker is gone; conversations were not saved");
        }
    }

    pub fn new_conversation(&mut self) {
        self.controller.new_conversation();
        self.scroll_back = 0;
        self.set_focus(Focus::Composer);
    }

    fn select_at_cursor(&mut self) {
        let Some(id) = self
            .controller
            .summaries()
            .get(self.cursor)
            .map(|summary| summary.id.clone())
        else {
            return;
        };
        if self.controller.select(&id) {
            self.scroll_back = 0;
            self.set_focus(Focus::Composer);
        }
    }

    fn remove_at_cursor(&mut self) {
        let Some(id) = self
            .controller
            .summaries()
            .get(self.cursor)
            .map(|summary| summary.id.clone())
        else {
            return;
        };
        if self.controller.remove(&id) {
            self.persist();
        }
        let count = self.controller.summaries().len();
        self.cursor = self.cursor.min(count.saturating_sub(1));
    }

    fn remove_active(&mut self) {
        match self.controller.active().cloned() {
            Some(id) => {
                if self.controller.remove(&id) {
                    self.persist();
                    self.flash("Conversation deleted", STATUS_TIMEOUT);
                }
            }
            None => self.flash("No conversation selected", STATUS_TIMEOUT),
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::New => self.new_conversation(),
            SlashCommand::Delete => self.remove_active(),
            SlashCommand::Copy => {
                if command.argument().is_some() && command.block_index().is_none() {
                    self.flash("Usage: /copy <n>", STATUS_TIMEOUT);
                } else {
                    self.copy_code(command.block_index());
                }
            }
            SlashCommand::Help => self.show_help = true,
            SlashCommand::Quit => return ConversationAction::Exit,
        }
        ConversationAction::None
    }

    /// Code block `index` (1-based) in the visible pane, or the last one
    pub fn code_block(&self, index: Option<usize>) -> Option<CodeBlock> {
        let mut blocks: Vec<CodeBlock> = self
            .controller
            .visible_assistant_contents()
            .flat_map(markdown::code_blocks)
            .collect();
        match index {
            Some(n) if n >= 1 && n <= blocks.len() => Some(blocks.swap_remove(n - 1)),
            Some(_) => None,
            None => blocks.pop(),
        }
    }

    fn copy_code(&mut self, index: Option<usize>) {
        let Some(block) = self.code_block(index) else {
            let message = match index {
                Some(n) => format!("No code block [{n}]"),
                None => "No code block to copy".to_string(),
            };
            self.flash(message, STATUS_TIMEOUT);
            return;
        };

        match self.copy_to_clipboard(block.code) {
            Ok(()) => {
                info!(language = %block.language, "Copied code block");
                self.flash("📋 Copied!", COPIED_FLASH);
            }
            Err(err) => {
                warn!(error = %err, "Clipboard unavailable");
                self.flash(err.to_string(), STATUS_TIMEOUT);
            }
        }
    }

    fn copy_to_clipboard(&mut self, text: String) -> Result<()> {
        if self.clipboard.is_none() {
            self.clipboard = Some(Clipboard::new()?);
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            clipboard.set_text(text)?;
        }
        Ok(())
    }

    fn flash(&mut self, text: impl Into<String>, duration: Duration) {
        self.status = Some(StatusMessage {
            text: text.into(),
            expires_at: Instant::now() + duration,
        });
    }

    /// Expire transient status messages
    pub fn tick(&mut self) {
        if self
            .status
            .as_ref()
            .is_some_and(|status| Instant::now() >= status.expires_at)
        {
            self.status = None;
        }
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|status| status.text.as_str())
    }

    fn max_scroll_back(&self) -> u16 {
        let pending = self.controller.active().map_or(0, |id| self.controller.pending(id));
        history::max_scroll_back(self.controller.pane(), pending, self.pane_area.get())
    }

    fn active_index(&self) -> Option<usize> {
        let active = self.controller.active()?;
        self.controller
            .summaries()
            .iter()
            .position(|summary| &summary.id == active)
    }

    /// Flush queued saves and stop the save worker
    pub async fn shutdown(mut self) {
        self.saves.take();
        if let Some(worker) = self.save_worker.take() {
            if let Err(err) = worker.await {
                error!(error = %err, "Save worker panicked");
            }
        }
    }
}

/// Saves run one at a time, in the order they were queued, so an older
/// snapshot can never overwrite a newer one.
fn spawn_save_worker(host: Arc<dyn HostCommands>) -> (mpsc::UnboundedSender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let worker = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            if let Err(err) = host.save_conversations(snapshot).await {
                error!(error = %err, "Failed to save conversations");
            }
        }
    });
    (tx, worker)
}

impl ConversationManager {
    /// Render the conversation UI components
    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
            .split(area);

        let summaries = self.controller.summaries();
        let cursor = (!summaries.is_empty()).then(|| self.cursor.min(summaries.len() - 1));
        ConversationList::new(summaries)
            .cursor(cursor)
            .focused(self.focus == Focus::Sidebar)
            .render(columns[0], buf);

        let composer_height = self.composer.desired_height(8);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(composer_height),
                Constraint::Length(1),
            ])
            .split(columns[1]);

        let active = self.controller.active();
        let title = active
            .and_then(|id| summaries.iter().find(|summary| &summary.id == id))
            .map_or("New conversation", |summary| summary.title.as_str());
        let pending = active.map_or(0, |id| self.controller.pending(id));

        self.pane_area.set(rows[0]);
        ConversationHistory::new(self.controller.pane(), title)
            .pending(pending)
            .scroll_back(self.scroll_back)
            .render(rows[0], buf);

        (&self.composer).render(rows[1], buf);

        let status = match self.status_text() {
            Some(text) => Line::from(vec![Span::styled(text.to_string(), Style::default().fg(Color::Yellow))]),
            None => Line::from(vec![Span::styled(
                "Tab switch panel · Ctrl+N new · Ctrl+Y copy code · /help · Ctrl+C quit",
                Style::default().fg(Color::DarkGray),
            )]),
        };
        buf.set_line(rows[2].x, rows[2].y, &status, rows[2].width);

        if self.show_help {
            render_help(rows[0], buf);
        }
    }
}

fn render_help(area: Rect, buf: &mut Buffer) {
    let text = get_help_text();
    let height = (text.lines().count() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + 2.min(area.width),
        y: area.y + area.height.saturating_sub(height) / 2,
        width: area.width.saturating_sub(4),
        height,
    };
    Clear.render(popup, buf);
    Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help (any key to close)")
                .style(Style::default().fg(Color::Cyan)),
        )
        .render(popup, buf);
}
