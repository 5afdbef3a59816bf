//! Terminal setup and the main event loop

use crate::controller::ConversationController;
use crate::host::HostCommands;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Load state from the host and build a controller; a failed load means no prior state
pub async fn load_controller(host: &dyn HostCommands) -> ConversationController {
    match host.load_conversations().await {
        Ok(persisted) => ConversationController::initialize(persisted.as_deref()),
        Err(err) => {
            warn!(error = %err, "Could not load conversations; starting empty");
            ConversationController::new()
        }
    }
}

/// Run the chat UI until the user quits
pub async fn run(host: Arc<dyn HostCommands>) -> Result<()> {
    let controller = load_controller(host.as_ref()).await;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let manager = ConversationManager::new(controller, host, events_tx);

    let mut terminal = setup_terminal().context("Failed to set up terminal")?;
    let (manager, result) = event_loop(&mut terminal, manager, events_rx).await;
    restore_terminal(&mut terminal).context("Failed to restore terminal")?;

    manager.shutdown().await;
    info!("Exited");
    result
}

async fn event_loop(
    terminal: &mut Tui,
    mut manager: ConversationManager,
    mut events_rx: mpsc::UnboundedReceiver<crate::events::AppEvent>,
) -> (ConversationManager, Result<()>) {
    let mut input = EventStream::new();
    let mut ticker = interval(Duration::from_millis(250));

    loop {
        if let Err(err) = terminal.draw(|frame| {
            let area = frame.size();
            manager.render(area, frame.buffer_mut());
        }) {
            return (manager, Err(anyhow::Error::new(err).context("Failed to draw")));
        }

        tokio::select! {
            maybe_event = input.next() => match maybe_event {
                Some(Ok(Event::Key(key))) => {
                    if manager.handle_key(key) == ConversationAction::Exit {
                        return (manager, Ok(()));
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    return (manager, Err(anyhow::Error::new(err).context("Failed to read terminal input")));
                }
                None => return (manager, Ok(())),
            },
            Some(event) = events_rx.recv() => manager.handle_event(event),
            _ = ticker.tick() => manager.tick(),
        }
    }
}

fn setup_terminal() -> io::Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Tui) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}
