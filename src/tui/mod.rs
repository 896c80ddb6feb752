/// Ratatui-based TUI for askgpt.
///
/// Architecture:
///   main task:          event loop, crossterm events + turn events + redraw tick
///   conversation actor: tokio::spawn, streams each reply back through its `Turn`
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  header: title + rule (1 line)                 │
///   ├────────────────────────────────────────────────┤
///   │  transcript (scrollable, Min(0))               │
///   ├────────────────────────────────────────────────┤
///   │  footer: state + rule + scroll % (1 line)      │
///   ├────────────────────────────────────────────────┤
///   │  input box (3 lines, fixed)                    │
///   └────────────────────────────────────────────────┘
pub mod input;
pub mod render;
pub mod viewport;

use std::io;

use anyhow::{Context, Result, bail};
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    text::Line,
    widgets::{Paragraph, Wrap},
};

use crate::client::Client;
use crate::config::ResolvedConfig;
use crate::conversation::{self, ConversationHandle, Turn, TurnEvent};
use crate::markdown;
use crate::ui;
use input::ModalInput;
use viewport::{Viewport, WHEEL_DELTA};

pub const HEADER_HEIGHT: u16 = 1;
pub const FOOTER_HEIGHT: u16 = 1;
pub const INPUT_HEIGHT: u16 = 3;
const CHROME_HEIGHT: u16 = HEADER_HEIGHT + FOOTER_HEIGHT + INPUT_HEIGHT;

// ── Relay state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    /// Question sent, nothing streamed back yet
    Awaiting,
    Streaming,
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    /// Raw Markdown of the whole conversation as displayed
    pub transcript: String,
    /// `transcript` rendered to styled lines (unwrapped)
    pub rendered: Vec<Line<'static>>,
    pub input: ModalInput,
    pub viewport: Viewport,
    pub relay: RelayState,
    /// True from submit until the turn's terminal event
    pub answering: bool,
    pub turn: Option<Turn>,
    pub profile: String,
    pub model: String,
    pub show_timestamps: bool,
    pub word_wrap: u16,
    pub fail_fast: bool,
    /// Incremented every 120ms while answering, for the spinner
    pub spinner_tick: u32,
    pub turns_completed: usize,
    pub total_output_tokens: u32,
}

impl AppState {
    pub fn new(resolved: &ResolvedConfig, show_timestamps: bool) -> Self {
        Self {
            transcript: String::new(),
            rendered: Vec::new(),
            input: ModalInput::new(),
            viewport: Viewport::default(),
            relay: RelayState::Idle,
            answering: false,
            turn: None,
            profile: resolved.profile_name.clone(),
            model: resolved.model.clone(),
            show_timestamps,
            word_wrap: resolved.word_wrap,
            fail_fast: resolved.fail_fast,
            spinner_tick: 0,
            turns_completed: 0,
            total_output_tokens: 0,
        }
    }

    /// Column count the transcript wraps at.
    pub fn transcript_width(&self) -> u16 {
        self.viewport.width.min(self.word_wrap).max(1)
    }

    /// Terminal size changed: re-wrap and keep the scroll position valid.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.viewport.resize(width, height.saturating_sub(CHROME_HEIGHT));
        self.relayout();
    }

    fn relayout(&mut self) {
        let wrapped = Paragraph::new(self.rendered.clone())
            .wrap(Wrap { trim: false })
            .line_count(self.transcript_width());
        self.viewport.set_content_lines(wrapped);
    }

    fn append(&mut self, text: &str) {
        self.transcript.push_str(text);
        self.rendered = markdown::render(&self.transcript);
        self.relayout();
        self.viewport.goto_bottom();
    }

    /// Send the input line as a question. Silently ignored while a reply is
    /// in flight or when the line is blank.
    pub fn submit(&mut self, conversation: &ConversationHandle) -> Result<()> {
        if self.answering {
            return Ok(());
        }
        let question = self.input.value();
        if question.trim().is_empty() {
            return Ok(());
        }

        let turn = conversation.ask(question.clone())?;
        tracing::debug!(chars = question.len(), "question submitted");

        self.append(&ui::question_block(&question, self.show_timestamps));
        self.input.reset();
        self.turn = Some(turn);
        self.answering = true;
        self.relay = RelayState::Awaiting;
        Ok(())
    }

    /// Fold one event from the current turn into the transcript.
    /// Errors only when a failed reply should end the program.
    pub fn apply_turn_event(&mut self, ev: TurnEvent) -> Result<()> {
        if !self.answering {
            return Ok(());
        }
        match ev {
            TurnEvent::Chunk(text) => {
                self.relay = RelayState::Streaming;
                self.append(&text);
            }
            TurnEvent::Finished { output_tokens, .. } => {
                self.turns_completed += 1;
                self.total_output_tokens += output_tokens;
                self.finish_turn(ui::REPLY_END);
            }
            TurnEvent::Failed(error) => {
                tracing::warn!(%error, "reply failed");
                self.finish_turn(&ui::failure_block(&error));
                if self.fail_fast {
                    bail!("reply failed: {error}");
                }
            }
            TurnEvent::Cancelled => self.finish_turn(ui::CANCELLED_BLOCK),
        }
        Ok(())
    }

    fn finish_turn(&mut self, closing: &str) {
        self.answering = false;
        self.turn = None;
        self.relay = RelayState::Idle;
        self.append(closing);
    }

    /// Ask the actor to stop the current reply; the `Cancelled` event closes it.
    pub fn cancel_turn(&mut self) {
        if let Some(turn) = &self.turn {
            turn.cancel();
        }
    }

    pub fn cancelling(&self) -> bool {
        self.turn.as_ref().is_some_and(Turn::is_cancelled)
    }
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(resolved: ResolvedConfig, show_timestamps: bool) -> Result<()> {
    let client = Client::from_resolved(&resolved)?;
    let (conversation, actor) = conversation::spawn(client, resolved.system_prompt.clone());

    let mut terminal = setup_terminal()?;

    // Restore the terminal before the panic message prints
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, &resolved, show_timestamps, &conversation).await;

    restore_terminal(&mut terminal);
    // An in-flight reply would otherwise keep the actor alive until it completes
    actor.abort();
    result
}

/// Resolves with the current turn's next event, or never when idle.
async fn next_turn_event(turn: &mut Option<Turn>) -> TurnEvent {
    match turn {
        Some(turn) => turn
            .next()
            .await
            .unwrap_or_else(|| TurnEvent::Failed("conversation ended unexpectedly".to_string())),
        None => std::future::pending().await,
    }
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    resolved: &ResolvedConfig,
    show_timestamps: bool,
    conversation: &ConversationHandle,
) -> Result<()> {
    let mut state = AppState::new(resolved, show_timestamps);
    let size = terminal.size()?;
    state.resize(size.width, size.height);
    tracing::info!(profile = %state.profile, model = %state.model, "tui started");

    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    terminal.draw(|f| render::draw(f, &state))?;

    loop {
        tokio::select! {
            // ── Spinner tick ──────────────────────────────────────────────────
            _ = ticker.tick() => {
                if state.answering {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Streamed reply ────────────────────────────────────────────────
            ev = next_turn_event(&mut state.turn) => {
                state.apply_turn_event(ev)?;
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Keyboard/mouse/resize events ──────────────────────────────────
            maybe_ev = crossterm_events.next() => {
                match maybe_ev {
                    Some(Ok(Event::Key(key))) => {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if !handle_key(key, &mut state, conversation)? {
                            break;
                        }
                    }
                    Some(Ok(Event::Mouse(mouse))) => handle_mouse(mouse, &mut state),
                    Some(Ok(Event::Resize(w, h))) => state.resize(w, h),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("terminal event stream failed"),
                    None => break,
                }
                terminal.draw(|f| render::draw(f, &state))?;
            }
        }
    }

    tracing::info!(turns = state.turns_completed, "tui closed");
    Ok(())
}

// ── Key handler ───────────────────────────────────────────────────────────────

/// Returns false when the app should quit.
fn handle_key(
    key: KeyEvent,
    state: &mut AppState,
    conversation: &ConversationHandle,
) -> Result<bool> {
    match (key.modifiers, key.code) {
        // Ctrl+C: cancel the reply, or quit when idle
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            if state.answering {
                state.cancel_turn();
            } else {
                return Ok(false);
            }
        }
        // Ctrl+J / Ctrl+K: move focus between input and transcript
        (KeyModifiers::CONTROL, KeyCode::Char('j' | 'k')) => {
            if state.input.focused() {
                state.input.blur();
            } else {
                state.input.focus();
            }
        }
        (_, KeyCode::Enter) => {
            if state.input.focused() {
                state.submit(conversation)?;
            }
        }
        _ => {
            if state.input.focused() {
                state.input.handle_key(key);
            } else {
                state.viewport.handle_key(key);
            }
        }
    }
    Ok(true)
}

fn handle_mouse(mouse: MouseEvent, state: &mut AppState) {
    match mouse.kind {
        MouseEventKind::ScrollUp => state.viewport.scroll_up(WHEEL_DELTA),
        MouseEventKind::ScrollDown => state.viewport.scroll_down(WHEEL_DELTA),
        _ => {}
    }
}
