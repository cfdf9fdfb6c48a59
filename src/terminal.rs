//! Terminal surface wrapper.
//!
//! Wraps the crossterm backend behind a small [`Screen`] type so the engine
//! contracts only against cell writes, present, and size queries. Also owns
//! the async event poller task that translates backend events into the
//! engine-level [`UiEvent`] stream, and the symbolic key-name table used by
//! keystroke bindings.
//!
//! Drawing primitives and event polling are external collaborators; nothing
//! in here understands pages or forms.

use std::io::{Stdout, Write, stdout};

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{
    Attribute, Print, SetAttribute, SetAttributes, SetBackgroundColor, SetForegroundColor,
};
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{cursor, execute, queue};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::colors::CellStyle;

// ---------------------------------------------------------------------------
// Engine-level events
// ---------------------------------------------------------------------------

/// Events the orchestrator consumes from the terminal.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    /// Synthetic event posted after keystroke tables are rebuilt.
    Reload,
}

// ---------------------------------------------------------------------------
// Screen
// ---------------------------------------------------------------------------

/// The terminal cell surface. Writes are buffered until [`Screen::show`].
pub struct Screen {
    out: Stdout,
    active: bool,
}

impl Screen {
    /// Enter raw mode and the alternate screen, hide the cursor.
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen, cursor::Hide)?;
        Ok(Self { out, active: true })
    }

    /// Current terminal size in cells.
    pub fn size(&self) -> (u16, u16) {
        crossterm::terminal::size().unwrap_or((80, 24))
    }

    /// Queue a clear of the whole surface.
    pub fn clear(&mut self) {
        let _ = queue!(self.out, Clear(ClearType::All));
    }

    /// Queue one cell write at `(x, y)`.
    pub fn set_content(&mut self, x: u16, y: u16, ch: char, style: &CellStyle) {
        let _ = queue!(
            self.out,
            cursor::MoveTo(x, y),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(style.fg),
            SetBackgroundColor(style.bg),
            SetAttributes(style.attrs),
            Print(ch),
        );
    }

    /// Flush queued writes to the terminal.
    pub fn show(&mut self) {
        let _ = self.out.flush();
    }

    /// Restore the terminal to its default state. Safe to call twice.
    pub fn fini(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let _ = execute!(self.out, LeaveAlternateScreen, cursor::Show);
        let _ = disable_raw_mode();
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        self.fini();
    }
}

// ---------------------------------------------------------------------------
// Event poller
// ---------------------------------------------------------------------------

/// Spawn the background task that polls terminal events.
///
/// Key and resize events are forwarded to the orchestrator over `events`.
/// The abort key (`Ctrl-L`) and the reserved chrome keys additionally send
/// on `cancel` *before* being forwarded, so an in-flight fetch aborts even
/// while the orchestrator is blocked awaiting it. The task ends when
/// `interrupt` is cancelled.
pub fn spawn_event_poller(
    events: mpsc::Sender<UiEvent>,
    cancel: mpsc::Sender<String>,
    interrupt: CancellationToken,
) {
    tokio::spawn(async move {
        let mut stream = EventStream::new();
        loop {
            tokio::select! {
                _ = interrupt.cancelled() => return,
                maybe = stream.next() => {
                    let ev = match maybe {
                        Some(Ok(ev)) => ev,
                        Some(Err(e)) => {
                            error!(target: "terminal", "event stream error: {}", e);
                            continue;
                        }
                        None => return,
                    };
                    match ev {
                        Event::Key(key) if key.kind != KeyEventKind::Release => {
                            if is_abort_key(&key) || is_chrome_key(&key) {
                                let _ = cancel.send("user-cancel".to_string()).await;
                            }
                            if is_abort_key(&key) {
                                debug!(target: "terminal", "abort key, context cancelled");
                                continue;
                            }
                            if events.send(UiEvent::Key(key)).await.is_err() {
                                return;
                            }
                        }
                        Event::Resize(w, h) => {
                            if events.send(UiEvent::Resize(w, h)).await.is_err() {
                                return;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    });
}

/// `Ctrl-L` aborts the in-flight fetch.
pub fn is_abort_key(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('l')
}

/// Reserved chrome keys (F2..F7, F10) cancel any in-flight fetch before the
/// orchestrator dispatches them.
fn is_chrome_key(key: &KeyEvent) -> bool {
    matches!(
        key.code,
        KeyCode::F(2)
            | KeyCode::F(3)
            | KeyCode::F(4)
            | KeyCode::F(5)
            | KeyCode::F(6)
            | KeyCode::F(7)
            | KeyCode::F(10)
    )
}

// ---------------------------------------------------------------------------
// Key names
// ---------------------------------------------------------------------------

/// Symbolic name for a special key, matching the designators keystroke
/// bindings use on the wire. Plain runes return `None`.
pub fn key_name(key: &KeyEvent) -> Option<String> {
    if let KeyCode::Char(c) = key.code {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(format!("Ctrl-{}", c.to_ascii_uppercase()));
        }
        return None;
    }
    let name = match key.code {
        KeyCode::F(n) => return Some(format!("F{}", n)),
        KeyCode::Enter => "Enter",
        KeyCode::Esc => "Esc",
        KeyCode::Tab => "Tab",
        KeyCode::BackTab => "Backtab",
        KeyCode::Backspace => "Backspace",
        KeyCode::Delete => "Delete",
        KeyCode::Insert => "Insert",
        KeyCode::Home => "Home",
        KeyCode::End => "End",
        KeyCode::PageUp => "PgUp",
        KeyCode::PageDown => "PgDn",
        KeyCode::Up => "Up",
        KeyCode::Down => "Down",
        KeyCode::Left => "Left",
        KeyCode::Right => "Right",
        _ => return None,
    };
    Some(name.to_string())
}

/// The printable rune of a key event, if it is one (no control/alt chord).
pub fn key_rune(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c)
            if !key.modifiers.contains(KeyModifiers::CONTROL)
                && !key.modifiers.contains(KeyModifiers::ALT) =>
        {
            Some(c)
        }
        _ => None,
    }
}
