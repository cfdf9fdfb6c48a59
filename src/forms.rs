//! Interactive form runtime.
//!
//! A [`Form`] owns its edit state: the active text box, per-box buffers and
//! cursor offsets. `poll` takes exclusive control of keyboard input until
//! the user submits (Enter), cancels (Esc), the fetch context is cancelled,
//! or the browser interrupt fires — the form is modal by design. While
//! polling, visible boxes are redrawn on every change.
//!
//! Box coordinates are absolute screen positions; the orchestrator shifts
//! them from div-relative positions before the form is ever drawn.

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cex::FetchContext;
use crate::colors::CellStyle;
use crate::convert;
use crate::protocol;
use crate::terminal::{Screen, UiEvent};

/// What a form submission should do.
#[derive(Debug, Clone)]
pub enum SubmitAction {
    Link(protocol::Link),
    /// Handled inside the browser (address bar, settings) rather than by a
    /// page fetch.
    LocalHook(String),
}

/// How a modal poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Submitted,
    Cancelled,
}

/// Outcome of feeding one key into the form's edit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditOutcome {
    Consumed,
    Submit,
    Cancel,
}

#[derive(Debug, Clone)]
struct TextBoxState {
    name: String,
    description: String,
    x: i32,
    y: i32,
    width: usize,
    style_cursor: CellStyle,
    style_fill: CellStyle,
    style_text: CellStyle,
    style_description: CellStyle,
    show_description: bool,
    password: bool,
    buffer: Vec<char>,
    cursor: usize,
}

#[derive(Debug, Clone)]
pub struct Form {
    pub name: String,
    pub div_name: String,
    pub submit: SubmitAction,
    boxes: Vec<TextBoxState>,
    active: usize,
}

impl Form {
    /// Build a form from its wire description, copying the text boxes in
    /// tab order. Buffers start at the declared default values with the
    /// cursor at the end.
    pub fn from_wire(wire: &protocol::Form) -> Self {
        let mut boxes: Vec<&protocol::TextBox> = wire.text_boxes.iter().collect();
        boxes.sort_by_key(|tb| tb.tab_order);
        let boxes = boxes
            .into_iter()
            .map(|tb| {
                let buffer: Vec<char> = tb.default_value.chars().collect();
                let cursor = buffer.len();
                TextBoxState {
                    name: tb.name.clone(),
                    description: tb.description.clone(),
                    x: tb.position_x as i32,
                    y: tb.position_y as i32,
                    width: tb.width as usize,
                    style_cursor: convert::style(&tb.style_cursor),
                    style_fill: convert::style(&tb.style_fill),
                    style_text: convert::style(&tb.style_text),
                    style_description: convert::style(&tb.style_description),
                    show_description: tb.show_description,
                    password: tb.password,
                    buffer,
                    cursor,
                }
            })
            .collect();
        let submit = match &wire.submit_link {
            Some(link) => SubmitAction::Link(link.clone()),
            None => SubmitAction::LocalHook(wire.name.clone()),
        };
        Self {
            name: wire.name.clone(),
            div_name: wire.div_name.clone(),
            submit,
            boxes,
            active: 0,
        }
    }

    /// Shift all box positions, translating div-relative coordinates into
    /// absolute screen coordinates.
    pub fn shift_xy(&mut self, dx: i32, dy: i32) {
        for tb in &mut self.boxes {
            tb.x += dx;
            tb.y += dy;
        }
    }

    /// Mapping from text-box name to its current buffer. The password mask
    /// affects only rendering, never collection.
    pub fn collect(&self) -> HashMap<String, String> {
        self.boxes
            .iter()
            .map(|tb| (tb.name.clone(), tb.buffer.iter().collect()))
            .collect()
    }

    /// Take exclusive control of keyboard input until the form closes.
    ///
    /// Returns `Submitted` on Enter; `Cancelled` on Esc, context
    /// cancellation, or interrupt. The caller must not submit after a
    /// cancel.
    pub async fn poll(
        &mut self,
        ctx: &FetchContext,
        interrupt: &CancellationToken,
        events: &mut mpsc::Receiver<UiEvent>,
        screen: &mut Screen,
    ) -> PollOutcome {
        self.draw(screen);
        screen.show();
        loop {
            let event = tokio::select! {
                _ = ctx.token.cancelled() => return PollOutcome::Cancelled,
                _ = interrupt.cancelled() => return PollOutcome::Cancelled,
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => return PollOutcome::Cancelled,
                },
            };
            let key = match event {
                UiEvent::Key(key) => key,
                // resizes and synthetic reloads wait until the form closes
                _ => continue,
            };
            match self.handle_key(&key) {
                EditOutcome::Submit => {
                    debug!(target: "forms", form = %self.name, "form submitted");
                    return PollOutcome::Submitted;
                }
                EditOutcome::Cancel => {
                    debug!(target: "forms", form = %self.name, "form cancelled");
                    return PollOutcome::Cancelled;
                }
                EditOutcome::Consumed => {
                    self.draw(screen);
                    screen.show();
                }
            }
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) -> EditOutcome {
        match key.code {
            KeyCode::Enter => return EditOutcome::Submit,
            KeyCode::Esc => return EditOutcome::Cancel,
            KeyCode::Tab => self.advance(1),
            KeyCode::BackTab => self.advance(-1),
            _ => {
                if let Some(tb) = self.boxes.get_mut(self.active) {
                    match key.code {
                        KeyCode::Char(c) => {
                            tb.buffer.insert(tb.cursor, c);
                            tb.cursor += 1;
                        }
                        KeyCode::Backspace => {
                            if tb.cursor > 0 {
                                tb.cursor -= 1;
                                tb.buffer.remove(tb.cursor);
                            }
                        }
                        KeyCode::Left => tb.cursor = tb.cursor.saturating_sub(1),
                        KeyCode::Right => tb.cursor = (tb.cursor + 1).min(tb.buffer.len()),
                        KeyCode::Home => tb.cursor = 0,
                        KeyCode::End => tb.cursor = tb.buffer.len(),
                        _ => {}
                    }
                }
            }
        }
        EditOutcome::Consumed
    }

    /// Move the active box along tab order, wrapping around.
    fn advance(&mut self, delta: i32) {
        if self.boxes.is_empty() {
            return;
        }
        let len = self.boxes.len() as i32;
        self.active = ((self.active as i32 + delta).rem_euclid(len)) as usize;
    }

    /// Draw every visible box; the cursor only appears in the active box.
    pub fn draw(&self, screen: &mut Screen) {
        for (i, tb) in self.boxes.iter().enumerate() {
            tb.draw(screen, i == self.active);
        }
    }
}

impl TextBoxState {
    fn draw(&self, screen: &mut Screen, active: bool) {
        if self.y < 0 {
            return;
        }
        let y = self.y as u16;

        if self.show_description && !self.description.is_empty() {
            let desc_len = self.description.chars().count() as i32;
            let start = self.x - desc_len - 1;
            for (i, ch) in self.description.chars().enumerate() {
                let x = start + i as i32;
                if x >= 0 {
                    screen.set_content(x as u16, y, ch, &self.style_description);
                }
            }
        }

        // Window the buffer so the cursor is always visible.
        let window = self.width.saturating_sub(1);
        let start = self.cursor.saturating_sub(window);
        for col in 0..self.width {
            let x = self.x + col as i32;
            if x < 0 {
                continue;
            }
            let idx = start + col;
            let (ch, mut style) = match self.buffer.get(idx) {
                Some(&c) => {
                    let shown = if self.password { '*' } else { c };
                    (shown, self.style_text)
                }
                None => (' ', self.style_fill),
            };
            if active && idx == self.cursor {
                style = self.style_cursor;
            }
            screen.set_content(x as u16, y, ch, &style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn wire_form() -> protocol::Form {
        protocol::Form {
            name: "test-form".to_string(),
            div_name: "main".to_string(),
            submit_link: Some(protocol::Link {
                page_name: "submit-here".to_string(),
                ..protocol::Link::default()
            }),
            text_boxes: vec![
                protocol::TextBox {
                    name: "second".to_string(),
                    tab_order: 2,
                    default_value: "two".to_string(),
                    position_x: 0,
                    position_y: 1,
                    width: 10,
                    ..protocol::TextBox::default()
                },
                protocol::TextBox {
                    name: "first".to_string(),
                    tab_order: 1,
                    default_value: "one".to_string(),
                    position_x: 0,
                    position_y: 0,
                    width: 10,
                    ..protocol::TextBox::default()
                },
            ],
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn boxes_are_ordered_by_tab_order() {
        let form = Form::from_wire(&wire_form());
        assert_eq!(form.boxes[0].name, "first");
        assert_eq!(form.boxes[1].name, "second");
    }

    #[test]
    fn tab_wraps_around_in_both_directions() {
        let mut form = Form::from_wire(&wire_form());
        assert_eq!(form.active, 0);
        form.handle_key(&key(KeyCode::Tab));
        assert_eq!(form.active, 1);
        form.handle_key(&key(KeyCode::Tab));
        assert_eq!(form.active, 0);
        form.handle_key(&key(KeyCode::BackTab));
        assert_eq!(form.active, 1);
    }

    #[test]
    fn editing_inserts_and_deletes_at_cursor() {
        let mut form = Form::from_wire(&wire_form());
        // active box is "first" with buffer "one", cursor at end
        form.handle_key(&key(KeyCode::Char('!')));
        form.handle_key(&key(KeyCode::Home));
        form.handle_key(&key(KeyCode::Char('>')));
        let collected = form.collect();
        assert_eq!(collected["first"], ">one!");

        form.handle_key(&key(KeyCode::End));
        form.handle_key(&key(KeyCode::Backspace));
        assert_eq!(form.collect()["first"], ">one");
    }

    #[test]
    fn cursor_motion_is_clamped() {
        let mut form = Form::from_wire(&wire_form());
        form.handle_key(&key(KeyCode::Home));
        form.handle_key(&key(KeyCode::Left));
        assert_eq!(form.boxes[0].cursor, 0);
        form.handle_key(&key(KeyCode::End));
        form.handle_key(&key(KeyCode::Right));
        assert_eq!(form.boxes[0].cursor, form.boxes[0].buffer.len());
    }

    #[test]
    fn enter_submits_and_esc_cancels() {
        let mut form = Form::from_wire(&wire_form());
        assert_eq!(form.handle_key(&key(KeyCode::Enter)), EditOutcome::Submit);
        assert_eq!(form.handle_key(&key(KeyCode::Esc)), EditOutcome::Cancel);
    }

    #[test]
    fn collect_ignores_password_masking() {
        let mut wire = wire_form();
        wire.text_boxes[0].password = true;
        let mut form = Form::from_wire(&wire);
        form.handle_key(&key(KeyCode::Tab)); // move to "second" (masked)
        form.handle_key(&key(KeyCode::Char('x')));
        assert_eq!(form.collect()["second"], "twox");
    }

    #[test]
    fn shift_translates_coordinates() {
        let mut form = Form::from_wire(&wire_form());
        form.shift_xy(5, 3);
        assert_eq!(form.boxes[0].x, 5);
        assert_eq!(form.boxes[0].y, 3);
    }
}
