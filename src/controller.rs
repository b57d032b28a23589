use std::thread;
use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, trace};

use crate::domain::Message;
use crate::model::Model;

pub struct Controller;

impl Controller {
    pub fn new() -> Self {
        Self
    }

    /// Maps a terminal event to a message. While a prompt is open every key
    /// is forwarded raw.
    pub fn handle_event(&self, model: &Model, event: Event) -> Option<Message> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Some(Message::RawKey(key))
                } else {
                    self.handle_key(key)
                }
            }
            Event::Resize(_, height) => Some(Message::Resize(height as usize)),
            _ => None,
        }
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Tab, _) => Some(Message::FocusNext),
            (KeyCode::BackTab, _) => Some(Message::FocusPrev),
            (KeyCode::Char('a'), _) => Some(Message::ToggleAutoRefresh),
            (KeyCode::Char('+'), _) => Some(Message::IncreaseInterval),
            (KeyCode::Char('-'), _) => Some(Message::DecreaseInterval),
            (KeyCode::Char('i'), _) => Some(Message::EditInterval),
            (KeyCode::Char('n'), _) => Some(Message::EditIndex),
            (KeyCode::Char('r'), _) => Some(Message::RefreshNow),
            (KeyCode::Char('c'), _) => Some(Message::Clear),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left, _) | (KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right, _) | (KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Home, _) | (KeyCode::Char('g'), _) => Some(Message::MoveBeginning),
            (KeyCode::End, _) | (KeyCode::Char('G'), _) => Some(Message::MoveEnd),
            (KeyCode::Char('s'), _) => Some(Message::Sort),
            (KeyCode::Char('S'), _) => Some(Message::ResetSort),
            (KeyCode::Char('y'), _) => Some(Message::CopyRow),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

/// Reads terminal events on a dedicated thread. Stops once the receiver is
/// gone.
pub fn spawn_event_reader(event_poll_time: u64, tx: UnboundedSender<Event>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            if tx.is_closed() {
                return;
            }
            match event::poll(Duration::from_millis(event_poll_time)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Reading terminal event failed: {e}");
                        return;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    error!("Polling terminal events failed: {e}");
                    return;
                }
            }
        }
    })
}
