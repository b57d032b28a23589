use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

/// Single line editor used for the interval and index prompts.
#[derive(Default)]
pub struct Inputter {
    text: String,
    cursor: usize, // in chars
    digits_only: bool,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub cursor: usize,
}

impl Inputter {
    /// Starts a new edit prefilled with `initial`.
    pub fn begin(&mut self, initial: &str, digits_only: bool) {
        self.clear();
        self.digits_only = digits_only;
        self.text = initial.to_string();
        self.cursor = self.text.chars().count();
    }

    pub fn read(&mut self, key: KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.finished = true,
            (KeyCode::Esc, _) => {
                self.clear();
                self.canceled = true;
                self.finished = true;
            }
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.cursor = self.cursor.saturating_sub(1),
            (KeyCode::Right, _) => self.cursor = (self.cursor + 1).min(self.len()),
            (KeyCode::Home, _) => self.cursor = 0,
            (KeyCode::End, _) => self.cursor = self.len(),
            (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => self.insert(c),
            other => trace!("Input ignores {other:?}"),
        }
        self.get()
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            input: self.text.clone(),
            finished: self.finished,
            canceled: self.canceled,
            cursor: self.cursor,
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.finished = false;
        self.canceled = false;
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn insert(&mut self, chr: char) {
        if self.digits_only && !chr.is_ascii_digit() {
            return;
        }
        let at = self.byte_pos(self.cursor);
        self.text.insert(at, chr);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_pos(self.cursor);
            self.text.remove(at);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.len() {
            let at = self.byte_pos(self.cursor);
            self.text.remove(at);
        }
    }

    fn byte_pos(&self, char_pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.text.len())
    }
}
