use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace};

use crate::config::AppConfig;
use crate::domain::{CMDMode, Effect, HELP_TEXT, INTERVAL_STEP_MS, LPError, Message, PaneId};
use crate::inputter::{InputResult, Inputter};
use crate::pane::{ConnectionState, Pane, PaneView};
use crate::ui::{PANE_CHROME_HEIGHT, STATUSLINE_HEIGHT};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

/// Everything the ui needs for one frame.
pub struct UIData {
    pub panes: Vec<PaneView>,
    pub focused: PaneId,
    pub show_popup: bool,
    pub popup_message: String,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

pub struct Model {
    pub status: Status,
    modus: Modus,
    panes: Vec<Pane>,
    focused: PaneId,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    popup_message: String,
    status_message: String,
    clipboard: Option<Clipboard>,
    ui_height: usize,
}

impl Model {
    pub fn init(config: &AppConfig) -> Self {
        let panes = config
            .panes
            .iter()
            .enumerate()
            .map(|(id, cfg)| Pane::new(id, cfg))
            .collect();
        Self {
            status: Status::READY,
            modus: Modus::TABLE,
            panes,
            focused: 0,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            popup_message: String::new(),
            status_message: "Started livepane!".to_string(),
            clipboard: None,
            ui_height: 0,
        }
    }

    /// Mounts every pane. Returns the effects that bring them to life.
    pub fn mount(&mut self) -> Vec<Effect> {
        self.set_status_message("running");
        self.panes.iter_mut().flat_map(|p| p.mount()).collect()
    }

    pub fn dispose(&mut self) -> Vec<Effect> {
        self.panes.iter_mut().flat_map(|p| p.dispose()).collect()
    }

    pub fn update(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::Tick(pane) => self.pane_mut(pane).and_then(Pane::tick).into_iter().collect(),
            Message::Push(pane, push) => {
                let index = push.index().to_string();
                if let Some(p) = self.pane_mut(pane)
                    && p.receive_push(push)
                {
                    let msg = format!("{} | index {index}: {} rows", p.title(), p.row_count());
                    self.set_status_message(msg);
                }
                Vec::new()
            }
            Message::ChannelConnecting(pane) => {
                self.set_connection(pane, ConnectionState::Connecting)
            }
            Message::ChannelOpened(pane) => self.set_connection(pane, ConnectionState::Connected),
            Message::ChannelClosed(pane) => {
                self.set_connection(pane, ConnectionState::Disconnected)
            }
            Message::TriggerCompleted(pane, result) => {
                if let Some(p) = self.pane_mut(pane) {
                    p.on_trigger_completed(result);
                }
                Vec::new()
            }
            Message::Resize(height) => {
                self.ui_height = height;
                Vec::new()
            }
            msg => self.handle_input(msg),
        }
    }

    fn handle_input(&mut self, msg: Message) -> Vec<Effect> {
        trace!("Input in {:?}: {msg:?}", self.modus);
        match self.modus {
            Modus::TABLE => self.handle_table_input(msg),
            Modus::POPUP => {
                match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help => self.modus = Modus::TABLE,
                    _ => (),
                }
                Vec::new()
            }
            Modus::CMDINPUT => match msg {
                Message::RawKey(key) => self.raw_input(key),
                _ => Vec::new(),
            },
        }
    }

    fn handle_table_input(&mut self, msg: Message) -> Vec<Effect> {
        let page = self.page_size();
        let focused = self.focused;
        let Some(pane) = self.panes.get_mut(focused) else {
            if let Message::Quit = msg {
                self.quit();
            }
            return Vec::new();
        };
        match msg {
            Message::Quit => self.quit(),
            Message::FocusNext => self.focus((focused + 1) % self.panes.len()),
            Message::FocusPrev => {
                self.focus((focused + self.panes.len() - 1) % self.panes.len())
            }
            Message::ToggleAutoRefresh => return pane.toggle_auto_refresh(),
            Message::IncreaseInterval => {
                let ms = pane.interval_ms() + INTERVAL_STEP_MS;
                return pane.set_interval(ms);
            }
            Message::DecreaseInterval => {
                let ms = pane.interval_ms().saturating_sub(INTERVAL_STEP_MS);
                return pane.set_interval(ms);
            }
            Message::RefreshNow => return pane.refresh_now(),
            Message::Clear => pane.clear(),
            Message::MoveUp => pane.move_selection_up(1),
            Message::MoveDown => pane.move_selection_down(1),
            Message::MovePageUp => pane.move_selection_up(page),
            Message::MovePageDown => pane.move_selection_down(page),
            Message::MoveLeft => pane.move_selection_left(),
            Message::MoveRight => pane.move_selection_right(),
            Message::MoveBeginning => pane.move_selection_beginning(),
            Message::MoveEnd => pane.move_selection_end(),
            Message::Sort => pane.sort_by_selected(),
            Message::ResetSort => pane.reset_sort(),
            Message::CopyRow => self.copy_selected_row(),
            Message::EditInterval => {
                let current = pane.interval_ms().to_string();
                self.enter_cmd_mode(CMDMode::Interval, &current);
            }
            Message::EditIndex => {
                let current = pane.index().to_string();
                self.enter_cmd_mode(CMDMode::Index, &current);
            }
            Message::Help => self.show_help(),
            _ => (),
        }
        Vec::new()
    }

    // -------------------- Control handling functions ---------------------- //

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    fn focus(&mut self, pane: PaneId) {
        self.focused = pane;
        if let Some(p) = self.panes.get(pane) {
            debug!(
                "Focus on pane {pane} ({}, auto refresh {}, connected {})",
                p.index(),
                p.auto_refresh(),
                p.connected()
            );
        }
    }

    fn show_help(&mut self) {
        self.popup_message = HELP_TEXT.to_string();
        self.modus = Modus::POPUP;
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, initial: &str) {
        self.input.begin(initial, mode == CMDMode::Interval);
        self.last_input = self.input.get();
        self.cmd_mode = Some(mode);
        self.modus = Modus::CMDINPUT;
    }

    fn raw_input(&mut self, key: KeyEvent) -> Vec<Effect> {
        self.last_input = self.input.read(key);
        if !self.last_input.finished {
            return Vec::new();
        }
        let mode = self.cmd_mode.take();
        self.modus = Modus::TABLE;
        let input = std::mem::take(&mut self.last_input);
        self.input.clear();
        if input.canceled {
            return Vec::new();
        }
        let focused = self.focused;
        let Some(pane) = self.panes.get_mut(focused) else {
            return Vec::new();
        };
        match mode {
            Some(CMDMode::Interval) => match input.input.parse::<u64>() {
                Ok(ms) => pane.set_interval(ms),
                Err(_) => {
                    pane.set_status_message(format!("invalid interval '{}'", input.input));
                    Vec::new()
                }
            },
            Some(CMDMode::Index) if !input.input.trim().is_empty() => pane.rebind(&input.input),
            Some(CMDMode::Index) => {
                pane.set_status_message("index must not be empty");
                Vec::new()
            }
            None => {
                info!("Cmd mode is none!");
                Vec::new()
            }
        }
    }

    fn copy_selected_row(&mut self) {
        let Some(text) = self.panes.get(self.focused).and_then(Pane::selected_row_text) else {
            self.set_status_message("nothing to copy");
            return;
        };
        match self.copy_to_clipboard(text) {
            Ok(()) => self.set_status_message("copied row to clipboard"),
            Err(e) => {
                error!("Copy failed: {e}");
                self.set_status_message(e.to_string());
            }
        }
    }

    fn copy_to_clipboard(&mut self, text: String) -> Result<(), LPError> {
        if self.clipboard.is_none() {
            let clipboard = Clipboard::new().map_err(|e| LPError::Clipboard(e.to_string()))?;
            self.clipboard = Some(clipboard);
        }
        match self.clipboard.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text)
                .map_err(|e| LPError::Clipboard(e.to_string())),
            None => Err(LPError::Clipboard("unavailable".to_string())),
        }
    }

    fn set_connection(&mut self, pane: PaneId, state: ConnectionState) -> Vec<Effect> {
        if let Some(p) = self.pane_mut(pane) {
            p.set_connection(state);
        }
        Vec::new()
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    fn pane_mut(&mut self, pane: PaneId) -> Option<&mut Pane> {
        let p = self.panes.get_mut(pane);
        if p.is_none() {
            error!("Message for unknown pane {pane}!");
        }
        p
    }

    fn page_size(&self) -> usize {
        let panes = self.panes.len().max(1);
        (self.ui_height.saturating_sub(STATUSLINE_HEIGHT) / panes)
            .saturating_sub(PANE_CHROME_HEIGHT)
            .max(1)
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn get_uidata(&self) -> UIData {
        UIData {
            panes: self.panes.iter().map(Pane::render).collect(),
            focused: self.focused,
            show_popup: self.modus == Modus::POPUP,
            popup_message: self.popup_message.clone(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.modus == Modus::CMDINPUT,
            status_message: self.status_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Args};
    use crate::protocol::PushMessage;
    use clap::Parser;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::time::Duration;

    fn model() -> Model {
        let args = Args::parse_from(["livepane"]);
        Model::init(&AppConfig::from_args(&args).unwrap())
    }

    fn push(index: &str, n: usize) -> PushMessage {
        let rows: Vec<_> = (0..n).map(|i| serde_json::json!({"ts": i, "v": i})).collect();
        PushMessage::decode(
            &serde_json::json!({"type": "rows", "index": index, "rows": rows}).to_string(),
        )
        .unwrap()
    }

    fn key(code: KeyCode) -> Message {
        Message::RawKey(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn mount_starts_both_panes() {
        let mut m = model();
        let effects = m.mount();
        assert_eq!(
            effects,
            vec![
                Effect::OpenChannel(0),
                Effect::StartTimer(0, Duration::from_millis(1000)),
                Effect::Trigger(0, "ds_top".into()),
                Effect::OpenChannel(1),
                Effect::StartTimer(1, Duration::from_millis(1000)),
                Effect::Trigger(1, "ds_bottom".into()),
            ]
        );
        assert_eq!(
            m.dispose(),
            vec![
                Effect::StopTimer(0),
                Effect::CloseChannel(0),
                Effect::StopTimer(1),
                Effect::CloseChannel(1),
            ]
        );
    }

    #[test]
    fn push_reaches_only_matching_pane() {
        let mut m = model();
        m.mount();
        // Each pane has its own socket and sees every message.
        m.update(Message::Push(0, push("ds_bottom", 4)));
        m.update(Message::Push(1, push("ds_bottom", 4)));
        assert_eq!(m.panes()[0].row_count(), 0);
        assert_eq!(m.panes()[1].row_count(), 4);
        assert_eq!(m.get_uidata().status_message, "ds_bottom | index ds_bottom: 4 rows");
    }

    #[test]
    fn keys_act_on_focused_pane() {
        let mut m = model();
        m.mount();
        m.update(Message::FocusNext);
        assert_eq!(m.update(Message::ToggleAutoRefresh), vec![Effect::StopTimer(1)]);
        assert!(m.panes()[0].auto_refresh());
        m.update(Message::FocusNext);
        assert_eq!(m.get_uidata().focused, 0);
        m.update(Message::FocusPrev);
        assert_eq!(m.get_uidata().focused, 1);
        assert_eq!(m.update(Message::Tick(1)), vec![]);
        assert_eq!(
            m.update(Message::Tick(0)),
            vec![Effect::Trigger(0, "ds_top".into())]
        );
    }

    #[test]
    fn interval_keys_step_and_clamp() {
        let mut m = model();
        m.mount();
        let effects = m.update(Message::IncreaseInterval);
        assert_eq!(effects[0], Effect::StartTimer(0, Duration::from_millis(1100)));
        for _ in 0..20 {
            m.update(Message::DecreaseInterval);
        }
        assert_eq!(m.panes()[0].interval_ms(), 200);
    }

    #[test]
    fn interval_prompt() {
        let mut m = model();
        m.mount();
        m.update(Message::EditInterval);
        assert!(m.raw_keyevents());
        assert_eq!(m.get_uidata().cmdinput.input, "1000");
        for _ in 0..4 {
            m.update(key(KeyCode::Backspace));
        }
        for c in "250".chars() {
            m.update(key(KeyCode::Char(c)));
        }
        let effects = m.update(key(KeyCode::Enter));
        assert_eq!(
            effects,
            vec![
                Effect::StartTimer(0, Duration::from_millis(250)),
                Effect::Trigger(0, "ds_top".into()),
            ]
        );
        assert!(!m.raw_keyevents());
    }

    #[test]
    fn index_prompt_rebinds_and_escape_cancels() {
        let mut m = model();
        m.mount();
        m.update(Message::EditIndex);
        m.update(key(KeyCode::Esc));
        assert_eq!(m.panes()[0].index(), "ds_top");

        m.update(Message::EditIndex);
        m.update(key(KeyCode::Char('2')));
        let effects = m.update(key(KeyCode::Enter));
        assert_eq!(effects, vec![Effect::Trigger(0, "ds_top2".into())]);
        assert_eq!(m.panes()[0].index(), "ds_top2");
    }

    #[test]
    fn connection_messages_update_indicator() {
        let mut m = model();
        m.update(Message::ChannelConnecting(1));
        assert_eq!(m.get_uidata().panes[1].connection, ConnectionState::Connecting);
        m.update(Message::ChannelOpened(1));
        assert!(m.panes()[1].connected());
        m.update(Message::ChannelClosed(1));
        assert_eq!(m.get_uidata().panes[1].connection, ConnectionState::Disconnected);
        // unknown panes are ignored
        assert!(m.update(Message::ChannelOpened(9)).is_empty());
    }

    #[test]
    fn help_popup_and_quit() {
        let mut m = model();
        m.update(Message::Help);
        assert!(m.get_uidata().show_popup);
        m.update(Message::Clear);
        m.update(Message::Exit);
        assert!(!m.get_uidata().show_popup);
        m.update(Message::Quit);
        assert_eq!(m.status, Status::QUITTING);
    }

    #[test]
    fn failed_trigger_shows_on_pane() {
        let mut m = model();
        m.update(Message::TriggerCompleted(0, Err("HTTP 500".into())));
        assert_eq!(m.get_uidata().panes[0].status_message, "refresh failed: HTTP 500");
    }
}
