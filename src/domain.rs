use std::fmt;
use std::io::Error;
use std::time::Duration;

use ratatui::crossterm::event::KeyEvent;
use tokio_tungstenite::tungstenite;

use crate::protocol::PushMessage;

/// Position of a pane inside the model. Panes never move once mounted.
pub type PaneId = usize;

pub const MIN_INTERVAL_MS: u64 = 200;
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const INTERVAL_STEP_MS: u64 = 100;
pub const DEFAULT_MAX_ROWS: usize = 300;

pub const HELP_TEXT: &str = "\
q        quit
Tab      focus next pane (Shift-Tab previous)
a        toggle auto refresh
+ / -    auto refresh interval +/- 100ms
i        enter auto refresh interval
n        bind pane to another index
r        refresh now
c        clear table
arrows   move selection
Home/End first/last row (End follows new rows)
s        sort by selected column (again to flip)
S        reset sort
y        copy selected row
?        this help
Esc      close popup / cancel input";

#[derive(Debug)]
pub enum LPError {
    IoError(Error),
    Http(reqwest::Error),
    WebSocket(tungstenite::Error),
    InvalidUrl(url::ParseError),
    RequestRejected { status: u16, reason: Option<String> },
    Config(String),
    Clipboard(String),
}

impl fmt::Display for LPError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LPError::IoError(e) => write!(f, "io error: {e}"),
            LPError::Http(e) => write!(f, "network error: {e}"),
            LPError::WebSocket(e) => write!(f, "push channel error: {e}"),
            LPError::InvalidUrl(e) => write!(f, "invalid url: {e}"),
            LPError::RequestRejected {
                status,
                reason: Some(reason),
            } => write!(f, "HTTP {status} ({reason})"),
            LPError::RequestRejected {
                status,
                reason: None,
            } => write!(f, "HTTP {status}"),
            LPError::Config(msg) => write!(f, "configuration error: {msg}"),
            LPError::Clipboard(msg) => write!(f, "clipboard error: {msg}"),
        }
    }
}

impl std::error::Error for LPError {}

impl From<Error> for LPError {
    fn from(err: Error) -> Self {
        LPError::IoError(err)
    }
}

impl From<reqwest::Error> for LPError {
    fn from(err: reqwest::Error) -> Self {
        LPError::Http(err)
    }
}

impl From<tungstenite::Error> for LPError {
    fn from(err: tungstenite::Error) -> Self {
        LPError::WebSocket(err)
    }
}

impl From<url::ParseError> for LPError {
    fn from(err: url::ParseError) -> Self {
        LPError::InvalidUrl(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Interval,
    Index,
}

/// Everything that can change the model: user input mapped by the controller
/// and events produced by the network tasks.
#[derive(Debug, Clone)]
pub enum Message {
    Quit,
    FocusNext,
    FocusPrev,
    ToggleAutoRefresh,
    IncreaseInterval,
    DecreaseInterval,
    EditInterval,
    EditIndex,
    RefreshNow,
    Clear,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    Sort,
    ResetSort,
    CopyRow,
    Help,
    Exit,
    RawKey(KeyEvent),
    Resize(usize),

    Tick(PaneId),
    Push(PaneId, PushMessage),
    ChannelConnecting(PaneId),
    ChannelOpened(PaneId),
    ChannelClosed(PaneId),
    TriggerCompleted(PaneId, Result<(), String>),
}

/// Side effects requested by a pane. The runtime in `app` executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenChannel(PaneId),
    CloseChannel(PaneId),
    StartTimer(PaneId, Duration),
    StopTimer(PaneId),
    Trigger(PaneId, String),
}
