use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

/// A row as produced by the server. Key order is kept as received.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowsMessage {
    pub index: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "rows")]
    Rows(RowsMessage),
}

impl PushMessage {
    /// Decodes one push payload. Unknown message types and malformed payloads
    /// yield `None`.
    pub fn decode(text: &str) -> Option<PushMessage> {
        match serde_json::from_str(text) {
            Ok(message) => Some(message),
            Err(e) => {
                trace!("Dropped push payload ({e}): {text:.120}");
                None
            }
        }
    }

    pub fn index(&self) -> &str {
        match self {
            PushMessage::Rows(m) => &m.index,
        }
    }
}

impl RowsMessage {
    /// Declared columns win, otherwise the key order of the first row.
    pub fn resolve_columns(&self) -> Vec<String> {
        match &self.columns {
            Some(columns) if !columns.is_empty() => columns.clone(),
            _ => self
                .rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// Body of the refresh trigger request.
#[derive(Debug, Serialize)]
pub struct TriggerBody<'a> {
    pub index: &'a str,
    pub options: Map<String, Value>,
}

impl<'a> TriggerBody<'a> {
    pub fn new(index: &'a str) -> Self {
        Self {
            index,
            options: Map::new(),
        }
    }
}

/// Rejection body returned by the server on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct TriggerReply {
    #[serde(default)]
    pub error: Option<String>,
}
