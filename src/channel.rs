//! Push channel client. One websocket per pane, opened on mount and closed on
//! dispose. Decoded messages are forwarded to the model as [`Message::Push`].

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::http_origin;
use crate::domain::{LPError, Message, PaneId};
use crate::protocol::PushMessage;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Handle to a running push channel task.
#[derive(Debug)]
pub struct ChannelHandle {
    shutdown: watch::Sender<bool>,
    connected: watch::Receiver<bool>,
    last_message: watch::Receiver<Option<PushMessage>>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Most recently decoded message, whatever index it was addressed to.
    pub fn last_message(&self) -> Option<PushMessage> {
        self.last_message.borrow().clone()
    }

    /// Asks the task to close the socket and waits for it to finish.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[derive(Debug, Clone)]
pub struct PushChannel {
    pane: PaneId,
    url: Url,
    reconnect: bool,
}

impl PushChannel {
    pub fn new(pane: PaneId, url: Url, reconnect: bool) -> Self {
        Self {
            pane,
            url,
            reconnect,
        }
    }

    pub fn open(self, tx: UnboundedSender<Message>) -> ChannelHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (connected_tx, connected) = watch::channel(false);
        let (last_tx, last_message) = watch::channel(None);
        let task = tokio::spawn(async move {
            self.run(tx, shutdown_rx, connected_tx, last_tx).await;
        });
        ChannelHandle {
            shutdown,
            connected,
            last_message,
            task,
        }
    }

    async fn run(
        self,
        tx: UnboundedSender<Message>,
        mut shutdown: watch::Receiver<bool>,
        connected: watch::Sender<bool>,
        last_message: watch::Sender<Option<PushMessage>>,
    ) {
        let mut backoff = Backoff::default();
        loop {
            let _ = tx.send(Message::ChannelConnecting(self.pane));
            let connect = tokio::select! {
                _ = shutdown.changed() => return,
                c = self.connect() => c,
            };
            match connect {
                Ok(mut ws) => {
                    backoff.reset();
                    info!("Pane {} push channel open: {}", self.pane, self.url);
                    let _ = connected.send(true);
                    let _ = tx.send(Message::ChannelOpened(self.pane));
                    let closing = loop {
                        tokio::select! {
                            _ = shutdown.changed() => break true,
                            frame = ws.next() => match frame {
                                Some(Ok(frame)) => {
                                    if let Some(message) = decode_frame(frame) {
                                        let _ = last_message.send(Some(message.clone()));
                                        let _ = tx.send(Message::Push(self.pane, message));
                                    }
                                }
                                Some(Err(e)) => {
                                    debug!("Pane {} push channel error: {e}", self.pane);
                                    break false;
                                }
                                None => break false,
                            },
                        }
                    };
                    if closing {
                        let _ = ws.close(None).await;
                    }
                    let _ = connected.send(false);
                    let _ = tx.send(Message::ChannelClosed(self.pane));
                    info!("Pane {} push channel closed", self.pane);
                    if closing {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Pane {} push channel connect failed: {e}", self.pane);
                    let _ = tx.send(Message::ChannelClosed(self.pane));
                }
            }

            if !self.reconnect {
                return;
            }
            let delay = backoff.next_delay();
            debug!("Pane {} reconnecting in {delay:?}", self.pane);
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(
        &self,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        LPError,
    > {
        let mut request = self.url.as_str().into_client_request()?;
        let origin = HeaderValue::from_str(&http_origin(&self.url))
            .map_err(|e| LPError::Config(format!("origin header: {e}")))?;
        request.headers_mut().insert("Origin", origin);
        let (ws, _) = connect_async(request).await?;
        Ok(ws)
    }
}

fn decode_frame(frame: WsMessage) -> Option<PushMessage> {
    match frame {
        WsMessage::Text(text) => PushMessage::decode(&text),
        WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => PushMessage::decode(&text),
            Err(_) => {
                trace!("Dropped non utf-8 binary frame");
                None
            }
        },
        _ => None,
    }
}

/// Reconnect delay: doubles per failed attempt up to [`BACKOFF_MAX`], back to
/// [`BACKOFF_START`] once a connection opens.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            current: BACKOFF_START,
        }
    }
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.current = BACKOFF_START;
    }
}
