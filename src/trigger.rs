//! Refresh trigger: asks the server to emit rows for an index.
//!
//! Requests are fire-and-forget by default. Overlapping requests are neither
//! throttled nor cancelled; only success or failure is reported back to the
//! pane. [`Coalescing`] is the stricter alternative.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{LPError, Message, PaneId};
use crate::protocol::{TriggerBody, TriggerReply};

#[derive(Debug, Clone)]
pub struct RequestClient {
    client: reqwest::Client,
    url: Url,
}

impl RequestClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, LPError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// POSTs `{"index": .., "options": {}}`. Any 2xx is success.
    pub async fn request(&self, index: &str) -> Result<(), LPError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&TriggerBody::new(index))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let reason = response
            .json::<TriggerReply>()
            .await
            .ok()
            .and_then(|reply| reply.error);
        Err(LPError::RequestRejected {
            status: status.as_u16(),
            reason,
        })
    }
}

/// Decides how trigger requests are issued. Completion is reported with
/// [`Message::TriggerCompleted`].
pub trait TriggerPolicy: Send + Sync {
    fn submit(&self, pane: PaneId, index: String, tx: UnboundedSender<Message>);
}

pub struct FireAndForget {
    client: RequestClient,
}

impl FireAndForget {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }
}

impl TriggerPolicy for FireAndForget {
    fn submit(&self, pane: PaneId, index: String, tx: UnboundedSender<Message>) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let result = run_request(&client, &index).await;
            let _ = tx.send(Message::TriggerCompleted(pane, result));
        });
    }
}

/// Skips a request while another one for the same index is still running.
pub struct Coalescing {
    client: RequestClient,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Coalescing {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl TriggerPolicy for Coalescing {
    fn submit(&self, pane: PaneId, index: String, tx: UnboundedSender<Message>) {
        {
            let Ok(mut in_flight) = self.in_flight.lock() else {
                return;
            };
            if !in_flight.insert(index.clone()) {
                debug!("Request for {index} still in flight, skipped");
                return;
            }
        }
        let client = self.client.clone();
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let result = run_request(&client, &index).await;
            if let Ok(mut in_flight) = in_flight.lock() {
                in_flight.remove(&index);
            }
            let _ = tx.send(Message::TriggerCompleted(pane, result));
        });
    }
}

async fn run_request(client: &RequestClient, index: &str) -> Result<(), String> {
    client.request(index).await.map_err(|e| {
        warn!("Refresh request for {index} failed: {e}");
        e.to_string()
    })
}
