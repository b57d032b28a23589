use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::domain::{Message, PaneId};

/// Periodic [`Message::Tick`] source of one pane.
///
/// The first tick fires one period after start; the pane issues the immediate
/// request itself when the timer is (re)started.
#[derive(Debug, Default)]
pub struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    /// Starts ticking every `period`, cancelling a running timer first.
    pub fn start(&mut self, pane: PaneId, period: Duration, tx: UnboundedSender<Message>) {
        self.stop();
        debug!("Timer for pane {pane} started with {period:?}");
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Message::Tick(pane)).is_err() {
                    return;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
