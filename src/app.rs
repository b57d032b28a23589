use std::collections::HashMap;
use std::sync::Arc;

use ratatui::DefaultTerminal;
use ratatui::crossterm::event::Event;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::channel::{ChannelHandle, PushChannel};
use crate::config::AppConfig;
use crate::controller::{Controller, spawn_event_reader};
use crate::domain::{Effect, LPError, Message, PaneId};
use crate::model::{Model, Status};
use crate::timer::RefreshTimer;
use crate::trigger::{Coalescing, FireAndForget, RequestClient, TriggerPolicy};
use crate::ui::TableUI;

/// Executes pane effects: owns the timer and socket of every pane.
pub struct Runtime {
    config: AppConfig,
    trigger: Arc<dyn TriggerPolicy>,
    timers: HashMap<PaneId, RefreshTimer>,
    channels: HashMap<PaneId, ChannelHandle>,
    tx: UnboundedSender<Message>,
}

impl Runtime {
    pub fn new(config: &AppConfig, tx: UnboundedSender<Message>) -> Result<Self, LPError> {
        let client = RequestClient::new(config.request_url.clone(), config.request_timeout)?;
        let trigger: Arc<dyn TriggerPolicy> = if config.coalesce {
            Arc::new(Coalescing::new(client))
        } else {
            Arc::new(FireAndForget::new(client))
        };
        Ok(Self::with_trigger(config, trigger, tx))
    }

    pub fn with_trigger(
        config: &AppConfig,
        trigger: Arc<dyn TriggerPolicy>,
        tx: UnboundedSender<Message>,
    ) -> Self {
        Self {
            config: config.clone(),
            trigger,
            timers: HashMap::new(),
            channels: HashMap::new(),
            tx,
        }
    }

    pub async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            debug!("Effect: {effect:?}");
            match effect {
                Effect::OpenChannel(pane) => {
                    if let Some(old) = self.channels.remove(&pane) {
                        old.close().await;
                    }
                    let channel =
                        PushChannel::new(pane, self.config.ws_url.clone(), self.config.reconnect);
                    self.channels.insert(pane, channel.open(self.tx.clone()));
                }
                Effect::CloseChannel(pane) => {
                    if let Some(channel) = self.channels.remove(&pane) {
                        debug!(
                            "Closing channel of pane {pane}, connected: {}, last index: {:?}",
                            channel.is_connected(),
                            channel.last_message().map(|m| m.index().to_string())
                        );
                        channel.close().await;
                    }
                }
                Effect::StartTimer(pane, period) => {
                    let timer = self.timers.entry(pane).or_default();
                    if timer.is_running() {
                        debug!("Restarting timer of pane {pane}");
                    }
                    timer.start(pane, period, self.tx.clone());
                }
                Effect::StopTimer(pane) => {
                    if let Some(timer) = self.timers.get_mut(&pane) {
                        timer.stop();
                    }
                }
                Effect::Trigger(pane, index) => self.trigger.submit(pane, index, self.tx.clone()),
            }
        }
    }
}

#[cfg(test)]
impl Runtime {
    fn timer_running(&self, pane: PaneId) -> bool {
        self.timers.get(&pane).is_some_and(RefreshTimer::is_running)
    }

    fn channel(&self, pane: PaneId) -> Option<&ChannelHandle> {
        self.channels.get(&pane)
    }
}

pub struct App {
    model: Model,
    runtime: Runtime,
    controller: Controller,
    ui: TableUI,
    rx: UnboundedReceiver<Message>,
}

impl App {
    pub fn new(config: &AppConfig) -> Result<Self, LPError> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            model: Model::init(config),
            runtime: Runtime::new(config, tx)?,
            controller: Controller::new(),
            ui: TableUI::new(),
            rx,
        })
    }

    pub async fn run(mut self, terminal: &mut DefaultTerminal) -> Result<(), LPError> {
        let (event_tx, mut events) = mpsc::unbounded_channel::<Event>();
        let reader = spawn_event_reader(self.runtime.config.event_poll_time, event_tx);

        let size = terminal.size()?;
        self.model.update(Message::Resize(size.height as usize));
        let effects = self.model.mount();
        self.runtime.apply(effects).await;

        while self.model.status != Status::QUITTING {
            terminal.draw(|f| self.ui.draw(&self.model.get_uidata(), f))?;

            let message = tokio::select! {
                Some(message) = self.rx.recv() => Some(message),
                Some(event) = events.recv() => self.controller.handle_event(&self.model, event),
                else => break,
            };
            if let Some(message) = message {
                let effects = self.model.update(message);
                self.runtime.apply(effects).await;
            }
        }

        for pane in self.model.panes() {
            info!("Closing pane {} with {} rows", pane.index(), pane.row_count());
        }
        let effects = self.model.dispose();
        self.runtime.apply(effects).await;
        drop(events);
        let _ = reader.join();
        Ok(())
    }
}
