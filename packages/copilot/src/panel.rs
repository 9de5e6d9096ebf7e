//! The panel: one cooperative loop that owns every piece of widget state.
//!
//! Transport events, frontend input, timers and the host tick are all
//! multiplexed onto a single task, so nothing here needs a lock. Timers are
//! spawned sleeps that post a [`PanelEvent`] back into the loop when they
//! fire; they are never cancelled.

use std::io;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::PanelConfig;
use crate::connection::{
    ConnectionId, ConnectionManager, Endpoint, Reaction, Status, Transport, TransportEvent,
    TransportEvents,
};
use crate::host_bridge::HostBridge;
use crate::input::{InputAction, InputField, KeyInput};
use crate::transcript::{Origin, Transcript};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Key(KeyInput),
    /// A complete line from a line-oriented frontend, submitted as typed.
    Line(String),
    /// The input gained focus.
    Focus,
    /// Terminal resized or otherwise needs repainting.
    Redraw,
    /// Content supplied by the host, forwarded to the server without echo.
    HostText(String),
    ReconnectDue,
    ClearInput,
    Quit,
}

/// Cloneable handle for talking to a running panel from other tasks or threads.
#[derive(Clone)]
pub struct PanelHandle {
    events: mpsc::UnboundedSender<PanelEvent>,
    status: watch::Receiver<Status>,
}

impl PanelHandle {
    /// Returns false once the panel has stopped.
    pub fn post(&self, event: PanelEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.post(PanelEvent::HostText(text.into()))
    }

    pub fn quit(&self) {
        let _ = self.events.send(PanelEvent::Quit);
    }

    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }
}

/// What a frontend needs to paint one frame.
pub struct PanelView<'a> {
    pub status: Status,
    pub endpoint: &'a Endpoint,
    pub input: &'a InputField,
    pub transcript: &'a Transcript,
}

pub trait Frontend {
    fn draw(&mut self, view: &PanelView<'_>) -> io::Result<()>;
}

pub struct Panel<T: Transport> {
    connection: ConnectionManager<T>,
    input: InputField,
    transcript: Transcript,
    host: HostBridge,
    tick_interval: Duration,
    clear_delay: Duration,
    transport_rx: mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>,
    events_tx: mpsc::UnboundedSender<PanelEvent>,
    events_rx: mpsc::UnboundedReceiver<PanelEvent>,
}

impl<T: Transport> Panel<T> {
    /// `make_transport` receives the channel the transport must deliver its
    /// events into.
    pub fn new(
        config: &PanelConfig,
        host: HostBridge,
        make_transport: impl FnOnce(TransportEvents) -> T,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::new(
            make_transport(transport_tx),
            config.endpoint.clone(),
            config.backoff.clone(),
        );
        Self {
            connection,
            input: InputField::new(),
            transcript: Transcript::new(),
            host,
            tick_interval: config.tick_interval,
            clear_delay: config.clear_delay,
            transport_rx,
            events_tx,
            events_rx,
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn handle(&self) -> PanelHandle {
        PanelHandle {
            events: self.events_tx.clone(),
            status: self.connection.subscribe(),
        }
    }

    pub fn view(&self) -> PanelView<'_> {
        PanelView {
            status: self.connection.status(),
            endpoint: self.connection.endpoint(),
            input: &self.input,
            transcript: &self.transcript,
        }
    }

    /// Connect and process events until [`PanelEvent::Quit`]. The frontend is
    /// redrawn after every handled event. The transport is torn down on exit.
    pub async fn run<F: Frontend>(mut self, frontend: &mut F) -> io::Result<()> {
        info!(endpoint = %self.connection.endpoint().url(), "panel starting");
        self.connection.connect();
        frontend.draw(&self.view())?;

        let mut tick = tokio::time::interval_at(
            Instant::now() + self.tick_interval,
            self.tick_interval,
        );
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some((id, event)) = self.transport_rx.recv() => {
                    self.on_transport_event(id, event);
                }
                Some(event) = self.events_rx.recv() => {
                    if event == PanelEvent::Quit {
                        break;
                    }
                    self.on_panel_event(event);
                }
                _ = tick.tick() => {
                    self.host.tick();
                    continue;
                }
            }
            frontend.draw(&self.view())?;
        }

        info!("panel stopping");
        self.connection.disconnect();
        Ok(())
    }

    fn on_transport_event(&mut self, id: ConnectionId, event: TransportEvent) {
        match self.connection.handle_event(id, event) {
            Some(Reaction::Opened) | None => {}
            Some(Reaction::Inbound(payload)) => {
                self.transcript.append(Origin::Inbound, &payload);
            }
            Some(Reaction::Lost { retry_in }) => {
                self.schedule(retry_in, PanelEvent::ReconnectDue);
            }
        }
        self.sync_input();
    }

    fn on_panel_event(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::Key(key) => {
                if let InputAction::Submit(text) = self.input.handle_key(key) {
                    if self.submit(&text) {
                        self.schedule(self.clear_delay, PanelEvent::ClearInput);
                    }
                }
            }
            PanelEvent::Line(text) => {
                if self.input.is_enabled() {
                    self.submit(&text);
                } else {
                    warn!(status = %self.connection.status(), "line dropped while not connected");
                }
            }
            PanelEvent::Focus => self.host.request_context(),
            PanelEvent::HostText(text) => {
                if let Err(e) = self.connection.send(&text) {
                    debug!(error = %e, "host content not forwarded");
                }
            }
            PanelEvent::ReconnectDue => {
                self.connection.resume_after_backoff();
                self.sync_input();
            }
            PanelEvent::ClearInput => self.input.clear(),
            PanelEvent::Redraw | PanelEvent::Quit => {}
        }
    }

    /// Send then echo. Returns whether the text went out.
    fn submit(&mut self, text: &str) -> bool {
        match self.connection.send(text) {
            Ok(()) => {
                self.transcript.append(Origin::Echo, text);
                true
            }
            Err(e) => {
                warn!(error = %e, "message not sent");
                false
            }
        }
    }

    fn sync_input(&mut self) {
        self.input
            .set_enabled(self.connection.status().is_connected());
    }

    fn schedule(&self, delay: Duration, event: PanelEvent) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }
}
