//! One-way notifications to the embedding process.
//!
//! The panel never waits on its host: every notification is fire-and-forget,
//! and a sink that fails is logged and otherwise ignored.

use std::fs::OpenOptions;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::NotifyTarget;

/// Notification payload. Both known commands carry an empty object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detail {}

/// `{"command": ..., "detail": {...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "detail")]
pub enum HostNotification {
    /// Periodic heartbeat, sent regardless of connection status.
    #[serde(rename = "tick")]
    Tick(Detail),
    /// Ask the host to resend the active document context.
    #[serde(rename = "send")]
    ResendContext(Detail),
}

impl HostNotification {
    pub fn tick() -> Self {
        Self::Tick(Detail::default())
    }

    pub fn resend_context() -> Self {
        Self::ResendContext(Detail::default())
    }

    pub fn command(&self) -> &'static str {
        match self {
            Self::Tick(_) => "tick",
            Self::ResendContext(_) => "send",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostBridgeError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("host is no longer listening")]
    Closed,

    #[error("failed to write notification: {0}")]
    Io(#[from] io::Error),
}

/// Somewhere notifications can be delivered.
pub trait HostSink: Send {
    fn notify(&mut self, notification: &HostNotification) -> Result<(), HostBridgeError>;
}

/// Writes one JSON object per line and flushes after each.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> HostSink for JsonLinesSink<W> {
    fn notify(&mut self, notification: &HostNotification) -> Result<(), HostBridgeError> {
        serde_json::to_writer(&mut self.writer, notification)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Delivers notifications to an in-process embedder.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<HostNotification>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<HostNotification>) -> Self {
        Self { tx }
    }
}

impl HostSink for ChannelSink {
    fn notify(&mut self, notification: &HostNotification) -> Result<(), HostBridgeError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| HostBridgeError::Closed)
    }
}

/// No parent: everything is dropped.
pub struct NoHost;

impl HostSink for NoHost {
    fn notify(&mut self, _notification: &HostNotification) -> Result<(), HostBridgeError> {
        Ok(())
    }
}

pub struct HostBridge {
    sink: Box<dyn HostSink>,
}

impl HostBridge {
    pub fn new(sink: impl HostSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    pub fn detached() -> Self {
        Self::new(NoHost)
    }

    /// Build the bridge a [`NotifyTarget`] asks for. Files are opened in
    /// append mode and created if missing.
    pub fn open(target: &NotifyTarget) -> Result<Self, HostBridgeError> {
        Ok(match target {
            NotifyTarget::None => Self::detached(),
            NotifyTarget::Stderr => Self::new(JsonLinesSink::new(io::stderr())),
            NotifyTarget::Path(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                debug!(path = %path.display(), "host notifications go to file");
                Self::new(JsonLinesSink::new(file))
            }
        })
    }

    pub fn tick(&mut self) {
        self.post(HostNotification::tick());
    }

    pub fn request_context(&mut self) {
        self.post(HostNotification::resend_context());
    }

    fn post(&mut self, notification: HostNotification) {
        trace!(command = notification.command(), "host notification");
        if let Err(e) = self.sink.notify(&notification) {
            debug!(command = notification.command(), error = %e, "host notification dropped");
        }
    }
}
