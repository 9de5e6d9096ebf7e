use std::fmt;

use tokio::sync::mpsc;

/// Identifies one transport handle. Every `connect()` allocates a fresh id,
/// and events carry the id of the handle that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The four reactions a transport handle reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    /// One text frame, verbatim.
    Message(String),
    Close,
    Error(String),
}

/// Where transports deliver their events.
pub type TransportEvents = mpsc::UnboundedSender<(ConnectionId, TransportEvent)>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
}

/// Creates connections to an endpoint URL.
pub trait Transport {
    type Handle: TransportHandle;

    fn open(&mut self, id: ConnectionId, url: &str) -> Self::Handle;
}

/// A live connection as seen by its single owner.
pub trait TransportHandle {
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Stop delivering events for this handle. Infallible and idempotent.
    fn detach(&mut self);

    fn close(&mut self) -> Result<(), TransportError>;
}
