//! ConnectionManager: owns the single transport to the assistant server.
//!
//! At most one handle is live at a time. Every teardown detaches the handle
//! before closing it, and events tagged with a superseded [`ConnectionId`] are
//! dropped. Closure and error are both treated as transient: the manager
//! always schedules another attempt, with a linear backoff capped by
//! [`BackoffPolicy::max`].

mod backoff;
mod transport;
mod ws;

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

pub use backoff::{Backoff, BackoffPolicy};
pub use transport::{
    ConnectionId, Transport, TransportError, TransportEvent, TransportEvents, TransportHandle,
};
pub use ws::{WsHandle, WsTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl Status {
    /// The status signal: input is only enabled while this is true.
    pub fn is_connected(self) -> bool {
        self == Status::Connected
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Disconnected => "disconnected",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
        })
    }
}

/// The fixed server address: plain `ws://`, no path, no query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 9001;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("ws://[{}]:{}", self.host, self.port)
        } else {
            format!("ws://{}:{}", self.host, self.port)
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HOST, Self::DEFAULT_PORT)
    }
}

/// What the owner of the manager has to act on after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Opened,
    /// Payload for the renderer, untouched.
    Inbound(String),
    /// The connection is gone; call [`ConnectionManager::resume_after_backoff`]
    /// once `retry_in` has elapsed.
    Lost { retry_in: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct ConnectionManager<T: Transport> {
    transport: T,
    endpoint: Endpoint,
    handle: Option<(ConnectionId, T::Handle)>,
    next_id: u64,
    backoff: Backoff,
    status: watch::Sender<Status>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, endpoint: Endpoint, policy: BackoffPolicy) -> Self {
        let (status, _) = watch::channel(Status::Disconnected);
        Self {
            transport,
            endpoint,
            handle: None,
            next_id: 0,
            backoff: Backoff::new(policy),
            status,
        }
    }

    /// Open a new transport, tearing down any existing one first.
    pub fn connect(&mut self) {
        if self.handle.is_some() {
            self.disconnect();
        }
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let url = self.endpoint.url();
        info!(%id, %url, "connecting");
        let handle = self.transport.open(id, &url);
        self.handle = Some((id, handle));
        self.set_status(Status::Connecting);
    }

    /// Detach and close the current handle, if any. Close failures are
    /// swallowed. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some((id, mut handle)) = self.handle.take() {
            handle.detach();
            if let Err(e) = handle.close() {
                debug!(%id, error = %e, "close failed during teardown");
            }
            debug!(%id, "transport torn down");
        }
        self.set_status(Status::Disconnected);
    }

    /// Tear down and advance the backoff. Returns how long to wait before
    /// [`resume_after_backoff`](Self::resume_after_backoff).
    pub fn reconnect(&mut self) -> Duration {
        self.disconnect();
        let delay = self.backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "attempting to reconnect");
        delay
    }

    /// Fired when a scheduled backoff elapses. Tears down again in case a
    /// `connect()` ran in the meantime, then connects.
    pub fn resume_after_backoff(&mut self) {
        self.disconnect();
        self.connect();
    }

    pub fn handle_event(&mut self, id: ConnectionId, event: TransportEvent) -> Option<Reaction> {
        if self.current_id() != Some(id) {
            trace!(%id, ?event, "ignoring event from a detached transport");
            return None;
        }
        let reaction = match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(payload) => {
                debug!(%id, len = payload.len(), "message from server");
                Reaction::Inbound(payload)
            }
            TransportEvent::Close => {
                info!(%id, "connection closed");
                self.on_lost()
            }
            TransportEvent::Error(error) => {
                warn!(%id, %error, "connection error");
                self.on_lost()
            }
        };
        Some(reaction)
    }

    /// Forward `text` verbatim. Only valid while connected.
    pub fn send(&mut self, text: &str) -> Result<(), ConnectionError> {
        if !self.status().is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        let (_, handle) = self.handle.as_mut().ok_or(ConnectionError::NotConnected)?;
        handle.send(text)?;
        Ok(())
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    pub fn current_id(&self) -> Option<ConnectionId> {
        self.handle.as_ref().map(|(id, _)| *id)
    }

    pub fn backoff_delay(&self) -> Option<Duration> {
        self.backoff.current()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn on_open(&mut self) -> Reaction {
        info!("connection established");
        self.backoff.on_open();
        self.set_status(Status::Connected);
        Reaction::Opened
    }

    fn on_lost(&mut self) -> Reaction {
        self.set_status(Status::Disconnected);
        Reaction::Lost {
            retry_in: self.reconnect(),
        }
    }

    fn set_status(&self, status: Status) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
