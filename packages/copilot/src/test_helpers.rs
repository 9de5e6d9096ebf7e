use std::sync::{Arc, Mutex};

use crate::connection::{
    ConnectionId, Transport, TransportError, TransportEvent, TransportEvents, TransportHandle,
};

#[derive(Default)]
struct FakeState {
    opened: Vec<(ConnectionId, String)>,
    sent: Vec<(ConnectionId, String)>,
    detached: Vec<ConnectionId>,
    closed: Vec<ConnectionId>,
    fail_close: bool,
    events: Option<TransportEvents>,
}

/// In-memory transport that records every call made on it.
///
/// Clones share state, so a test keeps one clone for assertions and hands
/// the other to the code under test.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    /// A fake that can push events into the given channel via [`emit`](Self::emit).
    pub fn with_events(events: TransportEvents) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().events = Some(events);
        fake
    }

    pub fn emit(&self, id: ConnectionId, event: TransportEvent) {
        let state = self.state.lock().unwrap();
        let events = state.events.as_ref().expect("fake has no event channel");
        events.send((id, event)).expect("event receiver dropped");
    }

    pub fn fail_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_close = fail;
    }

    pub fn opened(&self) -> Vec<(ConnectionId, String)> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn last_opened(&self) -> Option<ConnectionId> {
        self.state.lock().unwrap().opened.last().map(|(id, _)| *id)
    }

    pub fn sent(&self) -> Vec<(ConnectionId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn detached(&self) -> Vec<ConnectionId> {
        self.state.lock().unwrap().detached.clone()
    }

    pub fn closed(&self) -> Vec<ConnectionId> {
        self.state.lock().unwrap().closed.clone()
    }

    /// Handles that were opened and never detached.
    pub fn live(&self) -> Vec<ConnectionId> {
        let state = self.state.lock().unwrap();
        state
            .opened
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !state.detached.contains(id))
            .collect()
    }
}

impl Transport for FakeTransport {
    type Handle = FakeHandle;

    fn open(&mut self, id: ConnectionId, url: &str) -> FakeHandle {
        self.state.lock().unwrap().opened.push((id, url.to_string()));
        FakeHandle {
            id,
            state: self.state.clone(),
        }
    }
}

pub struct FakeHandle {
    id: ConnectionId,
    state: Arc<Mutex<FakeState>>,
}

impl TransportHandle for FakeHandle {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .sent
            .push((self.id, text.to_string()));
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = self.state.lock().unwrap();
        if !state.detached.contains(&self.id) {
            state.detached.push(self.id);
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_close {
            return Err(TransportError::Closed);
        }
        state.closed.push(self.id);
        Ok(())
    }
}
