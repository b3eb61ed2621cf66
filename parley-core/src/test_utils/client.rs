//! In-process stand-in for a connected socket

use crate::core_invite::{InviteFeedback, PendingInvite};
use crate::core_presence::ConnectionHandle;
use crate::events::ServerEvent;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// A connection handle plus the receiving end a transport would drain
pub struct TestClient {
    handle: ConnectionHandle,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestClient {
    pub fn new() -> Self {
        let (handle, rx) = ConnectionHandle::new();
        Self { handle, rx }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Everything received so far
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `within` for the next event
    pub async fn next_event(&mut self, within: Duration) -> Option<ServerEvent> {
        timeout(within, self.rx.recv()).await.ok().flatten()
    }

    /// Names of the events received so far, draining them
    pub fn event_names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(ServerEvent::name).collect()
    }

    /// `receive_invite` payloads received so far, draining everything
    pub fn invites(&mut self) -> Vec<PendingInvite> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::ReceiveInvite(invite) => Some(invite),
                _ => None,
            })
            .collect()
    }

    /// `invite_feedback` payloads received so far, draining everything
    pub fn feedback(&mut self) -> Vec<InviteFeedback> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::InviteFeedback(feedback) => Some(feedback),
                _ => None,
            })
            .collect()
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}
