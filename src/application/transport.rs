// Transport port - Socket lifecycle as typed events
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Identifies one opened socket. Events from an older session are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub session: SessionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(session: SessionId, kind: TransportEventKind) -> Self {
        Self { session, kind }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open socket: {0}")]
    Open(String),
}

/// Handle to a live socket. Closing (or dropping) it tells the socket task to
/// shut down without reporting a close event.
#[derive(Debug)]
pub struct SocketHandle {
    session: SessionId,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SocketHandle {
    pub fn new(session: SessionId, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            session,
            shutdown: Some(shutdown),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Opens sockets whose lifecycle is reported on `events`
pub trait Transport: Send + Sync {
    fn open(
        &self,
        url: &str,
        session: SessionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<SocketHandle, TransportError>;
}
