// Recording fakes for the transport and presentation ports
use crate::application::presentation_sink::PresentationSink;
use crate::application::transport::{
    SessionId, SocketHandle, Transport, TransportError, TransportEvent, TransportEventKind,
};
use crate::domain::dashboard::DashboardSnapshot;
use crate::domain::telemetry::{LogEvent, Severity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

pub struct OpenedSocket {
    pub url: String,
    pub session: SessionId,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub shutdown: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct FakeTransport {
    opened: Mutex<Vec<OpenedSocket>>,
    fail: AtomicBool,
}

impl FakeTransport {
    pub fn fail_opens(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap().iter().map(|s| s.url.clone()).collect()
    }

    /// Whether the manager closed (or dropped) the handle of the `index`th socket
    pub fn was_closed(&self, index: usize) -> bool {
        let mut opened = self.opened.lock().unwrap();
        !matches!(
            opened[index].shutdown.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }

    /// Emit an event as the `index`th socket's task would
    pub fn emit(&self, index: usize, kind: TransportEventKind) {
        let opened = self.opened.lock().unwrap();
        let socket = opened.get(index).unwrap_or_else(|| {
            panic!("socket #{} was never opened ({} opened so far)", index, opened.len())
        });
        socket
            .events
            .send(TransportEvent::new(socket.session, kind))
            .unwrap();
    }
}

impl Transport for FakeTransport {
    fn open(
        &self,
        url: &str,
        session: SessionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<SocketHandle, TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Open("refused by test".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        self.opened.lock().unwrap().push(OpenedSocket {
            url: url.to_string(),
            session,
            events,
            shutdown: rx,
        });
        Ok(SocketHandle::new(session, tx))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    logs: Mutex<Vec<LogEvent>>,
    snapshots: Mutex<Vec<DashboardSnapshot>>,
}

impl RecordingSink {
    pub fn count(&self, severity: Severity) -> usize {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.logs.lock().unwrap().iter().map(|e| e.message.clone()).collect()
    }

    pub fn last_snapshot(&self) -> Option<DashboardSnapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl PresentationSink for RecordingSink {
    fn publish(&self, snapshot: DashboardSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    fn log(&self, event: LogEvent) {
        self.logs.lock().unwrap().push(event);
    }
}
