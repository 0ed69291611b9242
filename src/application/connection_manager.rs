// Connection manager - Socket lifecycle, reconnect scheduling and message routing
use crate::application::presentation_sink::PresentationSink;
use crate::application::transport::{
    SessionId, SocketHandle, Transport, TransportEvent, TransportEventKind,
};
use crate::domain::dashboard::ConnectionState;
use crate::domain::history::HistoryStore;
use crate::domain::telemetry::LogEvent;
use crate::domain::units::UnitPolicy;
use crate::infrastructure::wire::{self, InboundMessage};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("server URL is empty")]
    EmptyUrl,

    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectTimer {
    pub deadline: Instant,
}

/// Trim and check that `raw` is a usable `ws://` or `wss://` URL
pub fn validate_url(raw: &str) -> Result<String, ConnectError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConnectError::EmptyUrl);
    }

    let invalid = |reason: String| ConnectError::InvalidUrl {
        url: trimmed.to_string(),
        reason,
    };

    let parsed = url::Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(invalid(format!(
                "unsupported scheme '{}', expected ws or wss",
                other
            )));
        }
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Only events tagged with the live socket's session are acted upon.
/// `reconnect` is `Some` iff a retry is scheduled.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn PresentationSink>,
    events: mpsc::UnboundedSender<TransportEvent>,
    policy: ReconnectPolicy,
    unit_policy: UnitPolicy,
    server_url: String,
    state: ConnectionState,
    socket: Option<SocketHandle>,
    next_session: u64,
    reconnect: Option<ReconnectTimer>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn PresentationSink>,
        events: mpsc::UnboundedSender<TransportEvent>,
        policy: ReconnectPolicy,
        unit_policy: UnitPolicy,
        server_url: String,
    ) -> Self {
        Self {
            transport,
            sink,
            events,
            policy,
            unit_policy,
            server_url,
            state: ConnectionState::Disconnected,
            socket: None,
            next_session: 0,
            reconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn session(&self) -> Option<SessionId> {
        self.socket.as_ref().map(SocketHandle::session)
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect.map(|timer| timer.deadline)
    }

    /// Validate and store a new server URL. Returns whether it changed.
    pub fn set_server_url(&mut self, url: &str) -> Result<bool, ConnectError> {
        let url = validate_url(url)?;
        if url == self.server_url {
            return Ok(false);
        }

        tracing::info!("Server URL set to {}", url);
        self.server_url = url;
        Ok(true)
    }

    /// Open a socket to the current server URL.
    ///
    /// Does nothing but warn when a socket is already open or opening.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        match self.state {
            ConnectionState::Connected => {
                self.sink.log(LogEvent::warning("Already connected to server"));
                return Ok(());
            }
            ConnectionState::Connecting => {
                self.sink
                    .log(LogEvent::warning("Connection already in progress"));
                return Ok(());
            }
            ConnectionState::Disconnected => {}
        }

        let url = match validate_url(&self.server_url) {
            Ok(url) => url,
            Err(e) => {
                self.sink.log(LogEvent::error(format!(
                    "Please enter a valid WebSocket server URL ({})",
                    e
                )));
                return Err(e);
            }
        };

        self.cancel_reconnect();
        self.next_session += 1;
        let session = SessionId(self.next_session);

        self.state = ConnectionState::Connecting;
        self.sink.log(LogEvent::info(format!("Connecting to {}", url)));
        tracing::info!(%session, "Opening socket to {}", url);

        match self.transport.open(&url, session, self.events.clone()) {
            Ok(handle) => {
                self.socket = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::error!(%session, "Transport refused to open socket: {}", e);
                self.state = ConnectionState::Disconnected;
                self.sink.log(LogEvent::error(format!("Failed to connect: {}", e)));
                Err(ConnectError::Transport(e.to_string()))
            }
        }
    }

    /// User-initiated disconnect. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();

        if let Some(mut socket) = self.socket.take() {
            socket.close();
            tracing::info!(session = %socket.session(), "Socket closed by user");
            self.sink
                .log(LogEvent::info("Manually disconnected from server"));
        }

        self.state = ConnectionState::Disconnected;
    }

    /// Drop the pending reconnect, if any. Returns whether one was pending.
    pub fn cancel_reconnect(&mut self) -> bool {
        self.reconnect.take().is_some()
    }

    /// Tear down without logging; used on shutdown
    pub fn dispose(&mut self) {
        self.reconnect = None;
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Apply a transport event. Returns whether `history` was mutated.
    pub fn handle_transport_event(
        &mut self,
        event: TransportEvent,
        history: &mut HistoryStore,
        now: Instant,
    ) -> bool {
        if self.session() != Some(event.session) {
            tracing::debug!(session = %event.session, "Ignoring event from stale socket");
            return false;
        }

        match event.kind {
            TransportEventKind::Opened => {
                self.state = ConnectionState::Connected;
                self.cancel_reconnect();
                self.sink.log(LogEvent::success(
                    "Successfully connected to WebSocket server",
                ));
                false
            }
            TransportEventKind::Message(text) => self.route_message(&text, history),
            TransportEventKind::Error(reason) => {
                tracing::warn!(session = %event.session, "Socket error: {}", reason);
                self.sink.log(LogEvent::error(format!(
                    "WebSocket connection error: {}",
                    reason
                )));
                false
            }
            TransportEventKind::Closed => {
                self.socket = None;
                self.state = ConnectionState::Disconnected;
                self.sink.log(LogEvent::warning("WebSocket connection closed"));
                if self.policy.enabled {
                    self.schedule_reconnect(now);
                }
                false
            }
        }
    }

    /// Fire the pending reconnect if its deadline has passed
    pub fn on_reconnect_due(&mut self, now: Instant) {
        let Some(timer) = self.reconnect else {
            return;
        };
        if now < timer.deadline {
            return;
        }

        self.reconnect = None;
        self.sink.log(LogEvent::info("Attempting to reconnect..."));

        if let Err(ConnectError::Transport(_)) = self.connect() {
            self.schedule_reconnect(now);
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.reconnect.is_some() {
            return;
        }

        self.reconnect = Some(ReconnectTimer {
            deadline: now + self.policy.delay,
        });
        tracing::info!("Reconnect scheduled in {:?}", self.policy.delay);
    }

    fn route_message(&mut self, text: &str, history: &mut HistoryStore) -> bool {
        match wire::decode(text, Utc::now()) {
            Ok(InboundMessage::Reading(observation)) => {
                let display = self.unit_policy.scale(observation.weight);
                if let Some(evicted) = history.append(observation) {
                    tracing::trace!(weight = evicted.weight, "Evicted oldest reading");
                }
                tracing::debug!(total = history.total_received(), "Reading stored");
                self.sink
                    .log(LogEvent::success(format!("Weight reading: {}", display)));
                true
            }
            Ok(InboundMessage::History {
                observations,
                skipped,
            }) => {
                let received = observations.len();
                history.replace_all(observations);
                if skipped > 0 {
                    self.sink.log(LogEvent::warning(format!(
                        "Skipped {} invalid history entries",
                        skipped
                    )));
                }
                self.sink.log(LogEvent::info(format!(
                    "Loaded {} historical readings ({} retained)",
                    received,
                    history.len()
                )));
                true
            }
            Ok(InboundMessage::Unrecognized) => {
                tracing::debug!("Ignoring unrecognized message: {}", text);
                false
            }
            Err(e) => {
                tracing::warn!("Dropping malformed message: {}", e);
                self.sink
                    .log(LogEvent::error(format!("Error parsing received data: {}", e)));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{FakeTransport, RecordingSink};
    use crate::domain::telemetry::Severity;
    use std::num::NonZeroUsize;

    const URL: &str = "ws://scale.local:81/ws";

    struct Fixture {
        transport: Arc<FakeTransport>,
        sink: Arc<RecordingSink>,
        manager: ConnectionManager,
        history: HistoryStore,
        _events: mpsc::UnboundedReceiver<TransportEvent>,
    }

    fn fixture_with(policy: ReconnectPolicy, url: &str) -> Fixture {
        let transport = Arc::new(FakeTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            transport.clone(),
            sink.clone(),
            tx,
            policy,
            UnitPolicy::Kilograms,
            url.to_string(),
        );

        Fixture {
            transport,
            sink,
            manager,
            history: HistoryStore::new(NonZeroUsize::new(10).unwrap()),
            _events: rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ReconnectPolicy::default(), URL)
    }

    impl Fixture {
        fn event(&mut self, kind: TransportEventKind, now: Instant) -> bool {
            let session = self.manager.session().expect("no live socket");
            self.event_for(session, kind, now)
        }

        fn event_for(&mut self, session: SessionId, kind: TransportEventKind, now: Instant) -> bool {
            self.manager.handle_transport_event(
                TransportEvent::new(session, kind),
                &mut self.history,
                now,
            )
        }

        fn connected(mut self, now: Instant) -> Self {
            self.manager.connect().unwrap();
            self.event(TransportEventKind::Opened, now);
            self
        }
    }

    #[test]
    fn test_connect_lifecycle() {
        let mut f = fixture();
        let now = Instant::now();

        f.manager.connect().unwrap();
        assert_eq!(f.manager.state(), ConnectionState::Connecting);
        assert_eq!(f.transport.opened_urls(), vec![URL.to_string()]);

        f.event(TransportEventKind::Opened, now);
        assert_eq!(f.manager.state(), ConnectionState::Connected);
        assert_eq!(f.sink.count(Severity::Success), 1);
    }

    #[test]
    fn test_connect_rejects_empty_url() {
        let mut f = fixture_with(ReconnectPolicy::default(), "   ");

        assert_eq!(f.manager.connect(), Err(ConnectError::EmptyUrl));
        assert_eq!(f.manager.state(), ConnectionState::Disconnected);
        assert_eq!(f.transport.open_count(), 0);
        assert_eq!(f.sink.count(Severity::Error), 1);
        assert_eq!(f.manager.reconnect_deadline(), None);
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(validate_url(" wss://host/ws "), Ok("wss://host/ws".to_string()));
        assert!(matches!(
            validate_url("http://host/ws"),
            Err(ConnectError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(ConnectError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_connect_while_active_is_a_warning_noop() {
        let mut f = fixture();
        let now = Instant::now();

        f.manager.connect().unwrap();
        f.manager.connect().unwrap();
        assert_eq!(f.transport.open_count(), 1);

        f.event(TransportEventKind::Opened, now);
        f.manager.connect().unwrap();
        assert_eq!(f.transport.open_count(), 1);
        assert_eq!(f.sink.count(Severity::Warning), 2);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let now = Instant::now();
        let mut f = fixture().connected(now);

        f.manager.disconnect();
        f.manager.disconnect();

        assert_eq!(f.manager.state(), ConnectionState::Disconnected);
        assert!(f.transport.was_closed(0));
        let manual = f
            .sink
            .messages()
            .into_iter()
            .filter(|m| m.contains("Manually disconnected"))
            .count();
        assert_eq!(manual, 1);
        assert!(!f.manager.cancel_reconnect());
        assert!(!f.manager.cancel_reconnect());
    }

    #[test]
    fn test_no_reconnect_after_manual_disconnect() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        let session = f.manager.session().unwrap();

        f.manager.disconnect();
        // The socket task may still report its close afterwards.
        f.event_for(session, TransportEventKind::Closed, now);
        f.manager.on_reconnect_due(now + Duration::from_secs(30));

        assert_eq!(f.manager.state(), ConnectionState::Disconnected);
        assert_eq!(f.manager.reconnect_deadline(), None);
        assert_eq!(f.transport.open_count(), 1);
    }

    #[test]
    fn test_unexpected_close_schedules_single_reconnect() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        let session = f.manager.session().unwrap();

        f.event(TransportEventKind::Closed, now);
        assert_eq!(f.manager.state(), ConnectionState::Disconnected);
        assert_eq!(f.manager.reconnect_deadline(), Some(now + DEFAULT_RECONNECT_DELAY));

        // A late close from the dropped socket is stale and leaves the timer alone.
        let later = now + Duration::from_secs(2);
        f.event_for(session, TransportEventKind::Closed, later);
        assert_eq!(f.manager.reconnect_deadline(), Some(now + DEFAULT_RECONNECT_DELAY));

        f.manager.on_reconnect_due(now + Duration::from_secs(1));
        assert_eq!(f.transport.open_count(), 1);

        f.manager.on_reconnect_due(now + DEFAULT_RECONNECT_DELAY);
        assert_eq!(f.transport.open_count(), 2);
        assert_eq!(f.manager.state(), ConnectionState::Connecting);
        assert_eq!(f.manager.reconnect_deadline(), None);

        f.event(TransportEventKind::Opened, now + DEFAULT_RECONNECT_DELAY);
        assert_eq!(f.manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_close_before_open_rearms_reconnect() {
        let now = Instant::now();
        let mut f = fixture().connected(now);

        f.event(TransportEventKind::Closed, now);
        let due = now + DEFAULT_RECONNECT_DELAY;
        f.manager.on_reconnect_due(due);
        assert_eq!(f.manager.state(), ConnectionState::Connecting);

        f.event(TransportEventKind::Error("refused".to_string()), due);
        assert_eq!(f.manager.state(), ConnectionState::Connecting);
        assert_eq!(f.manager.reconnect_deadline(), None);

        f.event(TransportEventKind::Closed, due);
        assert_eq!(f.manager.state(), ConnectionState::Disconnected);
        assert_eq!(f.manager.reconnect_deadline(), Some(due + DEFAULT_RECONNECT_DELAY));
    }

    #[test]
    fn test_transport_failure_during_reconnect_rearms() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        f.event(TransportEventKind::Closed, now);

        f.transport.fail_opens(true);
        let due = now + DEFAULT_RECONNECT_DELAY;
        f.manager.on_reconnect_due(due);

        assert_eq!(f.manager.state(), ConnectionState::Disconnected);
        assert_eq!(f.manager.reconnect_deadline(), Some(due + DEFAULT_RECONNECT_DELAY));
    }

    #[test]
    fn test_socket_error_does_not_reconnect() {
        let now = Instant::now();
        let mut f = fixture().connected(now);

        f.event(TransportEventKind::Error("reset".to_string()), now);

        assert_eq!(f.manager.state(), ConnectionState::Connected);
        assert_eq!(f.manager.reconnect_deadline(), None);
        assert_eq!(f.sink.count(Severity::Error), 1);
    }

    #[test]
    fn test_auto_reconnect_disabled() {
        let now = Instant::now();
        let policy = ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        };
        let mut f = fixture_with(policy, URL).connected(now);

        f.event(TransportEventKind::Closed, now);
        assert_eq!(f.manager.reconnect_deadline(), None);
    }

    #[test]
    fn test_manual_connect_cancels_pending_reconnect() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        f.event(TransportEventKind::Closed, now);
        assert!(f.manager.reconnect_deadline().is_some());

        f.manager.connect().unwrap();
        assert_eq!(f.manager.reconnect_deadline(), None);
        assert_eq!(f.transport.open_count(), 2);
    }

    #[test]
    fn test_malformed_message_changes_nothing() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        f.event(TransportEventKind::Message(r#"{"weight": 4}"#.to_string()), now);
        let errors_before = f.sink.count(Severity::Error);

        let changed = f.event(TransportEventKind::Message("{not json".to_string()), now);

        assert!(!changed);
        assert_eq!(f.history.len(), 1);
        assert_eq!(f.manager.state(), ConnectionState::Connected);
        assert_eq!(f.sink.count(Severity::Error), errors_before + 1);
    }

    #[test]
    fn test_messages_are_routed_to_history() {
        let now = Instant::now();
        let mut f = fixture().connected(now);

        assert!(f.event(TransportEventKind::Message(r#"{"weight": 10}"#.to_string()), now));
        assert!(f.event(
            TransportEventKind::Message(
                r#"{"type": "weight", "data": {"weight": 20, "timestamp": 1700000000000}}"#
                    .to_string()
            ),
            now
        ));
        assert_eq!(f.history.len(), 2);

        let history = r#"{"type": "history", "data": [{"weight": 1}, {"weight": 2}, {"weight": 3}]}"#;
        assert!(f.event(TransportEventKind::Message(history.to_string()), now));
        let weights: Vec<f64> = f.history.iter().map(|o| o.weight).collect();
        assert_eq!(weights, vec![1.0, 2.0, 3.0]);

        assert!(!f.event(TransportEventKind::Message(r#"{"type": "ping"}"#.to_string()), now));
        assert_eq!(f.history.len(), 3);
    }

    #[test]
    fn test_history_with_only_invalid_entries_keeps_existing_data() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        for w in [1, 2, 3] {
            f.event(TransportEventKind::Message(format!(r#"{{"weight": {}}}"#, w)), now);
        }
        let errors_before = f.sink.count(Severity::Error);

        let bad = r#"{"type": "history", "data": [{"weight": "abc"}, {"weight": -1}]}"#;
        assert!(!f.event(TransportEventKind::Message(bad.to_string()), now));
        assert_eq!(f.history.len(), 3);
        assert_eq!(f.sink.count(Severity::Error), errors_before + 1);

        let empty = r#"{"type": "history", "data": []}"#;
        assert!(f.event(TransportEventKind::Message(empty.to_string()), now));
        assert!(f.history.is_empty());
    }

    #[test]
    fn test_schedule_reconnect_keeps_pending_deadline() {
        let now = Instant::now();
        let mut f = fixture();

        f.manager.schedule_reconnect(now);
        f.manager.schedule_reconnect(now + Duration::from_secs(3));
        assert_eq!(f.manager.reconnect_deadline(), Some(now + DEFAULT_RECONNECT_DELAY));
    }

    #[test]
    fn test_stale_session_messages_are_ignored() {
        let now = Instant::now();
        let mut f = fixture().connected(now);
        let old = f.manager.session().unwrap();
        f.manager.disconnect();
        f.manager.connect().unwrap();

        let changed = f.event_for(old, TransportEventKind::Message(r#"{"weight": 1}"#.to_string()), now);
        assert!(!changed);
        assert!(f.history.is_empty());
    }

    #[test]
    fn test_set_server_url() {
        let mut f = fixture();
        assert_eq!(f.manager.set_server_url(URL), Ok(false));
        assert_eq!(f.manager.set_server_url("wss://other/ws"), Ok(true));
        assert_eq!(f.manager.server_url(), "wss://other/ws");
        assert_eq!(f.manager.set_server_url(""), Err(ConnectError::EmptyUrl));
        assert_eq!(f.manager.server_url(), "wss://other/ws");
    }
}
