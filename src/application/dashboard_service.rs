// Dashboard service - Single event loop over commands, socket events and the reconnect timer
use crate::application::connection_manager::{ConnectionManager, ReconnectPolicy};
use crate::application::presentation_sink::PresentationSink;
use crate::application::settings_repository::{ClientSettings, SettingsRepository};
use crate::application::transport::{Transport, TransportEvent};
use crate::domain::dashboard::{ConnectionState, DashboardSnapshot, SnapshotOptions};
use crate::domain::history::{clamp_capacity, HistoryStore, MAX_CAPACITY};
use crate::domain::telemetry::LogEvent;
use crate::infrastructure::csv_export::{export_csv, CsvExport};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_BATCH: usize = 64;

#[derive(Debug)]
pub enum DashboardCommand {
    Connect { url: Option<String> },
    Disconnect,
    SetServerUrl(String),
    SetCapacity(i64),
    ClearHistory,
    Export(oneshot::Sender<Option<CsvExport>>),
    Snapshot(oneshot::Sender<DashboardSnapshot>),
    Shutdown,
}

/// Error returned when the event loop is no longer running
#[derive(Debug, thiserror::Error)]
#[error("dashboard service has stopped")]
pub struct ServiceStopped;

/// Cloneable handle used by the presentation layer to drive the service
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<DashboardCommand>,
}

impl DashboardHandle {
    async fn send(&self, command: DashboardCommand) -> Result<(), ServiceStopped> {
        self.commands.send(command).await.map_err(|_| ServiceStopped)
    }

    pub async fn connect(&self, url: Option<String>) -> Result<(), ServiceStopped> {
        self.send(DashboardCommand::Connect { url }).await
    }

    pub async fn disconnect(&self) -> Result<(), ServiceStopped> {
        self.send(DashboardCommand::Disconnect).await
    }

    pub async fn set_server_url(&self, url: String) -> Result<(), ServiceStopped> {
        self.send(DashboardCommand::SetServerUrl(url)).await
    }

    pub async fn set_capacity(&self, limit: i64) -> Result<(), ServiceStopped> {
        self.send(DashboardCommand::SetCapacity(limit)).await
    }

    pub async fn clear_history(&self) -> Result<(), ServiceStopped> {
        self.send(DashboardCommand::ClearHistory).await
    }

    pub async fn export(&self) -> Result<Option<CsvExport>, ServiceStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(DashboardCommand::Export(tx)).await?;
        rx.await.map_err(|_| ServiceStopped)
    }

    pub async fn snapshot(&self) -> Result<DashboardSnapshot, ServiceStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(DashboardCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| ServiceStopped)
    }

    pub async fn shutdown(&self) -> Result<(), ServiceStopped> {
        self.send(DashboardCommand::Shutdown).await
    }
}

pub struct DashboardService {
    connection: ConnectionManager,
    history: HistoryStore,
    settings: ClientSettings,
    settings_repository: Arc<dyn SettingsRepository>,
    sink: Arc<dyn PresentationSink>,
    options: SnapshotOptions,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl DashboardService {
    /// Build the service, restoring persisted settings over `defaults`
    pub async fn new(
        transport: Arc<dyn Transport>,
        settings_repository: Arc<dyn SettingsRepository>,
        sink: Arc<dyn PresentationSink>,
        defaults: ClientSettings,
        policy: ReconnectPolicy,
        options: SnapshotOptions,
    ) -> Self {
        let stored = settings_repository.load().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load client settings, using defaults: {:#}", e);
            Default::default()
        });
        let settings = ClientSettings::resolve(&stored, &defaults);
        tracing::info!(
            "Restored settings: server={} limit={}",
            settings.server_url,
            settings.max_data_points
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::new(
            transport,
            sink.clone(),
            events_tx,
            policy,
            options.unit_policy,
            settings.server_url.clone(),
        );

        Self {
            connection,
            history: HistoryStore::new(settings.max_data_points),
            settings,
            settings_repository,
            sink,
            options,
            transport_events: events_rx,
        }
    }

    /// Run the event loop on its own task
    pub fn spawn(self) -> (DashboardHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.run(rx));
        (DashboardHandle { commands: tx }, task)
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<DashboardCommand>) {
        self.sink.log(LogEvent::info("System initialized and ready"));
        self.publish();

        loop {
            let reconnect_at = self.connection.reconnect_deadline();

            // Commands first. A command applies the socket events queued
            // before it, one batch at most.
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(DashboardCommand::Shutdown) | None => break,
                    Some(command) => {
                        self.drain_transport_events();
                        self.handle_command(command).await;
                    }
                },
                _ = wait_until(reconnect_at) => {
                    self.connection.on_reconnect_due(Instant::now());
                }
                Some(event) = self.transport_events.recv() => {
                    self.handle_transport_event(event);
                    self.drain_transport_events();
                }
            }

            self.publish();
        }

        self.connection.dispose();
        self.publish();
        tracing::info!("Dashboard service stopped");
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::capture(
            &self.history,
            self.connection.state(),
            self.connection.server_url(),
            self.options,
        )
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        self.connection
            .handle_transport_event(event, &mut self.history, Instant::now());
    }

    /// Apply up to `EVENT_BATCH` already queued socket events
    fn drain_transport_events(&mut self) {
        for _ in 0..EVENT_BATCH {
            match self.transport_events.try_recv() {
                Ok(event) => self.handle_transport_event(event),
                Err(_) => break,
            }
        }
    }

    fn publish(&self) {
        self.sink.publish(self.snapshot());
    }

    async fn handle_command(&mut self, command: DashboardCommand) {
        match command {
            DashboardCommand::Connect { url } => {
                if let Some(url) = url {
                    if self.connection.state() != ConnectionState::Disconnected
                        && url.trim() != self.connection.server_url()
                    {
                        self.sink.log(LogEvent::warning(
                            "Disconnect before switching to another server",
                        ));
                        return;
                    }
                    if !self.apply_server_url(&url).await {
                        return;
                    }
                }
                if let Err(e) = self.connection.connect() {
                    tracing::debug!("Connect rejected: {}", e);
                }
            }
            DashboardCommand::Disconnect => self.connection.disconnect(),
            DashboardCommand::SetServerUrl(url) => {
                self.apply_server_url(&url).await;
            }
            DashboardCommand::SetCapacity(limit) => self.apply_capacity(limit).await,
            DashboardCommand::ClearHistory => {
                self.history.clear();
                self.sink.log(LogEvent::warning("All weight data cleared"));
            }
            DashboardCommand::Export(reply) => {
                let _ = reply.send(self.export());
            }
            DashboardCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            DashboardCommand::Shutdown => {}
        }
    }

    /// Returns false when the URL was rejected
    async fn apply_server_url(&mut self, url: &str) -> bool {
        match self.connection.set_server_url(url) {
            Ok(true) => {
                self.settings.server_url = self.connection.server_url().to_string();
                self.persist().await;
                self.sink.log(LogEvent::info("WebSocket server URL updated"));
                if self.connection.state() != ConnectionState::Disconnected {
                    self.sink
                        .log(LogEvent::info("New server URL applies on the next connect"));
                }
                true
            }
            Ok(false) => true,
            Err(e) => {
                self.sink
                    .log(LogEvent::error(format!("Rejected server URL: {}", e)));
                false
            }
        }
    }

    async fn apply_capacity(&mut self, requested: i64) {
        let capacity = clamp_capacity(requested);
        if requested < 1 {
            self.sink.log(LogEvent::warning(format!(
                "Data points limit must be at least 1 (got {}), using 1",
                requested
            )));
        } else if requested > MAX_CAPACITY as i64 {
            self.sink.log(LogEvent::warning(format!(
                "Data points limit capped at {}",
                MAX_CAPACITY
            )));
        }

        let evicted = self.history.set_capacity(capacity);
        if evicted > 0 {
            tracing::debug!("Evicted {} observations after limit change", evicted);
        }

        self.settings.max_data_points = capacity;
        self.persist().await;
        self.sink.log(LogEvent::info(format!(
            "Data points limit changed to {}",
            capacity
        )));
    }

    fn export(&self) -> Option<CsvExport> {
        if self.history.is_empty() {
            self.sink.log(LogEvent::warning("No data to export"));
            return None;
        }

        let export = export_csv(self.history.iter(), Utc::now());
        self.sink.log(LogEvent::success(format!(
            "Exported {} data points to CSV",
            export.rows
        )));
        Some(export)
    }

    async fn persist(&self) {
        if let Err(e) = self.settings_repository.save(&self.settings.to_stored()).await {
            tracing::error!("Failed to persist client settings: {:#}", e);
            self.sink
                .log(LogEvent::error(format!("Failed to save settings: {}", e)));
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
