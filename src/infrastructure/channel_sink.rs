// Presentation sink backed by tokio channels
use crate::application::presentation_sink::PresentationSink;
use crate::domain::dashboard::DashboardSnapshot;
use crate::domain::telemetry::{LogEvent, Severity};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};

const LOG_CHANNEL_CAPACITY: usize = 256;

/// Keeps the latest snapshot in a `watch` channel, fans log entries out over
/// `broadcast`, and retains the newest entries for the activity log.
/// Every entry is mirrored to `tracing`.
pub struct ChannelSink {
    snapshots: watch::Sender<DashboardSnapshot>,
    logs: broadcast::Sender<LogEvent>,
    activity: Mutex<VecDeque<LogEvent>>,
    activity_limit: usize,
}

impl ChannelSink {
    pub fn new(activity_limit: usize) -> Self {
        let (snapshots, _) = watch::channel(DashboardSnapshot::default());
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);

        Self {
            snapshots,
            logs,
            activity: Mutex::new(VecDeque::with_capacity(activity_limit)),
            activity_limit: activity_limit.max(1),
        }
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        self.logs.subscribe()
    }

    /// Activity log, newest first
    pub fn activity(&self) -> Vec<LogEvent> {
        let activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        activity.iter().rev().cloned().collect()
    }

    pub fn clear_activity(&self) {
        self.activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.log(LogEvent::info("Activity log cleared"));
    }
}

impl PresentationSink for ChannelSink {
    fn publish(&self, snapshot: DashboardSnapshot) {
        self.snapshots.send_replace(snapshot);
    }

    fn log(&self, event: LogEvent) {
        match event.severity {
            Severity::Info | Severity::Success => tracing::info!("{}", event.message),
            Severity::Warning => tracing::warn!("{}", event.message),
            Severity::Error => tracing::error!("{}", event.message),
        }

        {
            let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
            activity.push_back(event.clone());
            while activity.len() > self.activity_limit {
                activity.pop_front();
            }
        }

        // No subscribers is fine.
        let _ = self.logs.send(event);
    }
}
