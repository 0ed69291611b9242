// Presentation port - Where snapshots and activity log entries go
use crate::domain::dashboard::DashboardSnapshot;
use crate::domain::telemetry::LogEvent;

pub trait PresentationSink: Send + Sync {
    /// Publish the latest snapshot after a mutation
    fn publish(&self, snapshot: DashboardSnapshot);

    /// Append an entry to the activity log
    fn log(&self, event: LogEvent);
}
