// Dashboard snapshot handed to the presentation layer
use super::history::HistoryStore;
use super::statistics::{Statistics, StatisticsScope};
use super::telemetry::Observation;
use super::units::{ScaledWeight, UnitPolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// A chart point, oldest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub time_ms: i64,
    pub weight: f64,
}

/// A table row, most recent first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub timestamp: DateTime<Utc>,
    pub weight: f64,
    pub display: ScaledWeight,
}

/// Immutable view of the whole pipeline at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub connection_state: ConnectionState,
    pub server_url: String,
    pub capacity: usize,
    pub unit: &'static str,
    pub statistics: Statistics,
    pub current: Option<ScaledWeight>,
    pub chart: Vec<ChartPoint>,
    pub table: Vec<TableRow>,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Disconnected,
            server_url: String::new(),
            capacity: 0,
            unit: UnitPolicy::default().base_unit(),
            statistics: Statistics::default(),
            current: None,
            chart: Vec::new(),
            table: Vec::new(),
        }
    }
}

/// Presentation options applied when capturing a snapshot
#[derive(Debug, Clone, Copy)]
pub struct SnapshotOptions {
    pub unit_policy: UnitPolicy,
    pub scope: StatisticsScope,
    pub table_rows: usize,
}

impl DashboardSnapshot {
    pub fn capture(
        history: &HistoryStore,
        connection_state: ConnectionState,
        server_url: &str,
        options: SnapshotOptions,
    ) -> Self {
        let statistics = history.statistics(options.scope);

        let chart = history
            .iter()
            .map(|o| ChartPoint {
                time_ms: o.time_ms(),
                weight: o.weight,
            })
            .collect();

        let table = history
            .recent(options.table_rows)
            .rev()
            .map(|o| Self::table_row(o, options.unit_policy))
            .collect();

        Self {
            connection_state,
            server_url: server_url.to_string(),
            capacity: history.capacity().get(),
            unit: options.unit_policy.base_unit(),
            statistics,
            current: statistics.current.map(|w| options.unit_policy.scale(w)),
            chart,
            table,
        }
    }

    fn table_row(observation: &Observation, policy: UnitPolicy) -> TableRow {
        TableRow {
            timestamp: observation.timestamp,
            weight: observation.weight,
            display: policy.scale(observation.weight),
        }
    }
}
