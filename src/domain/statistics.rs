// Statistics - Summaries recomputed from the retained history
use super::telemetry::Observation;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Which observations the statistics are computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsScope {
    /// Every observation currently retained
    #[default]
    Window,
    /// Only observations whose local calendar date is today
    Today,
}

/// Derived statistics reported to the presentation layer.
///
/// An empty scope reports zeros rather than sentinel values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub max: f64,
    pub min: f64,
    pub avg: f64,
    /// Weight of the most recent observation by arrival
    pub current: Option<f64>,
    /// Readings accepted since startup or the last clear
    pub total_received: u64,
}

impl Statistics {
    pub fn compute<'a>(
        observations: impl IntoIterator<Item = &'a Observation>,
        scope: StatisticsScope,
        today: NaiveDate,
    ) -> Self {
        let mut count = 0usize;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let mut sum = 0.0;
        let mut current = None;

        for observation in observations {
            current = Some(observation.weight);

            if scope == StatisticsScope::Today
                && observation.timestamp.with_timezone(&Local).date_naive() != today
            {
                continue;
            }

            count += 1;
            sum += observation.weight;
            max = max.max(observation.weight);
            min = min.min(observation.weight);
        }

        if count == 0 {
            return Self {
                current,
                ..Self::default()
            };
        }

        Self {
            count,
            max,
            min,
            avg: sum / count as f64,
            current,
            total_received: 0,
        }
    }

    pub fn with_total_received(mut self, total_received: u64) -> Self {
        self.total_received = total_received;
        self
    }
}
