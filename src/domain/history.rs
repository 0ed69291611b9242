// Bounded history of observations
use super::statistics::{Statistics, StatisticsScope};
use super::telemetry::Observation;
use chrono::{Local, NaiveDate};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Upper bound accepted for the retention limit
pub const MAX_CAPACITY: usize = 100_000;

/// Clamp a user supplied limit into `1..=MAX_CAPACITY`
pub fn clamp_capacity(requested: i64) -> NonZeroUsize {
    let clamped = requested.clamp(1, MAX_CAPACITY as i64) as usize;
    NonZeroUsize::new(clamped).unwrap_or(NonZeroUsize::MIN)
}

/// Order-preserving buffer keeping the last `capacity` observations by arrival.
///
/// New observations go to the back and eviction happens at the front, so every
/// mutation leaves `len() <= capacity()`.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    observations: VecDeque<Observation>,
    capacity: NonZeroUsize,
    total_received: u64,
}

impl HistoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            observations: VecDeque::with_capacity(capacity.get().min(1024)),
            capacity,
            total_received: 0,
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    /// Append at the newest end, returning the evicted observation if any
    pub fn append(&mut self, observation: Observation) -> Option<Observation> {
        self.observations.push_back(observation);
        self.total_received += 1;

        if self.observations.len() > self.capacity.get() {
            self.observations.pop_front()
        } else {
            None
        }
    }

    /// Swap the whole buffer for a server supplied snapshot, keeping only the
    /// most recent `capacity` entries
    pub fn replace_all(&mut self, observations: Vec<Observation>) {
        let received = observations.len();
        let skip = received.saturating_sub(self.capacity.get());

        self.observations = observations.into_iter().skip(skip).collect();
        self.total_received = received as u64;
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.total_received = 0;
    }

    /// Change the limit, evicting oldest-first. Returns how many were evicted.
    pub fn set_capacity(&mut self, capacity: NonZeroUsize) -> usize {
        self.capacity = capacity;

        let excess = self.observations.len().saturating_sub(capacity.get());
        self.observations.drain(..excess);
        excess
    }

    /// The most recent `limit` observations, oldest first.
    ///
    /// Reverse the iterator for a most-recent-first view.
    pub fn recent(
        &self,
        limit: usize,
    ) -> impl DoubleEndedIterator<Item = &Observation> + ExactSizeIterator {
        let skip = self.observations.len().saturating_sub(limit);
        self.observations.iter().skip(skip)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Observation> + ExactSizeIterator {
        self.observations.iter()
    }

    pub fn statistics(&self, scope: StatisticsScope) -> Statistics {
        self.statistics_on(scope, Local::now().date_naive())
    }

    pub fn statistics_on(&self, scope: StatisticsScope, today: NaiveDate) -> Statistics {
        Statistics::compute(&self.observations, scope, today)
            .with_total_received(self.total_received)
    }
}
