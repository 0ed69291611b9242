// Domain layer - Observations, history retention and derived values
pub mod dashboard;
pub mod history;
pub mod statistics;
pub mod telemetry;
pub mod units;
