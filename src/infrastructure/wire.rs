// Wire codec for inbound feed messages
use crate::domain::telemetry::Observation;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("weight is missing or not numeric")]
    MissingWeight,

    #[error("weight must be a non-negative finite number, got {0}")]
    InvalidWeight(f64),

    #[error("unrecognized timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("'{0}' message has no usable data field")]
    MissingData(&'static str),

    #[error("all {0} history entries are invalid")]
    NoValidEntries(usize),
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Reading(Observation),
    History {
        observations: Vec<Observation>,
        skipped: usize,
    },
    /// Valid JSON of a shape the pipeline does not consume
    Unrecognized,
}

/// Decode a text frame from the feed.
///
/// `received_at` stands in for readings that carry no timestamp.
pub fn decode(text: &str, received_at: DateTime<Utc>) -> Result<InboundMessage, WireError> {
    let value: Value = serde_json::from_str(text)?;

    let Value::Object(object) = value else {
        return Ok(InboundMessage::Unrecognized);
    };

    match object.get("type").and_then(Value::as_str) {
        Some("weight") => {
            let data = object
                .get("data")
                .and_then(Value::as_object)
                .ok_or(WireError::MissingData("weight"))?;
            Ok(InboundMessage::Reading(parse_reading(data, received_at)?))
        }
        Some("history") => {
            let entries = object
                .get("data")
                .and_then(Value::as_array)
                .ok_or(WireError::MissingData("history"))?;
            parse_history(entries, received_at)
        }
        Some(other) => {
            tracing::debug!("Ignoring message of type {}", other);
            Ok(InboundMessage::Unrecognized)
        }
        None if object.contains_key("weight") => {
            Ok(InboundMessage::Reading(parse_reading(&object, received_at)?))
        }
        None => Ok(InboundMessage::Unrecognized),
    }
}

/// An empty list is a valid (empty) snapshot; a non-empty list with no valid
/// entry is rejected so it can't wipe the history
fn parse_history(
    entries: &[Value],
    received_at: DateTime<Utc>,
) -> Result<InboundMessage, WireError> {
    let mut observations = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for entry in entries {
        let parsed = entry
            .as_object()
            .ok_or(WireError::MissingWeight)
            .and_then(|fields| parse_reading(fields, received_at));

        match parsed {
            Ok(observation) => observations.push(observation),
            Err(e) => {
                tracing::warn!("Skipping history entry: {}", e);
                skipped += 1;
            }
        }
    }

    if observations.is_empty() && skipped > 0 {
        return Err(WireError::NoValidEntries(skipped));
    }

    Ok(InboundMessage::History {
        observations,
        skipped,
    })
}

fn parse_reading(
    fields: &Map<String, Value>,
    received_at: DateTime<Utc>,
) -> Result<Observation, WireError> {
    let weight = parse_weight(fields.get("weight"))?;

    let timestamp = match fields.get("timestamp").filter(|v| !v.is_null()) {
        Some(raw) => parse_timestamp(raw)?,
        None => match fields.get("datetime").filter(|v| !v.is_null()) {
            Some(raw) => parse_timestamp(raw)?,
            None => received_at,
        },
    };

    Ok(Observation::new(weight, timestamp))
}

fn parse_weight(value: Option<&Value>) -> Result<f64, WireError> {
    let weight = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or(WireError::MissingWeight)?;

    if !weight.is_finite() || weight < 0.0 {
        return Err(WireError::InvalidWeight(weight));
    }

    Ok(weight)
}

/// Numbers are epoch milliseconds; strings may be RFC 3339, epoch
/// milliseconds, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, WireError> {
    let invalid = || WireError::InvalidTimestamp(value.to_string());

    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch_millis).ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Ok(parsed.with_timezone(&Utc));
            }
            if let Ok(ms) = s.parse::<f64>() {
                return from_epoch_millis(ms).ok_or_else(invalid);
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn from_epoch_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}
