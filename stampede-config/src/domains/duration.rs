//! Whole-number duration fields
//!
//! Run settings are written as plain integers: seconds for `run_time` and
//! the timeouts, milliseconds for the `*_ms` fields. Values above
//! [`MAX_DURATION`] are refused while parsing so a run deadline always fits
//! the clock.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Longest value any duration setting may hold (30 days)
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn within_limit<E: de::Error>(duration: Duration, raw: u64, unit: &str) -> Result<Duration, E> {
    if duration > MAX_DURATION {
        return Err(E::custom(format!(
            "{} {} is longer than the {} second limit",
            raw,
            unit,
            MAX_DURATION.as_secs()
        )));
    }
    Ok(duration)
}

/// `Duration` as integer seconds
pub mod seconds {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = u64::deserialize(deserializer)?;
        within_limit(Duration::from_secs(raw), raw, "seconds")
    }
}

/// `Duration` as integer milliseconds
pub mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = u64::deserialize(deserializer)?;
        within_limit(Duration::from_millis(raw), raw, "milliseconds")
    }
}
