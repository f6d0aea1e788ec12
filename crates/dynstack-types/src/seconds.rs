//! Serde helper that encodes a [`Duration`] as fractional seconds.
//!
//! Use with `#[serde(with = "crate::seconds")]`. Negative, NaN and
//! out-of-range inputs are rejected on deserialization.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a duration as an `f64` number of seconds.
pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.as_secs_f64())
}

/// Deserialize an `f64` number of seconds into a duration.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration {secs}s: {e}")))
}
