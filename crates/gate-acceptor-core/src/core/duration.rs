// crates/gate-acceptor-core/src/core/duration.rs
// ============================================================================
// Module: Gate Acceptor Durations
// Description: Human duration strings for timeouts and schedule intervals.
// Purpose: Parse and format `10m`, `1h30m`, `250ms` style values.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Timeouts and intervals are written as compact unit strings in both the
//! validator YAML and the runtime TOML. A bare number is read as seconds.
//! Formatting produces the same compact form (`1m30s`, `100ms`) so values
//! round-trip through logs and snapshots.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Duration parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Input was empty or whitespace.
    #[error("duration is empty")]
    Empty,
    /// Input could not be parsed.
    #[error("invalid duration '{0}'")]
    Invalid(String),
    /// A numeric component was missing its unit.
    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),
    /// A unit suffix was not recognized.
    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit {
        /// Offending unit text.
        unit: String,
        /// Full input text.
        input: String,
    },
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a compact duration string.
///
/// Accepts sequences of `<number><unit>` where unit is one of `ns`, `us`,
/// `µs`, `ms`, `s`, `m`, `h`. Numbers may carry a decimal fraction. A bare
/// number is interpreted as seconds.
///
/// # Errors
///
/// Returns [`DurationError`] when the input is empty, negative, or malformed.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(DurationError::Empty);
    }
    let invalid = || DurationError::Invalid(input.to_string());
    if text.bytes().all(is_number_byte) {
        return component_nanos(text, NANOS_PER_SECOND).map(nanos_to_duration).ok_or_else(invalid);
    }

    let bytes = text.as_bytes();
    let mut index = 0;
    let mut total: u128 = 0;
    while index < bytes.len() {
        let number_start = index;
        while index < bytes.len() && is_number_byte(bytes[index]) {
            index += 1;
        }
        if number_start == index {
            return Err(invalid());
        }
        let number = &text[number_start .. index];

        let unit_start = index;
        while index < bytes.len() && !is_number_byte(bytes[index]) {
            index += 1;
        }
        let unit_nanos = match &text[unit_start .. index] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SECOND,
            "m" => 60 * NANOS_PER_SECOND,
            "h" => 3_600 * NANOS_PER_SECOND,
            "" => return Err(DurationError::MissingUnit(input.to_string())),
            other => {
                return Err(DurationError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                });
            }
        };
        let component = component_nanos(number, unit_nanos).ok_or_else(invalid)?;
        total = total.checked_add(component).ok_or_else(invalid)?;
    }
    Ok(nanos_to_duration(total))
}

/// Nanoseconds in one second.
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Converts `<int>[.<frac>]` in the given unit to nanoseconds, truncating
/// below one nanosecond.
fn component_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return None;
    }
    let whole_value: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole_value.checked_mul(unit_nanos)?;
    let digits = &fraction[.. fraction.len().min(18)];
    if !digits.is_empty() {
        let scale = 10u128.pow(u32::try_from(digits.len()).ok()?);
        let fraction_value: u128 = digits.parse().ok()?;
        nanos = nanos.checked_add(fraction_value.checked_mul(unit_nanos)? / scale)?;
    }
    Some(nanos)
}

/// Converts nanoseconds to a [`Duration`], saturating at the maximum.
fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SECOND).unwrap_or(u64::MAX);
    let subsec = u32::try_from(nanos % NANOS_PER_SECOND).unwrap_or(0);
    Duration::new(secs, subsec)
}

/// Returns true for bytes that belong to the numeric part of a component.
const fn is_number_byte(byte: u8) -> bool {
    byte.is_ascii_digit() || byte == b'.'
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats a duration in compact unit form (`0s`, `250ms`, `1.5s`, `1m30s`, `2h0m0s`).
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return format!("{}µs", duration.as_micros());
    }
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let remainder_ms = total_ms % 60_000;
    let whole_secs = remainder_ms / 1000;
    let frac_ms = remainder_ms % 1000;
    let seconds = if frac_ms == 0 {
        whole_secs.to_string()
    } else {
        let frac = format!("{frac_ms:03}");
        format!("{whole_secs}.{}", frac.trim_end_matches('0'))
    };
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

// ============================================================================
// SECTION: Serde Helpers
// ============================================================================

/// Raw duration value accepted from configuration documents.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    /// Whole seconds.
    Seconds(u64),
    /// Fractional seconds.
    Fractional(f64),
    /// Compact unit string.
    Text(String),
}

impl RawDuration {
    /// Converts the raw value into a [`Duration`].
    fn into_duration(self) -> Result<Duration, DurationError> {
        match self {
            Self::Seconds(value) => Ok(Duration::from_secs(value)),
            Self::Fractional(value) => Duration::try_from_secs_f64(value)
                .map_err(|_| DurationError::Invalid(value.to_string())),
            Self::Text(value) => parse_duration(&value),
        }
    }
}

/// Serde adapter for `Option<Duration>` fields written as compact strings.
pub mod optional {
    use super::Deserialize;
    use super::Deserializer;
    use super::Duration;
    use super::RawDuration;
    use super::Serializer;
    use super::format_duration;

    /// Deserializes an optional duration.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error when the value cannot be parsed.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawDuration>::deserialize(deserializer)?;
        raw.map(RawDuration::into_duration).transpose().map_err(serde::de::Error::custom)
    }

    /// Serializes an optional duration as a compact string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error from the underlying serializer.
    #[allow(
        clippy::ref_option,
        reason = "Serde `with` adapters receive a reference to the field type."
    )]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(&format_duration(*duration)),
            None => serializer.serialize_none(),
        }
    }
}

/// Serde adapter for required `Duration` fields written as compact strings.
pub mod required {
    use super::Deserialize;
    use super::Deserializer;
    use super::Duration;
    use super::RawDuration;
    use super::Serializer;
    use super::format_duration;

    /// Deserializes a duration.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error when the value cannot be parsed.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawDuration::deserialize(deserializer)?.into_duration().map_err(serde::de::Error::custom)
    }

    /// Serializes a duration as a compact string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error from the underlying serializer.
    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*value))
    }
}
