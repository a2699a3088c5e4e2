//! Go-style duration strings (`"5m"`, `"1h30m"`, `"1d"`) used throughout
//! pipeline configuration: dedup windows, join TTLs, ack-wait, batch delay,
//! Kafka poll timeout, ClickHouse insert deadline.

use std::fmt;
use std::time::Duration as StdDuration;

use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};

/// A parsed Go-style duration, newtyped over `std::time::Duration` so config
/// structs can `#[serde(with = "go_duration")]` or use this type directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GoDuration(pub StdDuration);

impl GoDuration {
    pub fn as_std(self) -> StdDuration {
        self.0
    }
}

impl From<StdDuration> for GoDuration {
    fn from(d: StdDuration) -> Self {
        GoDuration(d)
    }
}

impl From<GoDuration> for StdDuration {
    fn from(d: GoDuration) -> Self {
        d.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseDurationError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration unit {0:?}")]
    InvalidUnit(String),
    #[error("invalid duration number {0:?}")]
    InvalidNumber(String),
}

/// Parses a Go-style duration string such as `"5m"`, `"1h30m"`, `"1d"`
/// (`1d = 24h`), `"500ms"`, `"30s"`. Units may be combined and must appear
/// in descending magnitude, matching Go's `time.ParseDuration` grammar plus
/// the non-standard `d` unit this system adds for day-scale TTLs.
pub fn parse(s: &str) -> Result<GoDuration, ParseDurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseDurationError::Empty);
    }

    let bytes = s.as_bytes();
    let mut pos = 0usize;
    let mut total = StdDuration::ZERO;

    while pos < bytes.len() {
        let num_start = pos;
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
            pos += 1;
        }
        if pos == num_start {
            return Err(ParseDurationError::InvalidNumber(s.to_string()));
        }
        let number_str = &s[num_start..pos];

        let unit_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_digit() && bytes[pos] != b'.' {
            pos += 1;
        }
        let unit_str = &s[unit_start..pos];
        if unit_str.is_empty() {
            return Err(ParseDurationError::InvalidUnit(s.to_string()));
        }

        let value: f64 = number_str
            .parse()
            .map_err(|_| ParseDurationError::InvalidNumber(number_str.to_string()))?;
        let unit_secs = unit_seconds(unit_str)?;
        total += StdDuration::from_secs_f64(value * unit_secs);
    }

    Ok(GoDuration(total))
}

fn unit_seconds(unit: &str) -> Result<f64, ParseDurationError> {
    match unit {
        "ns" => Ok(1e-9),
        "us" | "\u{00b5}s" => Ok(1e-6),
        "ms" => Ok(1e-3),
        "s" => Ok(1.0),
        "m" => Ok(60.0),
        "h" => Ok(3600.0),
        "d" => Ok(24.0 * 3600.0),
        other => Err(ParseDurationError::InvalidUnit(other.to_string())),
    }
}

impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Serialize for GoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Round-trips through seconds; the exact Go-style string form is
        // only required on the way in (operator-authored config).
        serializer.serialize_f64(self.0.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for GoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;
        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = GoDuration;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a Go-style duration string like \"5m\" or \"1h30m\"")
            }
            fn visit_str<E: SerdeError>(self, v: &str) -> Result<GoDuration, E> {
                parse(v).map_err(E::custom)
            }
            fn visit_f64<E: SerdeError>(self, v: f64) -> Result<GoDuration, E> {
                Ok(GoDuration(StdDuration::from_secs_f64(v)))
            }
        }
        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_units() {
        assert_eq!(parse("5m").unwrap().0, StdDuration::from_secs(300));
        assert_eq!(parse("30s").unwrap().0, StdDuration::from_secs(30));
        assert_eq!(parse("500ms").unwrap().0, StdDuration::from_millis(500));
    }

    #[test]
    fn parses_combined_units() {
        assert_eq!(
            parse("1h30m").unwrap().0,
            StdDuration::from_secs(3600 + 30 * 60)
        );
    }

    #[test]
    fn day_is_24_hours() {
        assert_eq!(parse("1d").unwrap().0, StdDuration::from_secs(24 * 3600));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(parse("").is_err());
        assert!(parse("5x").is_err());
        assert!(parse("m5").is_err());
    }
}
