//! Human-readable duration formatting and parsing utilities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

/// Duration wrapper accepting `"250ms"`, `"5s"`, `"10m"`, `"1h"`, `"7d"` or a
/// bare integer of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HumanDuration(pub Duration);

const UNITS: &[(&str, u64)] = &[
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

impl HumanDuration {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Largest whole unit that divides the value exactly, so the text parses
    /// back to the same duration.
    pub fn to_human_readable(&self) -> String {
        let ms = self.as_millis();
        if ms == 0 {
            return "0ms".to_string();
        }

        for &(unit, divisor) in UNITS {
            if ms % divisor == 0 {
                return format!("{}{}", ms / divisor, unit);
            }
        }

        format!("{}ms", ms)
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if let Ok(ms) = s.parse::<u64>() {
            return Ok(HumanDuration::from_millis(ms));
        }

        let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(0) | None => return Err(ParseError::InvalidFormat(s.to_string())),
            Some(pos) => (&s[..pos], s[pos..].trim()),
        };

        let num: u64 = num_str.parse()?;

        let multiplier = match unit {
            "ms" => 1,
            "s" | "sec" | "secs" => 1_000,
            "m" | "min" | "mins" => 60_000,
            "h" | "hr" | "hrs" => 3_600_000,
            "d" | "day" | "days" => 86_400_000,
            other => return Err(ParseError::InvalidUnit(other.to_string())),
        };

        Ok(HumanDuration::from_millis(num.saturating_mul(multiplier)))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"5s\", \"7d\") or milliseconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_millis(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_millis)
                    .map_err(|_| E::custom(format!("negative duration: {}", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_millis() {
        assert_eq!("1500".parse::<HumanDuration>().unwrap().as_millis(), 1500);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("250ms".parse::<HumanDuration>().unwrap().as_millis(), 250);
        assert_eq!("5s".parse::<HumanDuration>().unwrap().as_millis(), 5_000);
        assert_eq!("10m".parse::<HumanDuration>().unwrap().as_millis(), 600_000);
        assert_eq!("2h".parse::<HumanDuration>().unwrap().as_millis(), 7_200_000);
        assert_eq!("7d".parse::<HumanDuration>().unwrap().as_millis(), 604_800_000);
        assert_eq!(" 3 Days".parse::<HumanDuration>().unwrap().as_millis(), 259_200_000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "fast".parse::<HumanDuration>(),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "5 weeks".parse::<HumanDuration>(),
            Err(ParseError::InvalidUnit(_))
        ));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(HumanDuration::from_millis(1_500).to_human_readable(), "1500ms");
        assert_eq!(HumanDuration::from_secs(5).to_human_readable(), "5s");
        assert_eq!(HumanDuration::from_secs(90 * 60).to_human_readable(), "90m");
        assert_eq!(HumanDuration::from_secs(7 * 86_400).to_human_readable(), "7d");
        assert_eq!(HumanDuration::from_millis(0).to_human_readable(), "0ms");
    }

    #[test]
    fn test_deserialize_string_and_number() {
        #[derive(Deserialize)]
        struct TestStruct {
            timeout: HumanDuration,
            retention: HumanDuration,
        }
        let parsed: TestStruct =
            serde_json::from_str(r#"{"timeout": 750, "retention": "30d"}"#).unwrap();
        assert_eq!(parsed.timeout.as_millis(), 750);
        assert_eq!(parsed.retention.as_duration(), Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn test_serialize_is_parseable() {
        let value = HumanDuration::from_secs(3_600);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: HumanDuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
