//! Serde adapters for the `^\d+(ms|s|m|h|d)?$` duration format.
//!
//! Strings go through [`parse_duration`]; bare integers are milliseconds.
//! Anything else is a hard deserialization error.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

use crate::utils::duration::parse_duration;

fn to_compact(duration: &Duration) -> String {
    let ms = duration.as_millis();
    if ms == 0 {
        return "0".to_string();
    }
    for (unit, size) in [("d", 86_400_000u128), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)] {
        if ms % size == 0 {
            return format!("{}{unit}", ms / size);
        }
    }
    format!("{ms}ms")
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a duration as milliseconds (number) or a string such as '500ms', '30s', '5m', '2h', '1d'")
    }

    fn visit_u64<E>(self, millis: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Duration::from_millis(millis))
    }

    fn visit_i64<E>(self, millis: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(millis)
            .map(Duration::from_millis)
            .map_err(|_| de::Error::custom(format!("Invalid duration '{millis}': must not be negative")))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        parse_duration(value).map_err(de::Error::custom)
    }
}

/// Custom serde functions for Duration
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_compact(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Custom serde functions for Option<Duration>
pub mod option_duration {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&to_compact(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OptionDurationVisitor;

        impl<'de> Visitor<'de> for OptionDurationVisitor {
            type Value = Option<Duration>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("null or a duration")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                super::duration::deserialize(deserializer).map(Some)
            }
        }

        deserializer.deserialize_option(OptionDurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "super::duration")]
        every: Duration,
        #[serde(default, with = "super::option_duration", skip_serializing_if = "Option::is_none")]
        delay: Option<Duration>,
    }

    #[test]
    fn test_string_and_integer_forms() {
        let parsed: Sample = serde_json::from_str(r#"{"every": "5m", "delay": 1500}"#).unwrap();
        assert_eq!(parsed.every, Duration::from_secs(300));
        assert_eq!(parsed.delay, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_missing_optional_duration() {
        let parsed: Sample = serde_json::from_str(r#"{"every": "1d"}"#).unwrap();
        assert_eq!(parsed.delay, None);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        assert!(serde_json::from_str::<Sample>(r#"{"every": "5 minutes"}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"every": -5}"#).is_err());
    }

    #[test]
    fn test_serializes_to_compact_units() {
        let sample = Sample {
            every: Duration::from_secs(7200),
            delay: Some(Duration::from_millis(1500)),
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"every":"2h","delay":"1500ms"}"#);
    }
}
