//! Duration string parsing
//!
//! Job descriptors and configuration express intervals as `"500"`, `"250ms"`,
//! `"30s"`, `"5m"`, `"2h"` or `"1d"`. A bare number is milliseconds.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::errors::ConfigError;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(ms|s|m|h|d)?$").expect("duration pattern is a valid regex")
});

/// Parse a duration string matching `^\d+(ms|s|m|h|d)?$`
///
/// Anything else, surrounding whitespace included, is rejected.
///
/// # Examples
/// ```
/// use iptv_arbiter::utils::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert!(parse_duration("1h30m").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        value: value.to_string(),
    };

    let caps = DURATION_PATTERN.captures(value).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;

    let multiplier_ms: u64 = match caps.get(2).map(|m| m.as_str()) {
        None | Some("ms") => 1,
        Some("s") => 1_000,
        Some("m") => 60_000,
        Some("h") => 3_600_000,
        Some("d") => 86_400_000,
        Some(_) => return Err(invalid()),
    };

    amount
        .checked_mul(multiplier_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

/// Render a duration in the compact human form used in logs, truncated to
/// whole milliseconds (`1s 250ms`)
pub fn format_duration(duration: Duration) -> String {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_millis(millis)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", 0)]
    #[case("1500", 1_500)]
    #[case("250ms", 250)]
    #[case("30s", 30_000)]
    #[case("5m", 300_000)]
    #[case("2h", 7_200_000)]
    #[case("1d", 86_400_000)]
    fn test_parse_valid_durations(#[case] input: &str, #[case] expected_ms: u64) {
        assert_eq!(
            parse_duration(input).unwrap(),
            Duration::from_millis(expected_ms)
        );
    }

    #[rstest]
    #[case("")]
    #[case("s")]
    #[case("-5s")]
    #[case("1.5s")]
    #[case("1h30m")]
    #[case("10 s")]
    #[case("5w")]
    #[case("5S")]
    #[case(" 10s ")]
    #[case("10s\n")]
    fn test_parse_rejects_invalid_durations(#[case] input: &str) {
        let err = parse_duration(input).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    }

    #[test]
    fn test_format_duration_truncates_to_millis() {
        assert_eq!(format_duration(Duration::from_micros(1_250_999)), "1s 250ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_micros(400)), "0s");
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse_duration("99999999999999999999d").is_err());
        assert!(parse_duration("18446744073709551615d").is_err());
    }
}
