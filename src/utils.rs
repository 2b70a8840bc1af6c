//! General utilities.

use chrono::TimeZone;

use crate::error::UsageError;
use crate::trace::Timestamp;

const BINARY_UNITS: [&str; 5] = ["Bytes", "KiB", "MiB", "GiB", "TiB"];

/// Parse a byte size such as `4096`, `0x1000`, `4KiB`, `2MB` or `1 GiB`.
///
/// Suffixes are `K`, `M`, `G` and `T` followed by `B` (powers of 1000) or
/// `iB` (powers of 1024). A bare number is taken as bytes.
pub fn parse_size(input: &str) -> Result<u64, UsageError> {
    let invalid = || UsageError(format!("invalid size '{input}'"));
    let s = input.trim();

    if s.ends_with(|c: char| c.is_ascii_digit()) {
        return parse_integer(s).ok_or_else(invalid);
    }

    let s = s.strip_suffix('B').ok_or_else(invalid)?;
    let (s, multiplier) = match s.strip_suffix('i') {
        Some(rest) => (rest, 1024u64),
        None => (s, 1000u64),
    };
    let (digits, exponent) = match s.chars().last() {
        Some('K') => (&s[..s.len() - 1], 1),
        Some('M') => (&s[..s.len() - 1], 2),
        Some('G') => (&s[..s.len() - 1], 3),
        Some('T') => (&s[..s.len() - 1], 4),
        _ => return Err(invalid()),
    };

    let base = parse_integer(digits.trim_end()).ok_or_else(invalid)?;
    multiplier
        .checked_pow(exponent)
        .and_then(|unit| base.checked_mul(unit))
        .ok_or_else(invalid)
}

fn parse_integer(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Format a byte count in the largest binary unit that divides it exactly.
///
/// `format_size(4096)` is `"4 KiB"`, `format_size(1000)` is `"1000 Bytes"`.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes;
    let mut unit = 0;
    while unit + 1 < BINARY_UNITS.len() && value != 0 && value % 1024 == 0 {
        value /= 1024;
        unit += 1;
    }
    format!("{value} {}", BINARY_UNITS[unit])
}

/// Render a frame timestamp as `YYYY-MM-DD_HH:MM:SS.uuuuuu` in `tz`.
pub fn format_frame_timestamp<Tz: TimeZone>(timestamp: Timestamp, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match tz
        .timestamp_opt(i64::from(timestamp.seconds), 0)
        .earliest()
    {
        Some(time) => format!("{}.{:06}", time.format("%F_%T"), timestamp.micros),
        None => format!("{}.{:06}", timestamp.seconds, timestamp.micros),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("4096", 4096)]
    #[case("0x1000", 4096)]
    #[case("4KiB", 4096)]
    #[case("4KB", 4000)]
    #[case("2MiB", 2 * 1024 * 1024)]
    #[case("1 GiB", 1 << 30)]
    #[case("1TB", 1_000_000_000_000)]
    fn parses_sizes(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(parse_size(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("4K")]
    #[case("KiB")]
    #[case("4XB")]
    #[case("-1")]
    #[case("99999999999TiB")]
    fn rejects_bad_sizes(#[case] input: &str) {
        assert!(parse_size(input).is_err(), "{input:?} should not parse");
    }

    #[test]
    fn formats_largest_exact_unit() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(1000), "1000 Bytes");
        assert_eq!(format_size(4096), "4 KiB");
        assert_eq!(format_size(6 * 1024 * 1024), "6 MiB");
        assert_eq!(format_size(1536 * 1024), "1536 KiB");
        assert_eq!(format_size(1 << 50), "1024 TiB");
    }

    #[test]
    fn frame_timestamps() {
        let ts = Timestamp {
            seconds: 1_700_000_000,
            micros: 42,
        };

        assert_eq!(
            format_frame_timestamp(ts, &Utc),
            "2023-11-14_22:13:20.000042"
        );
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            format_frame_timestamp(ts, &east),
            "2023-11-15_00:13:20.000042"
        );
    }
}
