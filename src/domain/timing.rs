//! Extraction windows and their `HH:MM:SS.mmm` text form.
//!
//! Durations are stored as whole milliseconds. Floats only show up later,
//! when progress is turned into a fraction.

use crate::error::{Result, SplitError};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;

fn timing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2,}):(\d{2}):(\d{2})\.(\d{3})$").unwrap())
}

/// One `(start, duration)` window cut out of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimingPair {
    start: Duration,
    duration: Duration,
}

impl TimingPair {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// Build a pair from two canonical timing strings.
    pub fn parse(start: &str, duration: &str) -> Result<Self> {
        Ok(Self::new(parse(start)?, parse(duration)?))
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn duration_millis(&self) -> u64 {
        as_millis(self.duration)
    }
}

/// Parse `HH:MM:SS.mmm`. Hours may run past two digits, everything else is
/// fixed width and range checked.
pub fn parse(input: &str) -> Result<Duration> {
    let malformed = || SplitError::MalformedTiming {
        input: input.to_string(),
    };

    let caps = timing_regex().captures(input).ok_or_else(malformed)?;
    let field = |i: usize| -> Result<u64> {
        caps[i].parse::<u64>().map_err(|_| malformed())
    };

    let (hours, minutes, seconds, millis) = (field(1)?, field(2)?, field(3)?, field(4)?);
    if minutes > 59 || seconds > 59 {
        return Err(malformed());
    }

    let total = hours
        .checked_mul(MILLIS_PER_HOUR)
        .and_then(|ms| ms.checked_add(minutes * MILLIS_PER_MINUTE))
        .and_then(|ms| ms.checked_add(seconds * MILLIS_PER_SECOND))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(malformed)?;

    Ok(Duration::from_millis(total))
}

/// Render a duration as `HH:MM:SS.mmm`. Anything below a millisecond is
/// dropped.
pub fn format(duration: Duration) -> String {
    let total = as_millis(duration);
    let hours = total / MILLIS_PER_HOUR;
    let minutes = (total % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let seconds = (total % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;
    let millis = total % MILLIS_PER_SECOND;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        assert_eq!(parse("00:01:02.500").unwrap(), Duration::from_millis(62_500));
        assert_eq!(parse("00:00:00.000").unwrap(), Duration::ZERO);
        assert_eq!(
            parse("01:00:00.001").unwrap(),
            Duration::from_millis(3_600_001)
        );
    }

    #[test]
    fn test_parse_allows_long_hours() {
        assert_eq!(
            parse("123:00:00.000").unwrap(),
            Duration::from_secs(123 * 3600)
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_fields() {
        assert!(parse("00:60:00.000").is_err());
        assert!(parse("00:00:60.000").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        for input in [
            "",
            "0:00:00.000",
            "00:0:00.000",
            "00:00:00.00",
            "00:00:00.0000",
            "00:00:00",
            "00:00:00,000",
            " 00:00:00.000",
            "00:00:00.000\n",
            "-1:00:00.000",
            "aa:bb:cc.ddd",
        ] {
            let err = parse(input).unwrap_err();
            assert!(
                matches!(err, SplitError::MalformedTiming { .. }),
                "expected MalformedTiming for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_format_pads_every_field() {
        assert_eq!(format(Duration::from_millis(62_500)), "00:01:02.500");
        assert_eq!(format(Duration::ZERO), "00:00:00.000");
        assert_eq!(format(Duration::from_millis(5)), "00:00:00.005");
        assert_eq!(format(Duration::from_secs(100 * 3600)), "100:00:00.000");
    }

    #[test]
    fn test_format_truncates_sub_millis() {
        assert_eq!(format(Duration::from_micros(1_999)), "00:00:00.001");
    }

    #[test]
    fn test_format_then_parse_is_identity() {
        for ms in [0u64, 1, 999, 1_000, 59_999, 60_000, 3_599_999, 3_600_000, 86_400_123] {
            let d = Duration::from_millis(ms);
            assert_eq!(parse(&format(d)).unwrap(), d, "round trip of {}ms", ms);
        }
    }

    #[test]
    fn test_pair_from_strings() {
        let pair = TimingPair::parse("00:00:10.000", "00:00:05.000").unwrap();
        assert_eq!(pair.start(), Duration::from_secs(10));
        assert_eq!(pair.duration_millis(), 5_000);

        assert!(TimingPair::parse("00:00:10.000", "5s").is_err());
    }
}
