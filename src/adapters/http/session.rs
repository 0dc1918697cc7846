//! Decoding of ffmpeg's `-progress` stream.
//!
//! The body is a never-ending run of `key=value` lines. Only `out_time_ms`
//! and `progress` mean anything to us.

use crate::domain::timing::TimingPair;
use tracing::trace;

/// One `key=value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

impl<'a> ProgressSample<'a> {
    /// Splits on the first `=`. Lines without one are not samples.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        line.split_once('=').map(|(key, value)| ProgressSample {
            key: key.trim(),
            value: value.trim(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// First timestamp of the session, kept as the zero point.
    Baseline(i64),
    /// Share of the stage's duration covered so far.
    Fraction(f64),
    /// The transcoder said `progress=end`.
    End,
    Ignored,
}

/// Per-connection decode state.
#[derive(Debug, Clone)]
pub struct CallbackSession {
    pair: TimingPair,
    baseline: Option<i64>,
}

impl CallbackSession {
    pub fn new(pair: TimingPair) -> Self {
        Self {
            pair,
            baseline: None,
        }
    }

    pub fn pair(&self) -> &TimingPair {
        &self.pair
    }

    pub fn feed(&mut self, line: &str) -> SessionEvent {
        let Some(sample) = ProgressSample::parse(line) else {
            trace!("Skipping progress line without `=`: {:?}", line);
            return SessionEvent::Ignored;
        };

        match sample.key {
            "out_time_ms" => match sample.value.parse::<i64>() {
                Ok(out_time) => self.out_time(out_time),
                Err(_) => {
                    trace!("Unreadable out_time_ms {:?}", sample.value);
                    SessionEvent::Ignored
                }
            },
            "progress" if sample.value == "end" => SessionEvent::End,
            _ => {
                trace!(key = sample.key, value = sample.value, "Ignoring progress key");
                SessionEvent::Ignored
            }
        }
    }

    fn out_time(&mut self, out_time: i64) -> SessionEvent {
        // With -copyts the first timestamp is rarely zero, so everything is
        // measured from whatever the first report says.
        let Some(baseline) = self.baseline else {
            self.baseline = Some(out_time);
            return SessionEvent::Baseline(out_time);
        };

        let elapsed = out_time.saturating_sub(baseline);
        let duration = self.pair.duration_millis();
        if duration == 0 {
            return if elapsed > 0 {
                SessionEvent::Fraction(1.0)
            } else {
                SessionEvent::Ignored
            };
        }

        SessionEvent::Fraction(elapsed as f64 / duration as f64)
    }
}
