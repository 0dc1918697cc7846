use super::timing::{self, TimingPair};
use crate::error::{Result, SplitError};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything one run needs: the windows to cut, in order, and where files go.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub input: PathBuf,
    pub output: PathBuf,
    pub temp_dir: PathBuf,
    pub pairs: Vec<TimingPair>,
}

impl PipelinePlan {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        pairs: Vec<TimingPair>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            temp_dir: temp_dir.into(),
            pairs,
        }
    }

    /// Load the windows from timing data: one `START DURATION` pair per line.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_timing_data<R: BufRead>(
        reader: R,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let pairs = parse_timing_data(reader)?;
        Ok(Self::new(input, output, temp_dir, pairs))
    }

    pub fn segment_count(&self) -> usize {
        self.pairs.len()
    }

    /// One unit per segment plus one for the concat stage.
    pub fn total_units(&self) -> usize {
        self.pairs.len() + 1
    }

    pub fn total_duration(&self) -> Duration {
        self.pairs.iter().map(TimingPair::duration).sum()
    }
}

pub fn parse_timing_data<R: BufRead>(reader: R) -> Result<Vec<TimingPair>> {
    let mut pairs = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (start, duration) = match (fields.next(), fields.next(), fields.next()) {
            (Some(start), Some(duration), None) => (start, duration),
            _ => {
                return Err(SplitError::TimingData {
                    line: line_no,
                    reason: format!("expected `START DURATION`, got `{}`", line),
                })
            }
        };

        let pair = TimingPair::parse(start, duration).map_err(|e| SplitError::TimingData {
            line: line_no,
            reason: e.to_string(),
        })?;
        pairs.push(pair);
    }

    Ok(pairs)
}

/// A single external process invocation within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDescriptor {
    Segment {
        index: usize,
        pair: TimingPair,
        part: PathBuf,
    },
    Concat {
        parts: Vec<PathBuf>,
        output: PathBuf,
        duration: Duration,
    },
}

impl StageDescriptor {
    /// The window reported back in the stage's progress callback URL.
    pub fn callback_pair(&self) -> TimingPair {
        match self {
            StageDescriptor::Segment { pair, .. } => *pair,
            StageDescriptor::Concat { duration, .. } => TimingPair::new(Duration::ZERO, *duration),
        }
    }

    pub fn output_path(&self) -> &Path {
        match self {
            StageDescriptor::Segment { part, .. } => part,
            StageDescriptor::Concat { output, .. } => output,
        }
    }
}

impl std::fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageDescriptor::Segment { index, pair, .. } => write!(
                f,
                "segment #{} ({} +{})",
                index,
                timing::format(pair.start()),
                timing::format(pair.duration())
            ),
            StageDescriptor::Concat { parts, .. } => {
                write!(f, "concat of {} parts", parts.len())
            }
        }
    }
}
