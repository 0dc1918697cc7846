//! Error types for the splitter.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::plan::StageDescriptor;

pub type Result<T> = std::result::Result<T, SplitError>;

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("malformed timing `{input}`, expected HH:MM:SS.mmm")]
    MalformedTiming { input: String },

    #[error("bad progress callback request: {reason}")]
    BadCallbackRequest { reason: String },

    #[error("{stage} failed with exit code {code}")]
    StageFailed { stage: StageLabel, code: i32 },

    #[error("progress listener failed on {addr}: {source}")]
    ListenerIo {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timing data line {line}: {reason}")]
    TimingData { line: usize, reason: String },

    #[error("plan has no segments to extract")]
    EmptyPlan,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplitError {
    pub(crate) fn listener_io(addr: impl ToString, source: std::io::Error) -> Self {
        SplitError::ListenerIo {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Which stage of a run failed. Kept apart from [`StageDescriptor`] so errors
/// don't carry temp file handles around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLabel {
    Segment(usize),
    Concat,
}

impl std::fmt::Display for StageLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageLabel::Segment(index) => write!(f, "segment #{}", index),
            StageLabel::Concat => write!(f, "concat stage"),
        }
    }
}

impl From<&StageDescriptor> for StageLabel {
    fn from(stage: &StageDescriptor) -> Self {
        match stage {
            StageDescriptor::Segment { index, .. } => StageLabel::Segment(*index),
            StageDescriptor::Concat { .. } => StageLabel::Concat,
        }
    }
}

impl IntoResponse for SplitError {
    fn into_response(self) -> Response {
        let status = match self {
            SplitError::BadCallbackRequest { .. } | SplitError::MalformedTiming { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
