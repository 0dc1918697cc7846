use super::session::{CallbackSession, SessionEvent};
use crate::domain::progress::ProgressModel;
use crate::domain::timing::TimingPair;
use crate::error::SplitError;
use axum::{
    body::Body,
    extract::{Query, State},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ListenerState {
    pub progress: Arc<ProgressModel>,
    pub idle_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub start: Option<String>,
    pub duration: Option<String>,
}

impl CallbackQuery {
    pub fn timing_pair(&self) -> Result<TimingPair, SplitError> {
        let (Some(start), Some(duration)) = (&self.start, &self.duration) else {
            return Err(SplitError::BadCallbackRequest {
                reason: "missing `start` or `duration` query parameter".to_string(),
            });
        };

        TimingPair::parse(start, duration).map_err(|e| SplitError::BadCallbackRequest {
            reason: e.to_string(),
        })
    }
}

// Handler that reads one stage's progress stream until it ends, stalls, or
// the transcoder hangs up.
pub async fn receive_progress(
    State(state): State<ListenerState>,
    Query(query): Query<CallbackQuery>,
    body: Body,
) -> Result<StatusCode, SplitError> {
    let pair = query.timing_pair().map_err(|err| {
        warn!("Rejecting progress callback: {}", err);
        err
    })?;

    debug!(
        start = ?pair.start(),
        duration = ?pair.duration(),
        "Progress stream opened"
    );

    let body_with_io_error = body
        .into_data_stream()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut lines = body_reader.lines();

    let mut session = CallbackSession::new(pair);
    loop {
        let line = match tokio::time::timeout(state.idle_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                // Transcoder went away mid-stream; same as a clean finish.
                debug!("Progress stream closed: {}", e);
                break;
            }
            Err(_) => {
                debug!("Progress stream idle for {:?}, done reading", state.idle_timeout);
                break;
            }
        };

        match session.feed(&line) {
            SessionEvent::Fraction(fraction) => {
                debug!("Percent done: {:.1}%", fraction * 100.0);
                state.progress.add_fraction(fraction);
            }
            SessionEvent::Baseline(out_time) => debug!("Baseline out_time_ms {}", out_time),
            SessionEvent::End => {
                debug!("done");
                break;
            }
            SessionEvent::Ignored => {}
        }
    }

    Ok(StatusCode::OK)
}
