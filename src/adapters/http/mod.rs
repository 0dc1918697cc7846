//! Local HTTP sink for ffmpeg's `-progress` reports.
//!
//! Every running stage opens one request against `/`, with its window in
//! the query string, and streams `key=value` lines in the body for as long as
//! it runs.

mod listener;
mod progress;
pub mod session;

pub use listener::CallbackListener;
pub use progress::{CallbackQuery, ListenerState};

use axum::{routing::any, Router};

pub fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/", any(progress::receive_progress))
        .with_state(state)
}
