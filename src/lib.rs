//! Splicer - cut windows out of a recording and join them back up
//!
//! Layout:
//! - domain/: Timing windows, run plans, aggregated progress
//! - ports/: Trait definitions (stage runner)
//! - adapters/: ffmpeg invocations, child processes, the progress callback server
//! - application/: The splitter service that sequences a run
//! - config: Environment configuration
//!
//! A run extracts every window of a [`PipelinePlan`] with its own ffmpeg
//! process, then concatenates the parts. While a stage runs, ffmpeg streams
//! `-progress` reports to a local HTTP listener which feeds the shared
//! [`ProgressModel`].

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use adapters::http::CallbackListener;
pub use adapters::process::ProcessRunner;
pub use application::splitter::{SplitReport, SplitterService};
pub use config::SplitterConfig;
pub use domain::plan::{PipelinePlan, StageDescriptor};
pub use domain::progress::{ProgressModel, ProgressSnapshot, SubscriptionId};
pub use domain::timing::TimingPair;
pub use error::{Result, SplitError};
pub use ports::runner::{StageCommand, StageRunner};
