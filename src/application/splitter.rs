use crate::adapters::ffmpeg::{self, ConcatManifest};
use crate::adapters::http::CallbackListener;
use crate::config::SplitterConfig;
use crate::domain::plan::{PipelinePlan, StageDescriptor};
use crate::domain::progress::ProgressModel;
use crate::error::{Result, SplitError, StageLabel};
use crate::ports::runner::{StageCommand, StageRunner, CANCELLED_EXIT_CODE};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub output: PathBuf,
    pub segments: usize,
    pub total_duration: Duration,
}

/// Cuts every window of a plan into its own part, then joins the parts.
///
/// Stages run one after another. Each segment is worth one progress unit and
/// the concat one more.
pub struct SplitterService<R> {
    config: SplitterConfig,
    runner: R,
    progress: Arc<ProgressModel>,
}

impl<R> SplitterService<R>
where
    R: StageRunner,
{
    pub fn new(config: SplitterConfig, runner: R, progress: Arc<ProgressModel>) -> Self {
        Self {
            config,
            runner,
            progress,
        }
    }

    pub fn progress(&self) -> &Arc<ProgressModel> {
        &self.progress
    }

    /// Run the whole plan. The first failing stage aborts the run; the
    /// progress listener is stopped and scratch files removed either way.
    pub async fn run(&self, plan: &PipelinePlan, cancel: &CancellationToken) -> Result<SplitReport> {
        if plan.pairs.is_empty() {
            return Err(SplitError::EmptyPlan);
        }

        remove_if_exists(&plan.output).await?;

        let listener = CallbackListener::start(
            &self.config.bind_addr(),
            self.progress.clone(),
            self.config.idle_timeout,
        )
        .await?;

        // Dropping these deletes the part files and the concat list.
        let mut scratch = Vec::new();
        let result = self
            .run_stages(plan, listener.local_addr(), &mut scratch, cancel)
            .await;

        listener.stop().await;
        drop(scratch);

        match &result {
            Ok(report) => info!(
                "Wrote {:?} from {} segments ({:?})",
                report.output, report.segments, report.total_duration
            ),
            Err(e) => warn!("Split failed: {}", e),
        }
        result
    }

    async fn run_stages(
        &self,
        plan: &PipelinePlan,
        callback: SocketAddr,
        scratch: &mut Vec<TempPath>,
        cancel: &CancellationToken,
    ) -> Result<SplitReport> {
        let mut manifest = ConcatManifest::new();
        let mut total_duration = Duration::ZERO;

        for (index, pair) in plan.pairs.iter().enumerate() {
            let part = scratch_file(&plan.temp_dir, "part-", ".ts", scratch).await?;
            let stage = StageDescriptor::Segment {
                index,
                pair: *pair,
                part: part.clone(),
            };
            let command = ffmpeg::segment_command(
                &self.config.ffmpeg,
                &ffmpeg::callback_url(callback, &stage.callback_pair()),
                pair,
                &plan.input,
                &part,
            );

            self.run_stage(&stage, &command, cancel).await?;

            manifest.add_part(part);
            total_duration += pair.duration();
            self.progress.stage_completed();
        }

        let list = scratch_file(&plan.temp_dir, "concat-", ".txt", scratch).await?;
        manifest.write_to(&list).await?;
        debug!("Concat list {:?}:\n{}", list, manifest.render());

        let stage = StageDescriptor::Concat {
            parts: manifest.parts.clone(),
            output: plan.output.clone(),
            duration: total_duration,
        };
        let command = ffmpeg::concat_command(
            &self.config.ffmpeg,
            &ffmpeg::callback_url(callback, &stage.callback_pair()),
            &list,
            &plan.output,
        );

        if let Err(e) = self.run_stage(&stage, &command, cancel).await {
            // Don't leave a half-written result behind.
            if let Err(rm) = remove_if_exists(&plan.output).await {
                warn!("Could not remove partial output {:?}: {}", plan.output, rm);
            }
            return Err(e);
        }
        self.progress.stage_completed();

        Ok(SplitReport {
            output: plan.output.clone(),
            segments: plan.segment_count(),
            total_duration,
        })
    }

    async fn run_stage(
        &self,
        stage: &StageDescriptor,
        command: &StageCommand,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let label = StageLabel::from(stage);
        if cancel.is_cancelled() {
            return Err(SplitError::StageFailed {
                stage: label,
                code: CANCELLED_EXIT_CODE,
            });
        }

        info!("Starting {}", stage);
        let code = self.runner.run(command, cancel).await?;
        info!("{} finished with {}", stage, code);

        if code != 0 {
            return Err(SplitError::StageFailed { stage: label, code });
        }
        Ok(())
    }
}

/// Reserve a uniquely named file under `dir` and return its absolute path.
async fn scratch_file(
    dir: &Path,
    prefix: &str,
    suffix: &str,
    scratch: &mut Vec<TempPath>,
) -> Result<PathBuf> {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)?
        .into_temp_path();
    let path = tokio::fs::canonicalize(&temp).await?;
    scratch.push(temp);
    Ok(path)
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed existing {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
