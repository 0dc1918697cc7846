use clap::Parser;
use splicer::{PipelinePlan, ProcessRunner, ProgressModel, SplitterConfig, SplitterService};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Cut windows out of a recording with ffmpeg and join them into one file.
#[derive(Debug, Parser)]
#[command(name = "splicer", version)]
struct Args {
    /// Source recording
    #[arg(short, long)]
    input: PathBuf,

    /// Where the joined result goes (replaced if it exists)
    #[arg(short, long)]
    output: PathBuf,

    /// Timing data: one `HH:MM:SS.mmm HH:MM:SS.mmm` start/duration pair per line
    #[arg(short, long)]
    timings: PathBuf,

    /// Progress listener port, overrides SPLITTER_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Scratch directory, overrides SPLITTER_TEMP_DIR
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut config = SplitterConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = temp_dir;
    }

    let timings = match File::open(&args.timings) {
        Ok(file) => BufReader::new(file),
        Err(e) => {
            error!("Can't read timing data {:?}: {}", args.timings, e);
            return ExitCode::FAILURE;
        }
    };
    let plan = match PipelinePlan::from_timing_data(
        timings,
        args.input,
        args.output,
        config.temp_dir.clone(),
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!("Bad timing data in {:?}: {}", args.timings, e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Splitting {:?} into {} segments ({:?} total)",
        plan.input,
        plan.segment_count(),
        plan.total_duration()
    );

    let progress = Arc::new(ProgressModel::for_plan(&plan));
    let last_percent = AtomicU8::new(u8::MAX);
    if let Err(e) = progress.subscribe(move |snapshot| {
        if last_percent.swap(snapshot.percent, Ordering::Relaxed) != snapshot.percent {
            info!(
                "{}% done ({}/{} stages)",
                snapshot.percent, snapshot.completed_units, snapshot.total_units
            );
        }
    }) {
        warn!("Progress reporting unavailable: {}", e);
    }

    // Ctrl-C kills the running ffmpeg and winds the run down.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    let splitter = SplitterService::new(config, ProcessRunner::new(), progress);
    match splitter.run(&plan, &cancel).await {
        Ok(report) => {
            info!("Done: {:?}", report.output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
