//! End-to-end runs against a stand-in for ffmpeg that reports progress over
//! the real callback listener.

use async_trait::async_trait;
use parking_lot::Mutex;
use splicer::domain::timing;
use splicer::{
    PipelinePlan, ProgressModel, SplitterConfig, SplitterService, StageCommand, StageRunner,
    TimingPair,
};
use std::io;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct Observed {
    status: String,
    fraction: f64,
}

/// Posts a `-progress` stream like ffmpeg would, halfway through the stage's
/// window, then exits 0.
struct FakeFfmpeg {
    progress: Arc<ProgressModel>,
    observed: Mutex<Vec<Observed>>,
    /// Calls (0-based) whose callback URL loses its `duration` parameter.
    drop_duration_on: Option<usize>,
}

impl FakeFfmpeg {
    fn new(progress: Arc<ProgressModel>, drop_duration_on: Option<usize>) -> Self {
        Self {
            progress,
            observed: Mutex::new(Vec::new()),
            drop_duration_on,
        }
    }
}

#[async_trait]
impl StageRunner for FakeFfmpeg {
    async fn run(&self, command: &StageCommand, _cancel: &CancellationToken) -> io::Result<i32> {
        let call = self.observed.lock().len();
        let url = command
            .flag_value("-progress")
            .and_then(|url| url.to_str())
            .expect("no progress url")
            .to_string();

        let (authority, path) = url
            .trim_start_matches("http://")
            .split_once('/')
            .expect("url without path");
        let query = path.trim_start_matches('?');
        let duration_ms = query
            .split('&')
            .find_map(|kv| kv.strip_prefix("duration="))
            .map(|d| timing::parse(d).unwrap().as_millis() as i64)
            .unwrap();
        let query = if self.drop_duration_on == Some(call) {
            query.split('&').next().unwrap().to_string()
        } else {
            query.to_string()
        };

        let mut stream = TcpStream::connect(authority).await?;
        let head = format!(
            "POST /?{} HTTP/1.1\r\nHost: {}\r\nTransfer-Encoding: chunked\r\n\r\n",
            query, authority
        );
        stream.write_all(head.as_bytes()).await?;

        let body = format!(
            "frame=1\nout_time_ms=40000\nprogress=continue\nframe=2\nout_time_ms={}\nprogress=end\n",
            40_000 + duration_ms / 2
        );
        let chunk = format!("{:x}\r\n{}\r\n0\r\n\r\n", body.len(), body);
        // A rejected request may be answered and closed before the body lands.
        let _ = stream.write_all(chunk.as_bytes()).await;

        let mut status = [0u8; 12];
        stream.read_exact(&mut status).await?;

        self.observed.lock().push(Observed {
            status: String::from_utf8_lossy(&status).into_owned(),
            fraction: self.progress.current_fraction(),
        });
        Ok(0)
    }
}

fn plan(dir: &std::path::Path) -> PipelinePlan {
    PipelinePlan::new(
        "/media/recording.ts",
        dir.join("result.ts"),
        dir,
        vec![
            TimingPair::parse("00:00:10.000", "00:00:05.000").unwrap(),
            TimingPair::parse("00:01:00.000", "00:00:02.000").unwrap(),
        ],
    )
}

fn config() -> SplitterConfig {
    SplitterConfig {
        port: 0,
        idle_timeout: Duration::from_millis(500),
        ..SplitterConfig::default()
    }
}

#[tokio::test]
async fn test_progress_follows_each_stage_to_completion() {
    let dir = tempdir().unwrap();
    let plan = plan(dir.path());
    let progress = Arc::new(ProgressModel::for_plan(&plan));

    let (tx, rx) = mpsc::channel();
    progress
        .subscribe(move |snapshot| {
            let _ = tx.send(snapshot.percent);
        })
        .unwrap();

    let runner = FakeFfmpeg::new(progress.clone(), None);
    let splitter = SplitterService::new(config(), runner, progress.clone());
    let report = splitter.run(&plan, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.segments, 2);
    assert_eq!(progress.current_percent(), 100);
    assert_eq!(progress.completed_units(), 3);

    let mut percents = Vec::new();
    while let Ok(percent) = rx.recv_timeout(Duration::from_secs(5)) {
        percents.push(percent);
        if percent == 100 {
            break;
        }
    }
    assert_eq!(percents.last(), Some(&100));
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "percent went backwards: {:?}",
        percents
    );
}

#[tokio::test]
async fn test_each_stage_is_measured_against_its_own_window() {
    let dir = tempdir().unwrap();
    let plan = plan(dir.path());
    let progress = Arc::new(ProgressModel::for_plan(&plan));
    let runner = Arc::new(FakeFfmpeg::new(progress.clone(), None));

    let splitter = SplitterService::new(config(), SharedRunner(runner.clone()), progress);
    splitter.run(&plan, &CancellationToken::new()).await.unwrap();

    let observed = runner.observed.lock();
    assert_eq!(observed.len(), 3);
    for stage in observed.iter() {
        assert_eq!(stage.status, "HTTP/1.1 200");
        assert_eq!(stage.fraction, 0.5);
    }
}

#[tokio::test]
async fn test_bad_callback_leaves_pipeline_running() {
    let dir = tempdir().unwrap();
    let plan = plan(dir.path());
    let progress = Arc::new(ProgressModel::for_plan(&plan));
    let runner = Arc::new(FakeFfmpeg::new(progress.clone(), Some(1)));

    let splitter = SplitterService::new(config(), SharedRunner(runner.clone()), progress.clone());
    let report = splitter.run(&plan, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.output, plan.output);
    assert_eq!(progress.current_percent(), 100);

    let observed = runner.observed.lock();
    assert_eq!(observed[0].status, "HTTP/1.1 200");
    assert_eq!(observed[1].status, "HTTP/1.1 400");
    assert_eq!(observed[1].fraction, 0.0);
    assert_eq!(observed[2].status, "HTTP/1.1 200");
}

struct SharedRunner(Arc<FakeFfmpeg>);

#[async_trait]
impl StageRunner for SharedRunner {
    async fn run(&self, command: &StageCommand, cancel: &CancellationToken) -> io::Result<i32> {
        self.0.run(command, cancel).await
    }
}
