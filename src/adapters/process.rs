//! Tokio-backed [`StageRunner`].

use crate::ports::runner::{StageCommand, StageRunner, CANCELLED_EXIT_CODE};
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageRunner for ProcessRunner {
    async fn run(&self, command: &StageCommand, cancel: &CancellationToken) -> io::Result<i32> {
        debug!("Running {}", command);

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Both streams end up in the same log, one line at a time.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let drain = async {
            tokio::join!(drain_lines(stdout), drain_lines(stderr));
        };

        let finished = tokio::select! {
            (_, status) = async { tokio::join!(drain, child.wait()) } => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match finished {
            Some(status) => status?,
            None => {
                warn!("Stage cancelled, killing {:?}", command.program);
                child.kill().await?;
                return Ok(CANCELLED_EXIT_CODE);
            }
        };

        let code = status.code().unwrap_or(CANCELLED_EXIT_CODE);
        info!("Process result {}", code);
        Ok(code)
    }
}

async fn drain_lines<R>(stream: Option<R>)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };

    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!("Process output: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!("Process output unreadable: {}", e);
                break;
            }
        }
    }
}
