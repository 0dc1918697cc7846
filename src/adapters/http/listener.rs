use super::{router, ListenerState};
use crate::domain::progress::ProgressModel;
use crate::error::{Result, SplitError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop` lets in-flight progress streams wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// The progress callback server for one run.
///
/// Dropping it without calling [`stop`](Self::stop) still tears the server
/// down, just without waiting for it.
#[derive(Debug)]
pub struct CallbackListener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `addr` and start serving. Port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn start(
        addr: &str,
        progress: Arc<ProgressModel>,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SplitError::listener_io(addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SplitError::listener_io(addr, e))?;

        let app = router(ListenerState {
            progress,
            idle_timeout,
        });

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = served {
                error!("Progress listener stopped: {}", e);
            }
        });

        info!("Progress listener on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop accepting callbacks and wait, briefly, for open streams to end.
    pub async fn stop(mut self) {
        debug!("Stop request");
        self.shutdown.cancel();

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Progress listener slow to stop, aborting");
                task.abort();
                let _ = task.await;
            }
        }
        debug!("Stop request completed");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
