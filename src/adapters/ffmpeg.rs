//! ffmpeg invocations for the segment and concat stages.
//!
//! Only two things here matter to the rest of the crate: the `-progress`
//! sink pointing back at the callback listener, and exit code 0 meaning
//! success. The codec and container flags are plain stream copies into
//! MPEG-TS.

use crate::domain::timing::{self, TimingPair};
use crate::ports::runner::StageCommand;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// `http://<host>:<port>/?start=..&duration=..` for the given window.
///
/// The query string is the only thing tying a progress stream to the stage
/// that produced it.
pub fn callback_url(listener: SocketAddr, pair: &TimingPair) -> String {
    // A wildcard bind is still reached through loopback.
    let ip = match listener.ip() {
        ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        ip => ip,
    };
    format!(
        "http://{}/?start={}&duration={}",
        SocketAddr::new(ip, listener.port()),
        timing::format(pair.start()),
        timing::format(pair.duration())
    )
}

pub fn segment_command(
    ffmpeg: &Path,
    progress_url: &str,
    pair: &TimingPair,
    input: &Path,
    part: &Path,
) -> StageCommand {
    StageCommand::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-progress")
        .arg(progress_url)
        .arg("-loglevel")
        .arg("0")
        .arg("-y")
        .arg("-ss")
        .arg(timing::format(pair.start()))
        .arg("-t")
        .arg(timing::format(pair.duration()))
        .arg("-i")
        .arg(input)
        .arg("-f")
        .arg("mpegts")
        .arg("-c")
        .arg("copy")
        .arg("-avoid_negative_ts")
        .arg("1")
        .arg("-copyts")
        .arg(part)
}

pub fn concat_command(
    ffmpeg: &Path,
    progress_url: &str,
    manifest: &Path,
    output: &Path,
) -> StageCommand {
    StageCommand::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-progress")
        .arg(progress_url)
        .arg("-loglevel")
        .arg("0")
        .arg("-y")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(manifest)
        .arg("-c")
        .arg("copy")
        .arg(output)
}

/// Input list for ffmpeg's concat demuxer.
#[derive(Debug, Default, Clone)]
pub struct ConcatManifest {
    pub parts: Vec<PathBuf>,
}

impl ConcatManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: PathBuf) {
        self.parts.push(part);
    }

    /// One `file '<path>'` line per part, in order.
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|part| format!("file '{}'\n", quote_path(part)))
            .collect()
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path).await?;
        file.write_all(self.render().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// Inside single quotes the concat demuxer only needs `'` escaped.
fn quote_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}
