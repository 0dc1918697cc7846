//! Configuration from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default port for progress callbacks.
pub const DEFAULT_PORT: u16 = 25245;
/// How long a progress stream may stay silent before it is let go.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Clone, Debug)]
pub struct SplitterConfig {
    /// Progress listener bind address
    pub addr: String,
    /// Progress listener port, 0 for any free port
    pub port: u16,
    /// Directory for part files and the concat list
    pub temp_dir: PathBuf,
    /// Path to the ffmpeg executable
    pub ffmpeg: PathBuf,
    /// Idle read timeout on progress streams
    pub idle_timeout: Duration,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            addr: String::from("127.0.0.1"),
            port: DEFAULT_PORT,
            temp_dir: env::temp_dir(),
            ffmpeg: PathBuf::from("ffmpeg"),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl SplitterConfig {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            addr: lookup("SPLITTER_ADDR").unwrap_or(defaults.addr),
            port: parse_or("SPLITTER_PORT", lookup("SPLITTER_PORT"), defaults.port),
            temp_dir: lookup("SPLITTER_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            ffmpeg: lookup("SPLITTER_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg),
            idle_timeout: Duration::from_millis(parse_or(
                "SPLITTER_IDLE_TIMEOUT_MS",
                lookup("SPLITTER_IDLE_TIMEOUT_MS"),
                defaults.idle_timeout.as_millis() as u64,
            )),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring {}={:?}, using {}", key, raw, default);
            default
        }),
    }
}
