use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::tools::ToolLocator;

/// Something that can tell how long a media file is.
///
/// A missing duration is a normal outcome, not an error: callers decide
/// whether they can proceed without it.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, input: &Path) -> Option<Duration>;
}

/// Duration probe backed by the ffprobe executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    locator: ToolLocator,
}

impl FfprobeProber {
    pub fn new(locator: ToolLocator) -> Self {
        Self { locator }
    }

    async fn run(&self, ffprobe: &Path, input: &Path) -> Option<Duration> {
        let output = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run ffprobe: {e}");
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("ffprobe failed ({}): {}", output.status, stderr.trim());
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration = parse_duration(&stdout);
        if duration.is_none() {
            warn!("Could not parse ffprobe duration '{}'", stdout.trim());
        }
        duration
    }
}

#[async_trait]
impl DurationProbe for FfprobeProber {
    async fn probe(&self, input: &Path) -> Option<Duration> {
        let Some(ffprobe) = self.locator.locate() else {
            warn!("ffprobe not found; media duration is unknown");
            return None;
        };

        let duration = self.run(&ffprobe, input).await;
        if let Some(d) = duration {
            debug!("Probed duration of {}: {:.3}s", input.display(), d.as_secs_f64());
        }
        duration
    }
}

/// Parse ffprobe's plain-text duration. Only finite positive values count.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let secs: f64 = text.trim().parse().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
