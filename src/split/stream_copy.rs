use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, VidsplitError};
use crate::media::{chunk_output_path, plan_chunks, ChunkRange, DurationProbe};

use super::{chunk_progress, SplitRequest, SplitResult, Splitter};

/// Lines of ffmpeg stderr kept when reporting a failed chunk.
const STDERR_TAIL_LINES: usize = 5;

/// Fast path: one `ffmpeg -c copy` invocation per chunk, no re-encoding.
///
/// Cuts land on whatever packet boundary ffmpeg finds, so chunks may start
/// on a non-keyframe and show a brief artifact at the cut.
pub struct StreamCopySplitter {
    ffmpeg: PathBuf,
    prober: Arc<dyn DurationProbe>,
}

impl StreamCopySplitter {
    pub fn new(ffmpeg: PathBuf, prober: Arc<dyn DurationProbe>) -> Self {
        Self { ffmpeg, prober }
    }

    async fn copy_chunk(&self, input: &Path, range: &ChunkRange, output: &Path) -> Result<()> {
        let args = stream_copy_args(input, range, output);
        debug!("Running {} {:?}", self.ffmpeg.display(), args);

        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VidsplitError::Tool {
                tool: "ffmpeg".to_string(),
                message: format!("failed to run {}: {e}", self.ffmpeg.display()),
            })?;

        if !result.status.success() {
            return Err(VidsplitError::Tool {
                tool: "ffmpeg".to_string(),
                message: format!(
                    "{} ({})",
                    result.status,
                    stderr_tail(&String::from_utf8_lossy(&result.stderr))
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Splitter for StreamCopySplitter {
    async fn split(&self, request: &SplitRequest) -> Result<SplitResult> {
        let duration = match request.known_duration {
            Some(d) => d,
            None => self.prober.probe(&request.input).await.ok_or_else(|| {
                VidsplitError::Probe(format!(
                    "could not determine the duration of {}; is ffprobe installed?",
                    request.input.display()
                ))
            })?,
        };

        let plan = plan_chunks(duration, request.chunk_length)?;
        info!(
            "Video duration: {:.2}s, creating {} chunks of {}s",
            duration.as_secs_f64(),
            plan.chunk_count,
            request.chunk_length.as_secs_f64()
        );

        std::fs::create_dir_all(&request.output_dir)?;

        let progress = chunk_progress(plan.chunk_count, request.show_progress);
        let mut result = SplitResult::default();

        for range in plan.ranges() {
            if request.is_cancelled() {
                if let Some(pb) = progress {
                    pb.abandon_with_message("cancelled");
                }
                return Err(VidsplitError::Cancelled);
            }

            let output = chunk_output_path(&request.output_dir, &request.input, range.index);
            match self.copy_chunk(&request.input, &range, &output).await {
                Ok(()) => {
                    info!(
                        "Created chunk {}/{}: {}",
                        range.index,
                        plan.chunk_count,
                        output.display()
                    );
                    result.record_success(output);
                }
                Err(e) => {
                    warn!("Error creating chunk {}: {}", range.index, e);
                    result.record_failure(range.index);
                }
            }

            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }

        Ok(result)
    }

    fn name(&self) -> &'static str {
        "ffmpeg stream copy"
    }
}

/// Arguments for cutting one range with stream copy. Existing outputs are
/// overwritten.
pub fn stream_copy_args(input: &Path, range: &ChunkRange, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    args.extend(
        [
            "-ss".to_string(),
            format!("{:.6}", range.start.as_secs_f64()),
            "-t".to_string(),
            format!("{:.6}", range.duration().as_secs_f64()),
            "-c".to_string(),
            "copy".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
        ]
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
