use crate::config::{Config, Method};
use crate::error::{Result, VidsplitError};
use crate::media::{chunk_output_path, DurationProbe, FfprobeProber, ToolLocator};
use crate::split::{SplitRequest, SplitResult, Splitter, StreamCopySplitter};
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One split invocation, fully resolved from CLI and config.
#[derive(Debug, Clone)]
pub struct SplitJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_length: Duration,
    pub method: Method,
    pub show_progress: bool,
}

impl SplitJob {
    pub fn new(input: PathBuf, config: &Config) -> Self {
        Self {
            input,
            output_dir: config.output_dir.clone(),
            chunk_length: config.chunk_length(),
            method: config.method,
            show_progress: true,
        }
    }
}

/// The splitting backends usable in this environment.
#[derive(Default)]
pub struct Backends {
    /// ffmpeg stream copy, present when an ffmpeg executable was found.
    pub fast_path: Option<Box<dyn Splitter>>,
    /// In-process re-encode, present when the media library initialised.
    pub library: Option<Box<dyn Splitter>>,
}

impl Backends {
    pub fn detect(config: &Config) -> Self {
        let fast_path = ToolLocator::ffmpeg(config).locate().map(|ffmpeg| {
            let prober = FfprobeProber::new(ToolLocator::ffprobe(config));
            Box::new(StreamCopySplitter::new(ffmpeg, Arc::new(prober))) as Box<dyn Splitter>
        });

        Self {
            fast_path,
            library: library_backend(config),
        }
    }

    /// Pick the splitter for `requested`, honouring explicit choices.
    pub fn select(&self, requested: Method) -> Result<(Method, &dyn Splitter)> {
        let method = resolve_method(
            requested,
            self.fast_path.is_some(),
            self.library.is_some(),
        )?;

        let splitter = match method {
            Method::Ffmpeg => self.fast_path.as_deref(),
            Method::Library => self.library.as_deref(),
            Method::Auto => None,
        };

        splitter
            .map(|s| (method, s))
            .ok_or_else(|| VidsplitError::BackendUnavailable(format!("{method} backend missing")))
    }
}

#[cfg(feature = "libav")]
fn library_backend(config: &Config) -> Option<Box<dyn Splitter>> {
    use crate::editor::{EncodeSettings, LibavEditor};
    use crate::split::ReencodeSplitter;

    match LibavEditor::new() {
        Ok(editor) => Some(Box::new(ReencodeSplitter::new(
            editor,
            EncodeSettings::ladder(&config.video_codec, &config.audio_codec),
        ))),
        Err(e) => {
            debug!("libav could not be initialised: {e}");
            None
        }
    }
}

#[cfg(not(feature = "libav"))]
fn library_backend(_config: &Config) -> Option<Box<dyn Splitter>> {
    debug!("Built without the libav feature; library backend unavailable");
    None
}

/// Resolve `auto` and check that the chosen backend is usable.
pub fn resolve_method(
    requested: Method,
    fast_path_available: bool,
    library_available: bool,
) -> Result<Method> {
    match requested {
        Method::Ffmpeg if fast_path_available => Ok(Method::Ffmpeg),
        Method::Ffmpeg => Err(VidsplitError::BackendUnavailable(
            "FFmpeg not found. Install FFmpeg, set VIDSPLIT_FFMPEG, or use --method library"
                .to_string(),
        )),
        Method::Library if library_available => Ok(Method::Library),
        Method::Library => Err(VidsplitError::BackendUnavailable(
            "Media library not available. Rebuild with --features libav or use --method ffmpeg"
                .to_string(),
        )),
        Method::Auto if fast_path_available => {
            info!("Auto-selected FFmpeg method (faster)");
            Ok(Method::Ffmpeg)
        }
        Method::Auto if library_available => {
            info!("Auto-selected library method");
            Ok(Method::Library)
        }
        Method::Auto => Err(VidsplitError::BackendUnavailable(
            "Neither FFmpeg nor the media library is available. Install FFmpeg (or set VIDSPLIT_FFMPEG) or rebuild with --features libav"
                .to_string(),
        )),
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The source already fit in one chunk and was copied verbatim.
    Copied { output: PathBuf, duration: Duration },
    /// The source was cut by a splitting strategy.
    Split { method: Method, result: SplitResult },
}

impl SplitOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            SplitOutcome::Copied { .. } => true,
            SplitOutcome::Split { result, .. } => result.is_complete(),
        }
    }
}

/// Check the source path before any work starts.
pub fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(VidsplitError::InputNotFound(input.to_path_buf()));
    }
    if !input.is_file() {
        return Err(VidsplitError::InvalidInput(format!(
            "{} is not a regular file",
            input.display()
        )));
    }
    Ok(())
}

/// Copy the whole source to `chunk_1<ext>` in the output directory,
/// keeping its access and modification times.
pub fn copy_whole(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let output = chunk_output_path(output_dir, input, 1);
    std::fs::copy(input, &output)?;

    let metadata = std::fs::metadata(input)?;
    let mut times = FileTimes::new().set_modified(metadata.modified()?);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    File::options().write(true).open(&output)?.set_times(times)?;

    Ok(output)
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(VidsplitError::Cancelled);
    }
    Ok(())
}

/// Split `job.input` into chunks.
///
/// Sources that already fit in one chunk are copied verbatim when their
/// duration can be probed. Otherwise the backend is resolved and every
/// planned chunk is attempted; a chunk failure never aborts the run.
pub async fn run_split(
    job: &SplitJob,
    backends: &Backends,
    prober: &dyn DurationProbe,
    cancelled: Arc<AtomicBool>,
) -> Result<SplitOutcome> {
    validate_input(&job.input)?;

    if job.chunk_length.is_zero() {
        return Err(VidsplitError::InvalidInput(
            "chunk duration must be greater than zero".to_string(),
        ));
    }

    check_cancelled(&cancelled)?;

    let mut known_duration = None;
    if job.method != Method::Library {
        known_duration = prober.probe(&job.input).await;

        if let Some(duration) = known_duration {
            if duration <= job.chunk_length {
                info!(
                    "Video duration ({:.2}s) is shorter than or equal to chunk duration ({}s); copying original file",
                    duration.as_secs_f64(),
                    job.chunk_length.as_secs_f64()
                );
                let output = copy_whole(&job.input, &job.output_dir)?;
                check_cancelled(&cancelled)?;
                info!("Created: {}", output.display());
                return Ok(SplitOutcome::Copied { output, duration });
            }
        }
    }

    let (method, splitter) = backends.select(job.method)?;
    info!("Using {} ({})", method, splitter.name());

    let request = SplitRequest {
        input: job.input.clone(),
        output_dir: job.output_dir.clone(),
        chunk_length: job.chunk_length,
        known_duration,
        cancelled: Arc::clone(&cancelled),
        show_progress: job.show_progress,
    };

    let result = splitter.split(&request).await?;
    // An interrupt during the last chunk still fails the run.
    check_cancelled(&cancelled)?;
    info!(
        "Completed! Created {}/{} chunks in '{}'",
        result.succeeded,
        result.attempted,
        job.output_dir.display()
    );

    Ok(SplitOutcome::Split { method, result })
}

/// Print a summary of the run.
pub fn print_summary(outcome: &SplitOutcome, output_dir: &Path, elapsed: Duration) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                         Split Complete                        ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output dir: {}", output_dir.display());
    match outcome {
        SplitOutcome::Copied { output, duration } => {
            println!("  Method:     copy (source is {:.1}s)", duration.as_secs_f64());
            println!("  Created:    {}", output.display());
        }
        SplitOutcome::Split { method, result } => {
            println!("  Method:     {}", method);
            println!("  Chunks:     {}/{}", result.succeeded, result.attempted);
            if !result.failed_chunks.is_empty() {
                let failed: Vec<String> =
                    result.failed_chunks.iter().map(|i| i.to_string()).collect();
                println!("  Failed:     {}", failed.join(", "));
            }
        }
    }
    println!("  Time:       {:.2}s", elapsed.as_secs_f64());
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
