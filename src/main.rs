use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vidsplit::config::{Config, Method};
use vidsplit::media::{FfprobeProber, ToolLocator};
use vidsplit::pipeline::{print_summary, run_split, Backends, SplitJob};
use vidsplit::{interactive, VidsplitError};

#[derive(Parser)]
#[command(name = "vidsplit")]
#[command(version, about = "Split videos into fixed-duration chunks")]
#[command(long_about = "Split a video into fixed-duration chunks, either with fast ffmpeg stream copy or with a frame-accurate re-encode through libav.")]
struct Cli {
    /// Input video file (prompted for when omitted)
    input: Option<PathBuf>,

    /// Splitting method: auto, ffmpeg, library
    #[arg(short, long)]
    method: Option<String>,

    /// Output directory for chunks [default: output_chunks]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Duration of each chunk in seconds [default: 60]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    duration: Option<u64>,

    /// Video codec for the library method [default: libx264]
    #[arg(long)]
    video_codec: Option<String>,

    /// Audio codec for the library method [default: aac]
    #[arg(long)]
    audio_codec: Option<String>,

    /// Report which backends are available and exit
    #[arg(long)]
    check: bool,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(ref method) = cli.method {
        config.method = method
            .parse::<Method>()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(ref dir) = cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(duration) = cli.duration {
        config.chunk_duration = duration;
    }
    if let Some(ref codec) = cli.video_codec {
        config.video_codec = codec.clone();
    }
    if let Some(ref codec) = cli.audio_codec {
        config.audio_codec = codec.clone();
    }
    Ok(())
}

/// First Ctrl+C asks the run to stop after the current chunk; a second one
/// exits immediately.
fn install_interrupt_handler(cancelled: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        if cancelled.swap(true, Ordering::SeqCst) {
            eprintln!("\nOperation cancelled by user.");
            std::process::exit(1);
        }
        eprintln!("\nCancelling after the current chunk (press Ctrl+C again to quit)...");
    });

    if let Err(e) = result {
        warn!("Could not install Ctrl+C handler: {e}");
    }
}

/// Take the input from the command line, or prompt for it when a user is
/// attached. `None` means the prompt was interrupted.
fn resolve_input<F>(
    input: Option<PathBuf>,
    attended: bool,
    cancelled: &AtomicBool,
    prompt: F,
) -> Result<Option<PathBuf>>
where
    F: FnOnce() -> Result<PathBuf>,
{
    match input {
        Some(path) => Ok(Some(path)),
        None if attended => match prompt() {
            Ok(path) => Ok(Some(path)),
            Err(_) if cancelled.load(Ordering::SeqCst) => Ok(None),
            Err(e) => Err(e.context("Failed to read the input path")),
        },
        None => anyhow::bail!("No input file given"),
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli)?;
    config.validate().context("Configuration validation failed")?;

    let backends = Backends::detect(&config);

    if cli.check {
        return Ok(interactive::print_backend_status(
            &config,
            backends.library.is_some(),
        ));
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(cancelled.clone());

    let input = match resolve_input(
        cli.input,
        console::user_attended(),
        &cancelled,
        interactive::prompt_input_path,
    )? {
        Some(path) => path,
        None => {
            error!("Operation cancelled by user.");
            return Ok(false);
        }
    };

    let mut job = SplitJob::new(input, &config);
    job.show_progress = !cli.quiet && console::user_attended();

    info!("Input:    {}", job.input.display());
    info!("Output:   {}", job.output_dir.display());
    info!("Method:   {}", job.method);
    info!("Duration: {}s per chunk", job.chunk_length.as_secs());

    let prober = FfprobeProber::new(ToolLocator::ffprobe(&config));
    let started = Instant::now();

    let outcome = match run_split(&job, &backends, &prober, cancelled).await {
        Ok(outcome) => outcome,
        Err(VidsplitError::Cancelled) => {
            error!("Operation cancelled by user.");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    print_summary(&outcome, &job.output_dir, started.elapsed());
    Ok(outcome.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
