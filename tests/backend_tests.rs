//! Backend tests with stand-in ffmpeg / ffprobe executables.
//!
//! The stubs are small shell scripts written into a temp dir and handed to
//! the tool locator as explicit candidates, so no real ffmpeg is needed.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tempfile::TempDir;
use vidsplit::config::{Config, Method};
use vidsplit::media::{DurationProbe, FfprobeProber, ToolLocator, FFMPEG, FFPROBE};
use vidsplit::pipeline::{run_split, Backends, SplitJob, SplitOutcome};
use vidsplit::split::{SplitRequest, Splitter, StreamCopySplitter};
use vidsplit::VidsplitError;

/// Writes its argument list into the output file (the last argument).
const FFMPEG_OK: &str = r#"#!/bin/sh
for last; do :; done
printf '%s\n' "$*" > "$last"
"#;

/// Same as `FFMPEG_OK`, but refuses to produce chunk 2.
const FFMPEG_FAILS_CHUNK_2: &str = r#"#!/bin/sh
for last; do :; done
case "$last" in
  *chunk_2.*) echo "Invalid data found when processing input" >&2; exit 1 ;;
esac
printf '%s\n' "$*" > "$last"
"#;

/// Spawning freshly written scripts from parallel threads can hit ETXTBSY;
/// every test here runs its processes under this lock.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn ffprobe_reporting(dir: &Path, output: &str) -> PathBuf {
    write_script(
        dir,
        "ffprobe",
        &format!("#!/bin/sh\necho '{output}'\n"),
    )
}

fn prober(ffprobe: PathBuf) -> FfprobeProber {
    FfprobeProber::new(ToolLocator::new(FFPROBE, vec![ffprobe]).without_path_search())
}

fn source_file(dir: &Path) -> PathBuf {
    let path = dir.join("talk.mp4");
    std::fs::write(&path, b"stand-in video").unwrap();
    path
}

fn stream_copy_backends(ffmpeg: PathBuf, ffprobe: PathBuf) -> Backends {
    Backends {
        fast_path: Some(Box::new(StreamCopySplitter::new(
            ffmpeg,
            Arc::new(prober(ffprobe)),
        ))),
        library: None,
    }
}

fn job(input: PathBuf, output_dir: PathBuf) -> SplitJob {
    SplitJob {
        input,
        output_dir,
        chunk_length: Duration::from_secs(60),
        method: Method::Auto,
        show_progress: false,
    }
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Duration probe
// ============================================================================

#[tokio::test]
async fn test_ffprobe_duration() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffprobe = ffprobe_reporting(dir.path(), "150.000000");

    let duration = prober(ffprobe).probe(&source_file(dir.path())).await;

    assert_eq!(duration, Some(Duration::from_secs(150)));
}

#[tokio::test]
async fn test_ffprobe_unusable_output() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffprobe = ffprobe_reporting(dir.path(), "N/A");

    assert_eq!(prober(ffprobe).probe(&source_file(dir.path())).await, None);
}

#[tokio::test]
async fn test_ffprobe_failure() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffprobe = write_script(
        dir.path(),
        "ffprobe",
        "#!/bin/sh\necho 'moov atom not found' >&2\nexit 1\n",
    );

    assert_eq!(prober(ffprobe).probe(&source_file(dir.path())).await, None);
}

// ============================================================================
// Stream copy
// ============================================================================

#[tokio::test]
async fn test_stream_copy_creates_every_chunk() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", FFMPEG_OK);
    let ffprobe = ffprobe_reporting(dir.path(), "150.0");
    let input = source_file(dir.path());
    let out = dir.path().join("out");

    let outcome = run_split(
        &job(input, out.clone()),
        &stream_copy_backends(ffmpeg, ffprobe),
        &prober(dir.path().join("ffprobe")),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap();

    match &outcome {
        SplitOutcome::Split { method, result } => {
            assert_eq!(*method, Method::Ffmpeg);
            assert_eq!(result.attempted, 3);
            assert_eq!(result.succeeded, 3);
        }
        other => panic!("expected a split, got {other:?}"),
    }
    assert!(outcome.is_success());
    assert_eq!(listing(&out), vec!["chunk_1.mp4", "chunk_2.mp4", "chunk_3.mp4"]);

    let last = std::fs::read_to_string(out.join("chunk_3.mp4")).unwrap();
    assert!(last.contains("-ss 120.000000 -t 30.000000 -c copy"));
    assert!(last.starts_with("-y -i "));
}

#[tokio::test]
async fn test_stream_copy_isolates_chunk_failure() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", FFMPEG_FAILS_CHUNK_2);
    let ffprobe = ffprobe_reporting(dir.path(), "150.0");
    let input = source_file(dir.path());
    let out = dir.path().join("out");

    let outcome = run_split(
        &job(input, out.clone()),
        &stream_copy_backends(ffmpeg, ffprobe),
        &prober(dir.path().join("ffprobe")),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap();

    match &outcome {
        SplitOutcome::Split { result, .. } => {
            assert_eq!(result.attempted, 3);
            assert_eq!(result.succeeded, 2);
            assert_eq!(result.failed_chunks, vec![2]);
        }
        other => panic!("expected a split, got {other:?}"),
    }
    assert!(!outcome.is_success());
    assert_eq!(listing(&out), vec!["chunk_1.mp4", "chunk_3.mp4"]);
}

#[tokio::test]
async fn test_stream_copy_rerun_is_idempotent() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", FFMPEG_OK);
    let ffprobe = ffprobe_reporting(dir.path(), "125.5");
    let input = source_file(dir.path());
    let out = dir.path().join("out");
    let backends = stream_copy_backends(ffmpeg, ffprobe.clone());

    for _ in 0..2 {
        let outcome = run_split(
            &job(input.clone(), out.clone()),
            &backends,
            &prober(ffprobe.clone()),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert!(outcome.is_success());
    }

    assert_eq!(listing(&out), vec!["chunk_1.mp4", "chunk_2.mp4", "chunk_3.mp4"]);
}

#[tokio::test]
async fn test_short_source_never_runs_ffmpeg() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ffmpeg-ran");
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        &format!("#!/bin/sh\ntouch '{}'\n", marker.display()),
    );
    let ffprobe = ffprobe_reporting(dir.path(), "45.0");
    let input = source_file(dir.path());
    let out = dir.path().join("out");

    let outcome = run_split(
        &job(input.clone(), out.clone()),
        &stream_copy_backends(ffmpeg, ffprobe.clone()),
        &prober(ffprobe),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, SplitOutcome::Copied { .. }));
    assert_eq!(listing(&out), vec!["chunk_1.mp4"]);
    assert_eq!(
        std::fs::read(out.join("chunk_1.mp4")).unwrap(),
        std::fs::read(&input).unwrap()
    );
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_stream_copy_needs_a_duration() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", FFMPEG_OK);
    let splitter = StreamCopySplitter::new(ffmpeg, Arc::new(prober(dir.path().join("missing"))));
    let request = SplitRequest {
        input: source_file(dir.path()),
        output_dir: dir.path().join("out"),
        chunk_length: Duration::from_secs(60),
        known_duration: None,
        cancelled: Arc::new(AtomicBool::new(false)),
        show_progress: false,
    };

    let result = splitter.split(&request).await;

    assert!(matches!(result, Err(VidsplitError::Probe(_))));
    assert!(!request.output_dir.exists());
}

// ============================================================================
// Backend detection
// ============================================================================

#[test]
fn test_detect_uses_configured_ffmpeg() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", FFMPEG_OK);
    let config = Config {
        ffmpeg_candidates: vec![dir.path().join("nope"), ffmpeg.clone()],
        ..Default::default()
    };

    assert_eq!(ToolLocator::ffmpeg(&config).locate(), Some(ffmpeg));
    assert!(Backends::detect(&config).fast_path.is_some());
}

#[test]
fn test_candidates_are_tried_in_order() {
    let dir = TempDir::new().unwrap();
    let first = write_script(dir.path(), "ffmpeg-env", FFMPEG_OK);
    let second = write_script(dir.path(), "ffmpeg-config", FFMPEG_OK);

    let locator = ToolLocator::new(FFMPEG, vec![first.clone(), second]).without_path_search();

    assert_eq!(locator.locate(), Some(first));
}
