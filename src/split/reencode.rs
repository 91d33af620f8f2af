use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::editor::{EncodeSettings, MediaClip, MediaEditor, MediaSource};
use crate::error::{Result, VidsplitError};
use crate::media::{chunk_output_path, plan_chunks, ChunkRange};

use super::{chunk_progress, SplitRequest, SplitResult, Splitter};

/// Frame-accurate path: every chunk is re-encoded through a [`MediaEditor`].
///
/// Each chunk walks the settings ladder in order until one write succeeds.
pub struct ReencodeSplitter<E: MediaEditor> {
    editor: Arc<E>,
    ladder: Arc<Vec<EncodeSettings>>,
}

impl<E: MediaEditor> ReencodeSplitter<E> {
    pub fn new(editor: E, ladder: Vec<EncodeSettings>) -> Self {
        Self {
            editor: Arc::new(editor),
            ladder: Arc::new(ladder),
        }
    }

    pub fn ladder(&self) -> &[EncodeSettings] {
        &self.ladder
    }
}

#[async_trait]
impl<E: MediaEditor> Splitter for ReencodeSplitter<E> {
    async fn split(&self, request: &SplitRequest) -> Result<SplitResult> {
        let editor = Arc::clone(&self.editor);
        let ladder = Arc::clone(&self.ladder);
        let request = request.clone();

        tokio::task::spawn_blocking(move || split_blocking(editor.as_ref(), &request, &ladder))
            .await
            .map_err(|e| VidsplitError::Encode(format!("re-encode worker failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "re-encode"
    }
}

/// Synchronous body of the re-encode strategy.
pub fn split_blocking<E: MediaEditor>(
    editor: &E,
    request: &SplitRequest,
    ladder: &[EncodeSettings],
) -> Result<SplitResult> {
    info!("Using {} to re-encode {}", editor.name(), request.input.display());

    let source = editor.open(&request.input).map_err(|e| {
        VidsplitError::Encode(format!(
            "could not load {} (corrupt file, unsupported format or missing metadata): {e}",
            request.input.display()
        ))
    })?;

    let duration = source.duration();
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
        debug!(
            "Processing chunk {}: {:.2}s to {:.2}s",
            range.index,
            range.start.as_secs_f64(),
            range.end.as_secs_f64()
        );

        match write_with_fallback(&source, &range, &output, ladder) {
            Ok(rung) => {
                let note = if rung == 0 { "" } else { " (fallback settings)" };
                info!(
                    "Created chunk {}/{}: {}{}",
                    range.index,
                    plan.chunk_count,
                    output.display(),
                    note
                );
                result.record_success(output);
            }
            Err(e) => {
                warn!("All encode attempts failed for chunk {}: {}", range.index, e);
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

    // Release the source only after every chunk has been cut from it.
    drop(source);

    Ok(result)
}

/// Try each rung of the ladder in turn; returns the index of the rung that
/// produced the file. Every attempt cuts a fresh clip, released afterwards.
pub fn write_with_fallback<S: MediaSource>(
    source: &S,
    range: &ChunkRange,
    output: &Path,
    ladder: &[EncodeSettings],
) -> Result<usize> {
    let mut last_error = None;

    for (rung, settings) in ladder.iter().enumerate() {
        let attempt = source
            .subclip(range.start, range.end)
            .and_then(|mut clip| clip.write(output, settings));

        match attempt {
            Ok(()) => return Ok(rung),
            Err(e) => {
                warn!(
                    "Chunk {} failed with {} ({}){}",
                    range.index,
                    settings,
                    e,
                    if rung + 1 < ladder.len() { ", retrying" } else { "" }
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| VidsplitError::Encode("no encode settings configured".to_string())))
}
