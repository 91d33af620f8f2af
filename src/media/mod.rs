pub mod chunk;
pub mod probe;
pub mod tools;

pub use chunk::{chunk_file_name, chunk_output_path, plan_chunks, ChunkPlan};
pub use probe::{parse_duration, DurationProbe, FfprobeProber};
pub use tools::{ToolLocator, FFMPEG, FFPROBE};

use std::time::Duration;

/// One contiguous slice of the source media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// 1-based position of the chunk in the plan.
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
}

impl ChunkRange {
    /// Get the duration of this chunk.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}
