use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VidsplitError};

use super::ChunkRange;

/// Fixed-length chunk layout for a source of known duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub duration: Duration,
    pub chunk_length: Duration,
    pub chunk_count: usize,
}

impl ChunkPlan {
    /// Get the range of the 1-based chunk `index`, or `None` when out of plan.
    pub fn range(&self, index: usize) -> Option<ChunkRange> {
        if index == 0 || index > self.chunk_count {
            return None;
        }

        let start = self.offset(index - 1);
        let end = self.offset(index).min(self.duration);
        Some(ChunkRange { index, start, end })
    }

    /// Iterate over every planned range in order.
    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (1..=self.chunk_count).filter_map(move |i| self.range(i))
    }

    fn offset(&self, chunks: usize) -> Duration {
        let nanos = self.chunk_length.as_nanos() * chunks as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Plan fixed-duration chunks covering `[0, duration)`.
///
/// The chunk count is `ceil(duration / chunk_length)`, computed on whole
/// nanoseconds so exact multiples never produce an empty trailing chunk.
pub fn plan_chunks(duration: Duration, chunk_length: Duration) -> Result<ChunkPlan> {
    if duration.is_zero() {
        return Err(VidsplitError::InvalidPlan(
            "media duration must be greater than zero".to_string(),
        ));
    }
    if chunk_length.is_zero() {
        return Err(VidsplitError::InvalidPlan(
            "chunk length must be greater than zero".to_string(),
        ));
    }

    let total = duration.as_nanos();
    let step = chunk_length.as_nanos();
    let chunk_count = usize::try_from(total.div_ceil(step))
        .map_err(|_| VidsplitError::InvalidPlan("too many chunks".to_string()))?;

    Ok(ChunkPlan {
        duration,
        chunk_length,
        chunk_count,
    })
}

/// File name of a chunk: `chunk_<index><ext>`, keeping the source extension.
pub fn chunk_file_name(source: &Path, index: usize) -> String {
    match source.extension() {
        Some(ext) => format!("chunk_{}.{}", index, ext.to_string_lossy()),
        None => format!("chunk_{}", index),
    }
}

pub fn chunk_output_path(output_dir: &Path, source: &Path, index: usize) -> PathBuf {
    output_dir.join(chunk_file_name(source, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_plan_150_by_60() {
        let plan = plan_chunks(secs(150), secs(60)).unwrap();
        assert_eq!(plan.chunk_count, 3);

        let ranges: Vec<_> = plan.ranges().collect();
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (secs(0), secs(60)));
        assert_eq!((ranges[1].start, ranges[1].end), (secs(60), secs(120)));
        assert_eq!((ranges[2].start, ranges[2].end), (secs(120), secs(150)));
        assert_eq!(ranges[2].duration(), secs(30));
        assert_eq!(ranges[0].index, 1);
        assert_eq!(ranges[2].index, 3);
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = plan_chunks(secs(120), secs(60)).unwrap();
        assert_eq!(plan.chunk_count, 2);
        assert_eq!(plan.ranges().last().unwrap().end, secs(120));
    }

    #[test]
    fn test_plan_shorter_than_one_chunk() {
        let plan = plan_chunks(Duration::from_secs_f64(45.5), secs(60)).unwrap();
        assert_eq!(plan.chunk_count, 1);
        let only = plan.range(1).unwrap();
        assert_eq!(only.start, Duration::ZERO);
        assert_eq!(only.end, Duration::from_secs_f64(45.5));
    }

    #[test]
    fn test_plan_fractional_duration() {
        let plan = plan_chunks(Duration::from_millis(60_001), secs(60)).unwrap();
        assert_eq!(plan.chunk_count, 2);
        assert_eq!(plan.range(2).unwrap().duration(), Duration::from_millis(1));
    }

    #[test]
    fn test_plan_rejects_zero() {
        assert!(plan_chunks(Duration::ZERO, secs(60)).is_err());
        assert!(plan_chunks(secs(10), Duration::ZERO).is_err());
    }

    #[test]
    fn test_ranges_are_contiguous() {
        for (total_ms, len_ms) in [(1u64, 1u64), (999, 1000), (10_000, 3_000), (3_599_999, 60_000)] {
            let plan =
                plan_chunks(Duration::from_millis(total_ms), Duration::from_millis(len_ms)).unwrap();
            let ranges: Vec<_> = plan.ranges().collect();

            assert_eq!(ranges.len() as u64, total_ms.div_ceil(len_ms));
            assert_eq!(ranges[0].start, Duration::ZERO);
            assert_eq!(ranges.last().unwrap().end, Duration::from_millis(total_ms));
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
                assert!(pair[0].duration() <= plan.chunk_length);
            }
        }
    }

    #[test]
    fn test_range_out_of_plan() {
        let plan = plan_chunks(secs(90), secs(60)).unwrap();
        assert!(plan.range(0).is_none());
        assert!(plan.range(3).is_none());
    }

    #[test]
    fn test_chunk_file_name() {
        assert_eq!(chunk_file_name(Path::new("/videos/talk.mp4"), 1), "chunk_1.mp4");
        assert_eq!(chunk_file_name(Path::new("clip.tar.mkv"), 12), "chunk_12.mkv");
        assert_eq!(chunk_file_name(Path::new("raw_stream"), 2), "chunk_2");
    }

    #[test]
    fn test_chunk_output_path() {
        let path = chunk_output_path(Path::new("out"), Path::new("/in/a.mov"), 3);
        assert_eq!(path, PathBuf::from("out/chunk_3.mov"));
    }
}
