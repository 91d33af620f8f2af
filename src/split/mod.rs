pub mod reencode;
pub mod stream_copy;

pub use reencode::ReencodeSplitter;
pub use stream_copy::StreamCopySplitter;

use crate::error::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything a splitting strategy needs to cut one source file.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_length: Duration,
    /// Duration already probed by the caller, if any.
    pub known_duration: Option<Duration>,
    pub cancelled: Arc<AtomicBool>,
    pub show_progress: bool,
}

impl SplitRequest {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Per-chunk outcome counts of one split run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    pub attempted: usize,
    pub succeeded: usize,
    /// 1-based indices of chunks that could not be produced.
    pub failed_chunks: Vec<usize>,
    pub outputs: Vec<PathBuf>,
}

impl SplitResult {
    pub fn record_success(&mut self, output: PathBuf) {
        self.attempted += 1;
        self.succeeded += 1;
        self.outputs.push(output);
    }

    pub fn record_failure(&mut self, index: usize) {
        self.attempted += 1;
        self.failed_chunks.push(index);
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// True when every attempted chunk was written.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.attempted
    }
}

/// A strategy that cuts a source into chunk files.
#[async_trait]
pub trait Splitter: Send + Sync {
    async fn split(&self, request: &SplitRequest) -> Result<SplitResult>;
    fn name(&self) -> &'static str;
}

pub(crate) fn chunk_progress(total: usize, show: bool) -> Option<ProgressBar> {
    if !show {
        return None;
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    Some(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_result_counts() {
        let mut result = SplitResult::default();
        assert!(result.is_complete());

        result.record_success(PathBuf::from("out/chunk_1.mp4"));
        result.record_failure(2);
        result.record_success(PathBuf::from("out/chunk_3.mp4"));

        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.failed_chunks, vec![2]);
        assert_eq!(result.outputs.len(), 2);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_request_cancel_flag() {
        let request = SplitRequest {
            input: PathBuf::from("in.mp4"),
            output_dir: PathBuf::from("out"),
            chunk_length: Duration::from_secs(60),
            known_duration: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        };
        assert!(!request.is_cancelled());
        request.cancelled.store(true, Ordering::Relaxed);
        assert!(request.is_cancelled());
    }
}
