//! In-process media editing seam used by the re-encode strategy.
//!
//! The contract mirrors a typical editing library: open a source by path,
//! read its duration, cut a sub-range out of it and write that sub-range to a
//! file with selectable codecs. Handles release their resources when dropped.

#[cfg(feature = "libav")]
pub mod libav;

#[cfg(feature = "libav")]
pub use libav::LibavEditor;

use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Codec selection for one write attempt. `None` leaves the choice to the
/// output container's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodeSettings {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

impl EncodeSettings {
    pub fn new(video_codec: Option<&str>, audio_codec: Option<&str>) -> Self {
        Self {
            video_codec: video_codec.map(str::to_string),
            audio_codec: audio_codec.map(str::to_string),
        }
    }

    /// Ordered fallback ladder: both target codecs, then the video codec
    /// alone, then container defaults.
    pub fn ladder(video_codec: &str, audio_codec: &str) -> Vec<EncodeSettings> {
        vec![
            Self::new(Some(video_codec), Some(audio_codec)),
            Self::new(Some(video_codec), None),
            Self::default(),
        ]
    }
}

impl std::fmt::Display for EncodeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.video_codec, &self.audio_codec) {
            (None, None) => write!(f, "container defaults"),
            (video, audio) => write!(
                f,
                "video={} audio={}",
                video.as_deref().unwrap_or("default"),
                audio.as_deref().unwrap_or("default")
            ),
        }
    }
}

/// Entry point of an editing library.
pub trait MediaEditor: Send + Sync + 'static {
    type Source: MediaSource;

    fn name(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Self::Source>;
}

/// An opened source file.
pub trait MediaSource {
    type Clip: MediaClip;

    fn duration(&self) -> Duration;

    /// Cut `[start, end)` out of the source.
    fn subclip(&self, start: Duration, end: Duration) -> Result<Self::Clip>;
}

/// A sub-range of a source that can be rendered to a file.
pub trait MediaClip {
    /// Encode the clip into `output`, replacing any existing file.
    fn write(&mut self, output: &Path, settings: &EncodeSettings) -> Result<()>;
}
