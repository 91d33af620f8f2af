use crate::error::{Result, VidsplitError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OUTPUT_DIR: &str = "output_chunks";
pub const DEFAULT_CHUNK_DURATION: u64 = 60;
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

/// Which splitting backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Prefer ffmpeg stream copy, fall back to the library backend.
    #[default]
    Auto,
    /// Stream copy through the ffmpeg executable.
    Ffmpeg,
    /// Re-encode through the in-process media library.
    Library,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Auto => write!(f, "auto"),
            Method::Ffmpeg => write!(f, "ffmpeg"),
            Method::Library => write!(f, "library"),
        }
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Method::Auto),
            "ffmpeg" => Ok(Method::Ffmpeg),
            "library" => Ok(Method::Library),
            _ => Err(format!(
                "Unknown method: {}. Use 'auto', 'ffmpeg', or 'library'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub method: Method,
    pub output_dir: PathBuf,
    /// Chunk length in whole seconds.
    pub chunk_duration: u64,
    /// Explicit ffmpeg locations, tried in order before `PATH`.
    pub ffmpeg_candidates: Vec<PathBuf>,
    /// Explicit ffprobe locations, tried in order before `PATH`.
    pub ffprobe_candidates: Vec<PathBuf>,
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            method: Method::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            chunk_duration: DEFAULT_CHUNK_DURATION,
            ffmpeg_candidates: platform_candidates("ffmpeg"),
            ffprobe_candidates: platform_candidates("ffprobe"),
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
        }
    }
}

#[cfg(windows)]
fn platform_candidates(tool: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("C:\\ffmpeg\\{tool}.exe")),
        PathBuf::from(format!("C:\\ffmpeg\\bin\\{tool}.exe")),
    ]
}

#[cfg(not(windows))]
fn platform_candidates(_tool: &str) -> Vec<PathBuf> {
    Vec::new()
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(Self::config_file_path().as_deref())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read the config file at `path`, or defaults when there is none.
    /// A file that exists but does not parse is an error.
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Self::default());
        };

        debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|e| VidsplitError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a config file body. Missing keys keep their defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Override settings from `VIDSPLIT_*` variables as returned by `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(method) = var("VIDSPLIT_METHOD") {
            self.method = method
                .parse()
                .map_err(|e| VidsplitError::Config(format!("VIDSPLIT_METHOD: {e}")))?;
        }
        if let Some(dir) = var("VIDSPLIT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(duration) = var("VIDSPLIT_CHUNK_DURATION") {
            self.chunk_duration = duration.trim().parse().map_err(|_| {
                VidsplitError::Config(format!(
                    "VIDSPLIT_CHUNK_DURATION: '{duration}' is not a whole number of seconds"
                ))
            })?;
        }
        if let Some(path) = var("VIDSPLIT_FFMPEG") {
            self.ffmpeg_candidates.insert(0, PathBuf::from(path));
        }
        if let Some(path) = var("VIDSPLIT_FFPROBE") {
            self.ffprobe_candidates.insert(0, PathBuf::from(path));
        }
        if let Some(codec) = var("VIDSPLIT_VIDEO_CODEC") {
            self.video_codec = codec;
        }
        if let Some(codec) = var("VIDSPLIT_AUDIO_CODEC") {
            self.audio_codec = codec;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_duration == 0 {
            return Err(VidsplitError::Config(
                "Chunk duration must be greater than 0".to_string(),
            ));
        }

        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(VidsplitError::Config(
                "Codec names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn chunk_length(&self) -> Duration {
        Duration::from_secs(self.chunk_duration)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vidsplit").join("config.toml"))
    }
}
