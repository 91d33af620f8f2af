//! Locating the external ffmpeg / ffprobe executables.
//!
//! A [`ToolLocator`] tries an ordered list of explicit candidate paths first
//! (environment override, config file, platform default). The first entry
//! that exists wins. Failing that, the tool is looked up on `PATH` and must
//! answer `-version` successfully to count as available.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::Config;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

#[derive(Debug, Clone)]
pub struct ToolLocator {
    name: String,
    candidates: Vec<PathBuf>,
    search_path: bool,
}

impl ToolLocator {
    pub fn new(name: impl Into<String>, candidates: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            candidates,
            search_path: true,
        }
    }

    pub fn ffmpeg(config: &Config) -> Self {
        Self::new(FFMPEG, config.ffmpeg_candidates.clone())
    }

    pub fn ffprobe(config: &Config) -> Self {
        Self::new(FFPROBE, config.ffprobe_candidates.clone())
    }

    /// Only consider the explicit candidates, never `PATH`.
    pub fn without_path_search(mut self) -> Self {
        self.search_path = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the executable, or `None` if the tool is not usable.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(found) = self.candidates.iter().find(|p| p.is_file()) {
            debug!("Using {} at {}", self.name, found.display());
            return Some(found.clone());
        }

        if !self.search_path {
            return None;
        }

        let path = which::which(&self.name).ok()?;
        if answers_version(&path) {
            debug!("{} is available on PATH at {}", self.name, path.display());
            Some(path)
        } else {
            debug!("{} at {} failed its version check", self.name, path.display());
            None
        }
    }

    pub fn is_available(&self) -> bool {
        self.locate().is_some()
    }
}

fn answers_version(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("ffmpeg-b");
        let third = dir.path().join("ffmpeg-c");
        std::fs::write(&second, b"").unwrap();
        std::fs::write(&third, b"").unwrap();

        let locator = ToolLocator::new(
            FFMPEG,
            vec![dir.path().join("missing"), second.clone(), third],
        )
        .without_path_search();

        assert_eq!(locator.locate(), Some(second));
        assert!(locator.is_available());
    }

    #[test]
    fn test_directory_is_not_a_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let locator =
            ToolLocator::new(FFMPEG, vec![dir.path().to_path_buf()]).without_path_search();
        assert_eq!(locator.locate(), None);
    }

    #[test]
    fn test_no_candidates_without_path_search() {
        let locator = ToolLocator::new(FFPROBE, Vec::new()).without_path_search();
        assert!(!locator.is_available());
        assert_eq!(locator.name(), "ffprobe");
    }

    #[test]
    fn test_unknown_tool_on_path() {
        let locator = ToolLocator::new("vidsplit-no-such-tool", Vec::new());
        assert_eq!(locator.locate(), None);
    }

    #[test]
    fn test_locators_from_config() {
        let config = Config {
            ffmpeg_candidates: vec![PathBuf::from("/opt/a/ffmpeg")],
            ffprobe_candidates: vec![PathBuf::from("/opt/a/ffprobe")],
            ..Default::default()
        };
        assert_eq!(ToolLocator::ffmpeg(&config).name(), "ffmpeg");
        assert_eq!(ToolLocator::ffprobe(&config).candidates.len(), 1);
    }
}
