use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidsplitError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Duration probe failed: {0}")]
    Probe(String),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Invalid chunk plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "libav")]
    #[error("libav error: {0}")]
    Libav(#[from] ffmpeg_next::Error),
}

pub type Result<T> = std::result::Result<T, VidsplitError>;
