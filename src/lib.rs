pub mod config;
pub mod editor;
pub mod error;
pub mod interactive;
pub mod media;
pub mod pipeline;
pub mod split;

pub use config::{Config, Method};
pub use error::{Result, VidsplitError};
pub use pipeline::{print_summary, run_split, Backends, SplitJob, SplitOutcome};
pub use split::{SplitResult, Splitter};
