pub mod config;
pub mod errors;
pub mod pixels;
pub mod stats;
pub mod types;

pub use config::{BackendKind, ConfigError, MirrorConfig, WindowConfig};
pub use errors::{CaptureError, FrameError, TextureError};
pub use stats::StatsTracker;
pub use types::*;
