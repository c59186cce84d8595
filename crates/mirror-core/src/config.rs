use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::CaptureConfig;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "MIRROR_CONFIG";
pub const BACKEND_ENV: &str = "MIRROR_BACKEND";
pub const TARGET_FPS_ENV: &str = "MIRROR_TARGET_FPS";

/// Which capture backend the application constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The host OS capture API (Windows.Graphics.Capture on Windows).
    #[default]
    Native,
    /// Generated test-pattern desktop, available everywhere.
    Synthetic,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "synthetic" | "demo" => Ok(Self::Synthetic),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { width: 1280.0, height: 800.0 }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub capture: CaptureConfig,
    pub backend: BackendKind,
    pub window: WindowConfig,
    /// How often the source list is re-enumerated, in milliseconds.
    #[serde(alias = "sourceRefreshMs")]
    pub source_refresh_ms: u64,
}

impl MirrorConfig {
    pub const DEFAULT_SOURCE_REFRESH_MS: u64 = 2_000;

    /// Defaults, then the file named by `MIRROR_CONFIG`, then env overrides.
    pub fn load() -> Self {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)).unwrap_or_else(|e| {
                warn!("Config {path} unreadable, using defaults: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_json(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut cfg: Self = serde_json::from_str(text)?;
        if cfg.source_refresh_ms == 0 {
            cfg.source_refresh_ms = Self::DEFAULT_SOURCE_REFRESH_MS;
        }
        cfg.capture.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(cfg)
    }

    /// Apply `MIRROR_BACKEND` / `MIRROR_TARGET_FPS`; malformed values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(BACKEND_ENV) {
            match raw.parse() {
                Ok(kind) => self.backend = kind,
                Err(e) => warn!("{BACKEND_ENV}: {e}"),
            }
        }
        if let Some(raw) = lookup(TARGET_FPS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(fps) if fps <= CaptureConfig::MAX_TARGET_FPS => self.capture.target_fps = fps,
                _ => warn!("{TARGET_FPS_ENV}: ignoring '{raw}'"),
            }
        }
    }

    pub fn source_refresh(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.source_refresh_ms.max(100))
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            backend: BackendKind::default(),
            window: WindowConfig::default(),
            source_refresh_ms: Self::DEFAULT_SOURCE_REFRESH_MS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration invalid: {0}")]
    Invalid(String),
}
