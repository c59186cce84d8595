use std::path::Path;

use mirror_core::{
    CaptureConfig, CaptureError, CaptureSource, CaptureStatistics, Monitor, SourceId, WindowInfo,
};
use mirror_renderer::DeviceHandle;

use crate::dispatch::FrameCallback;

/// Lifecycle of a capturer.
///
/// ```text
///   Uninitialized ─initialize─▶ Initialized ─set_device─▶ Idle ⇄ Capturing
///         └───────────────────────────┴──────shutdown──────┴────────┴──▶ Shutdown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Uninitialized,
    /// Initialized, no device attached yet.
    Initialized,
    Idle,
    Capturing,
    Shutdown,
}

impl CaptureState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initialized => "Initialized",
            Self::Idle => "Idle",
            Self::Capturing => "Capturing",
            Self::Shutdown => "Shutdown",
        }
    }
}

// MARK: - GraphicsCapture

/// Uniform screen-capture interface, implemented once per host platform.
pub trait GraphicsCapture: Send {
    /// Probe the host capture API. Safe to call again once initialized.
    fn initialize(&mut self) -> Result<(), CaptureError>;

    /// Register the graphics device shared with the renderer. Required
    /// before [`GraphicsCapture::start_capture`].
    fn set_device(&mut self, device: DeviceHandle) -> Result<(), CaptureError>;

    /// Stop any capture and release everything. Terminal.
    fn shutdown(&mut self);

    fn is_supported(&self) -> bool;
    fn is_initialized(&self) -> bool;
    fn state(&self) -> CaptureState;

    /// Snapshot of the connected monitors.
    fn monitors(&self) -> Result<Vec<Monitor>, CaptureError>;

    /// Snapshot of the top-level windows.
    fn windows(&self) -> Result<Vec<WindowInfo>, CaptureError>;

    /// Monitors then capturable windows, as selectable sources.
    fn available_sources(&self) -> Result<Vec<CaptureSource>, CaptureError> {
        Ok(mirror_core::collect_sources(&self.monitors()?, &self.windows()?))
    }

    /// Rejected with `ConfigFrozen` while capturing.
    fn set_capture_config(&mut self, config: CaptureConfig) -> Result<(), CaptureError>;
    fn capture_config(&self) -> &CaptureConfig;

    fn start_capture(&mut self, source: &SourceId) -> Result<(), CaptureError>;

    /// No-op when not capturing.
    fn stop_capture(&mut self);

    fn is_capturing(&self) -> bool;
    fn active_source(&self) -> Option<&SourceId>;

    /// Replace the frame sink. Takes effect for the running session too.
    fn set_frame_callback(&mut self, callback: FrameCallback);
    fn clear_frame_callback(&mut self);

    fn statistics(&self) -> CaptureStatistics;
    fn reset_statistics(&mut self);

    fn is_cursor_visible(&self) -> bool;
    fn platform_name(&self) -> &'static str;

    /// Write one frame of `source` to `path`. No backend implements this yet.
    fn save_screenshot(&self, _source: &SourceId, _path: &Path) -> Result<(), CaptureError> {
        Err(CaptureError::NotImplemented {
            feature: "screenshot".into(),
        })
    }
}
