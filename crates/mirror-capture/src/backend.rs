use std::sync::Arc;

use mirror_core::{CaptureConfig, CaptureError, Monitor, SourceId, WindowInfo};
use mirror_renderer::DeviceHandle;

use crate::dispatch::FrameDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Window,
    Monitor,
}

/// A source id resolved to a live platform handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub id:     SourceId,
    pub kind:   TargetKind,
    /// Native handle value (`HWND` / `HMONITOR` on Windows).
    pub handle: usize,
    pub width:  u32,
    pub height: u32,
}

// MARK: - CaptureBackend

/// Per-platform capture primitives driven by [`crate::Capturer`].
pub trait CaptureBackend: Send {
    fn platform_name(&self) -> &'static str;

    /// Whether the host capture API is present, without side effects.
    fn is_supported(&self) -> bool;

    /// One-time runtime setup; `Unsupported` when the capture API is missing.
    fn probe(&mut self) -> Result<(), CaptureError>;

    /// Bind the graphics device captured surfaces are produced on.
    fn attach_device(&mut self, device: &DeviceHandle) -> Result<(), CaptureError>;

    fn monitors(&self) -> Result<Vec<Monitor>, CaptureError>;

    fn windows(&self) -> Result<Vec<WindowInfo>, CaptureError>;

    /// Late-bound lookup: window handles first, then monitor handles.
    fn resolve(&self, id: &SourceId) -> Option<CaptureTarget>;

    /// Start an OS capture session that feeds `dispatcher`.
    fn open(
        &mut self,
        target: &CaptureTarget,
        config: &CaptureConfig,
        dispatcher: Arc<FrameDispatcher>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError>;

    fn is_cursor_visible(&self) -> bool {
        true
    }
}

/// A running OS capture session.
pub trait ActiveCapture: Send {
    fn size(&self) -> (u32, u32);

    /// Tear the session down. Frame delivery is already closed when this runs.
    fn close(self: Box<Self>);
}
