//! Stand-in backend for hosts without a supported capture API.

use std::sync::Arc;

use mirror_core::{CaptureConfig, CaptureError, Monitor, SourceId, WindowInfo};
use mirror_renderer::DeviceHandle;
use tracing::warn;

use crate::backend::{ActiveCapture, CaptureBackend, CaptureTarget};
use crate::dispatch::FrameDispatcher;

#[derive(Debug, Default)]
pub struct UnsupportedBackend;

fn unsupported() -> CaptureError {
    CaptureError::Unsupported {
        platform: super::current_platform().to_string(),
    }
}

impl CaptureBackend for UnsupportedBackend {
    fn platform_name(&self) -> &'static str {
        super::current_platform()
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn probe(&mut self) -> Result<(), CaptureError> {
        warn!("No native screen capture on {}", super::current_platform());
        Err(unsupported())
    }

    fn attach_device(&mut self, _device: &DeviceHandle) -> Result<(), CaptureError> {
        Err(unsupported())
    }

    fn monitors(&self) -> Result<Vec<Monitor>, CaptureError> {
        Err(unsupported())
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        Err(unsupported())
    }

    fn resolve(&self, _id: &SourceId) -> Option<CaptureTarget> {
        None
    }

    fn open(
        &mut self,
        _target: &CaptureTarget,
        _config: &CaptureConfig,
        _dispatcher: Arc<FrameDispatcher>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError> {
        Err(unsupported())
    }
}
