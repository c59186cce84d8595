//! Platform backends and the factory that picks one.

pub mod synthetic;
pub mod unsupported;

#[cfg(target_os = "windows")]
pub mod wgc;

use mirror_core::BackendKind;
use tracing::info;

use crate::capture::GraphicsCapture;
use crate::capturer::Capturer;

pub use synthetic::{Pacing, SyntheticBackend, SyntheticDesktop};
pub use unsupported::UnsupportedBackend;

#[cfg(target_os = "windows")]
pub use wgc::WgcBackend;

/// The backend for the host OS.
#[cfg(target_os = "windows")]
pub type NativeBackend = WgcBackend;
#[cfg(not(target_os = "windows"))]
pub type NativeBackend = UnsupportedBackend;

/// Host OS name as reported in logs and the UI.
pub fn current_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "macOS"
    } else if cfg!(target_os = "linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

/// Build an uninitialized capturer for `kind`.
pub fn create(kind: BackendKind) -> Box<dyn GraphicsCapture> {
    info!("Creating {kind} capture backend on {}", current_platform());
    match kind {
        BackendKind::Native => Box::new(Capturer::new(NativeBackend::default())),
        BackendKind::Synthetic => Box::new(Capturer::new(SyntheticBackend::new(
            SyntheticDesktop::demo(),
            Pacing::Timer,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureState;

    #[test]
    fn synthetic_factory_initializes_anywhere() {
        let mut capture = create(BackendKind::Synthetic);
        assert_eq!(capture.state(), CaptureState::Uninitialized);
        capture.initialize().unwrap();
        assert_eq!(capture.platform_name(), "Synthetic");
        assert!(!capture.available_sources().unwrap().is_empty());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn native_factory_is_an_explicit_stub_off_windows() {
        let mut capture = create(BackendKind::Native);
        assert!(!capture.is_supported());
        assert!(matches!(
            capture.initialize(),
            Err(mirror_core::CaptureError::Unsupported { .. })
        ));
        assert_eq!(capture.state(), CaptureState::Uninitialized);
    }
}
