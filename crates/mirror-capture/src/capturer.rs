use std::sync::{Arc, RwLock};
use std::time::Instant;

use mirror_core::{
    CaptureConfig, CaptureError, CaptureStatistics, Monitor, SourceId, StatsTracker, TextureError,
    WindowInfo,
};
use mirror_renderer::DeviceHandle;
use tracing::{debug, info, warn};

use crate::backend::{ActiveCapture, CaptureBackend, CaptureTarget};
use crate::capture::{CaptureState, GraphicsCapture};
use crate::dispatch::{CallbackSlot, FrameCallback, FrameDispatcher};

struct Session {
    target:     CaptureTarget,
    dispatcher: Arc<FrameDispatcher>,
    active:     Box<dyn ActiveCapture>,
}

/// The state machine behind [`GraphicsCapture`], generic over the platform backend.
///
/// Statistics are shared by every session the capturer opens and only reset
/// on request, so they stay monotonic across source switches.
pub struct Capturer<B: CaptureBackend> {
    backend:  B,
    state:    CaptureState,
    device:   Option<DeviceHandle>,
    config:   CaptureConfig,
    callback: CallbackSlot,
    stats:    Arc<StatsTracker>,
    session:  Option<Session>,
}

impl<B: CaptureBackend> Capturer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: CaptureState::Uninitialized,
            device: None,
            config: CaptureConfig::default(),
            callback: Arc::new(RwLock::new(None)),
            stats: Arc::new(StatsTracker::new()),
            session: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    /// Size of the running capture as opened.
    pub fn capture_size(&self) -> Option<(u32, u32)> {
        self.session.as_ref().map(|s| s.active.size())
    }

    fn require_initialized(&self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Uninitialized => Err(CaptureError::NotInitialized),
            CaptureState::Shutdown => Err(CaptureError::ShutDown),
            _ => Ok(()),
        }
    }

    fn close_session(&mut self) -> Option<CaptureTarget> {
        let session = self.session.take()?;
        // Waits for an in-flight callback before the OS session goes away.
        session.dispatcher.close();
        session.active.close();
        Some(session.target)
    }
}

impl<B: CaptureBackend> GraphicsCapture for Capturer<B> {
    fn initialize(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Uninitialized => {}
            CaptureState::Shutdown => return Err(CaptureError::ShutDown),
            _ => return Ok(()),
        }
        self.backend.probe()?;
        self.state = CaptureState::Initialized;
        info!("{} capture initialized", self.backend.platform_name());
        Ok(())
    }

    fn set_device(&mut self, device: DeviceHandle) -> Result<(), CaptureError> {
        self.require_initialized()?;
        if self.state == CaptureState::Capturing {
            return Err(CaptureError::AlreadyCapturing);
        }
        device.validate().map_err(|e| match e {
            TextureError::InvalidDevice { reason } => CaptureError::InvalidDevice { reason },
            other => CaptureError::InvalidDevice {
                reason: other.to_string(),
            },
        })?;
        self.backend.attach_device(&device)?;
        info!("Capture device set ({})", device.kind());
        self.device = Some(device);
        self.state = CaptureState::Idle;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.state == CaptureState::Shutdown {
            return;
        }
        if let Some(target) = self.close_session() {
            debug!("Capture of {} closed by shutdown", target.id);
        }
        self.clear_frame_callback();
        self.device = None;
        self.state = CaptureState::Shutdown;
        info!("{} capture shut down", self.backend.platform_name());
    }

    fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    fn is_initialized(&self) -> bool {
        matches!(
            self.state,
            CaptureState::Initialized | CaptureState::Idle | CaptureState::Capturing
        )
    }

    fn state(&self) -> CaptureState {
        self.state
    }

    fn monitors(&self) -> Result<Vec<Monitor>, CaptureError> {
        self.require_initialized()?;
        self.backend.monitors()
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        self.require_initialized()?;
        self.backend.windows()
    }

    fn set_capture_config(&mut self, config: CaptureConfig) -> Result<(), CaptureError> {
        if self.state == CaptureState::Capturing {
            return Err(CaptureError::ConfigFrozen);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn capture_config(&self) -> &CaptureConfig {
        &self.config
    }

    fn start_capture(&mut self, source: &SourceId) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Idle => {}
            CaptureState::Capturing => return Err(CaptureError::AlreadyCapturing),
            CaptureState::Initialized => {
                return Err(CaptureError::InvalidDevice {
                    reason: "no device set".into(),
                })
            }
            CaptureState::Uninitialized => return Err(CaptureError::NotInitialized),
            CaptureState::Shutdown => return Err(CaptureError::ShutDown),
        }

        let target = self.backend.resolve(source).ok_or_else(|| {
            warn!("Capture source {source} not found");
            CaptureError::SourceNotFound {
                id: source.to_string(),
            }
        })?;

        let dispatcher = Arc::new(FrameDispatcher::new(
            self.callback.clone(),
            self.stats.clone(),
            self.config.frame_interval(),
        ));
        let active = self
            .backend
            .open(&target, &self.config, dispatcher.clone())?;

        info!(
            "Capturing {:?} {} ({}x{}, {} quality, {} fps)",
            target.kind,
            target.id,
            target.width,
            target.height,
            self.config.quality.label(),
            self.config.target_fps
        );
        self.session = Some(Session {
            target,
            dispatcher,
            active,
        });
        self.state = CaptureState::Capturing;
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(target) = self.close_session() {
            info!("Capture of {} stopped", target.id);
        }
        if self.state == CaptureState::Capturing {
            self.state = CaptureState::Idle;
        }
    }

    fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    fn active_source(&self) -> Option<&SourceId> {
        self.session.as_ref().map(|s| &s.target.id)
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::from(callback));
    }

    fn clear_frame_callback(&mut self) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn statistics(&self) -> CaptureStatistics {
        self.stats.snapshot(Instant::now())
    }

    fn reset_statistics(&mut self) {
        self.stats.reset();
    }

    fn is_cursor_visible(&self) -> bool {
        self.config.include_cursor && self.backend.is_cursor_visible()
    }

    fn platform_name(&self) -> &'static str {
        self.backend.platform_name()
    }
}

impl<B: CaptureBackend> Drop for Capturer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::synthetic::PADDING_SENTINEL;
    use crate::platform::{Pacing, SyntheticBackend, SyntheticDesktop};
    use mirror_core::{pixels, FrameData};
    use mirror_renderer::{SoftwareDevice, TextureSink};
    use std::time::Duration;

    fn unthrottled() -> CaptureConfig {
        CaptureConfig {
            target_fps: 0,
            ..CaptureConfig::default()
        }
    }

    /// Initialized capturer with a device, manual pacing and no throttling.
    fn ready(desktop: &SyntheticDesktop) -> Capturer<SyntheticBackend> {
        let mut capturer = Capturer::new(SyntheticBackend::new(desktop.clone(), Pacing::Manual));
        capturer.initialize().unwrap();
        capturer.set_device(SoftwareDevice::tight().into()).unwrap();
        capturer.set_capture_config(unthrottled()).unwrap();
        capturer
    }

    fn first_monitor(capturer: &Capturer<SyntheticBackend>) -> SourceId {
        capturer.monitors().unwrap()[0].id.clone()
    }

    fn attach_sink(capturer: &mut Capturer<SyntheticBackend>) -> Arc<TextureSink> {
        let sink = Arc::new(TextureSink::new(SoftwareDevice::tight().into()).unwrap());
        let target = sink.clone();
        capturer.set_frame_callback(Box::new(move |frame: &FrameData<'_>| target.on_frame(frame)));
        sink
    }

    #[test]
    fn lifecycle_walks_the_state_machine() {
        let desktop = SyntheticDesktop::single_monitor(640, 480);
        let mut capturer = Capturer::new(SyntheticBackend::new(desktop, Pacing::Manual));
        assert_eq!(capturer.state(), CaptureState::Uninitialized);
        assert_eq!(capturer.monitors(), Err(CaptureError::NotInitialized));

        capturer.initialize().unwrap();
        capturer.initialize().unwrap();
        assert_eq!(capturer.state(), CaptureState::Initialized);
        assert!(capturer.is_initialized());

        let id = first_monitor(&capturer);
        assert!(matches!(
            capturer.start_capture(&id),
            Err(CaptureError::InvalidDevice { .. })
        ));

        capturer.set_device(SoftwareDevice::default().into()).unwrap();
        assert_eq!(capturer.state(), CaptureState::Idle);
        capturer.start_capture(&id).unwrap();
        assert_eq!(capturer.state(), CaptureState::Capturing);
        assert_eq!(capturer.capture_size(), Some((640, 480)));

        capturer.shutdown();
        assert_eq!(capturer.state(), CaptureState::Shutdown);
        assert!(!capturer.is_initialized());
        assert_eq!(capturer.start_capture(&id), Err(CaptureError::ShutDown));
        assert_eq!(capturer.initialize(), Err(CaptureError::ShutDown));
    }

    #[test]
    fn unsupported_backend_fails_initialize() {
        let mut capturer = Capturer::new(SyntheticBackend::unsupported());
        assert!(!capturer.is_supported());
        assert!(matches!(
            capturer.initialize(),
            Err(CaptureError::Unsupported { .. })
        ));
        assert_eq!(capturer.state(), CaptureState::Uninitialized);
    }

    #[test]
    fn invalid_device_is_rejected() {
        let desktop = SyntheticDesktop::single_monitor(640, 480);
        let mut capturer = Capturer::new(SyntheticBackend::new(desktop, Pacing::Manual));
        capturer.initialize().unwrap();
        assert!(matches!(
            capturer.set_device(SoftwareDevice::new(0).into()),
            Err(CaptureError::InvalidDevice { .. })
        ));
        assert_eq!(capturer.state(), CaptureState::Initialized);
        assert!(capturer.backend().device().is_none());
    }

    #[test]
    fn stop_twice_is_a_no_op() {
        let desktop = SyntheticDesktop::single_monitor(320, 200);
        let mut capturer = ready(&desktop);
        let id = first_monitor(&capturer);
        capturer.start_capture(&id).unwrap();

        capturer.stop_capture();
        assert_eq!(capturer.state(), CaptureState::Idle);
        capturer.stop_capture();
        assert_eq!(capturer.state(), CaptureState::Idle);
        assert!(capturer.active_source().is_none());
    }

    #[test]
    fn start_while_capturing_keeps_current_source() {
        let desktop = SyntheticDesktop::single_monitor(320, 200);
        let other = desktop.add_window("Editor", "edit.exe", 800, 600);
        let mut capturer = ready(&desktop);
        let id = first_monitor(&capturer);

        capturer.start_capture(&id).unwrap();
        assert_eq!(capturer.start_capture(&other), Err(CaptureError::AlreadyCapturing));
        assert_eq!(capturer.active_source(), Some(&id));
        assert!(capturer.is_capturing());
    }

    #[test]
    fn switching_sources_keeps_statistics_monotonic() {
        let desktop = SyntheticDesktop::single_monitor(64, 32);
        let window = desktop.add_window("Viewer", "view.exe", 200, 150);
        let mut capturer = ready(&desktop);
        let sink = attach_sink(&mut capturer);
        let monitor = first_monitor(&capturer);

        capturer.start_capture(&monitor).unwrap();
        for _ in 0..3 {
            capturer.backend().pump_frame().unwrap();
        }
        capturer.stop_capture();
        assert_eq!(capturer.backend().pump_frame(), Err(CaptureError::NotCapturing));

        capturer.start_capture(&window).unwrap();
        assert_eq!(capturer.active_source(), Some(&window));
        for _ in 0..2 {
            capturer.backend().pump_frame().unwrap();
        }

        let stats = capturer.statistics();
        assert_eq!(stats.frames_captured, 5);
        assert_eq!(stats.frames_dropped, 0);
        assert!(stats.average_fps > 0.0);
        assert_eq!(sink.stats().width, 200);

        capturer.reset_statistics();
        assert_eq!(capturer.statistics().frames_captured, 0);
    }

    #[test]
    fn one_monitor_and_no_windows() {
        let desktop = SyntheticDesktop::single_monitor(1920, 1080);
        let hidden = desktop.add_window("Background", "svc.exe", 400, 300);
        desktop.set_visible(&hidden, false);
        let capturer = ready(&desktop);

        let monitors = capturer.monitors().unwrap();
        assert_eq!(monitors.len(), 1);
        assert!(monitors[0].is_primary);
        assert!(capturer.windows().unwrap().is_empty());

        let sources = capturer.available_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].name.ends_with("(Primary)"));
    }

    #[test]
    fn unknown_source_leaves_session_idle() {
        let desktop = SyntheticDesktop::single_monitor(320, 200);
        let mut capturer = ready(&desktop);
        assert_eq!(
            capturer.start_capture(&SourceId::from("nonexistent-id")),
            Err(CaptureError::SourceNotFound {
                id: "nonexistent-id".into()
            })
        );
        assert_eq!(capturer.state(), CaptureState::Idle);
    }

    #[test]
    fn vanished_source_is_not_found_at_start() {
        let desktop = SyntheticDesktop::single_monitor(320, 200);
        let window = desktop.add_window("Dialog", "app.exe", 400, 300);
        let mut capturer = ready(&desktop);
        assert!(capturer
            .available_sources()
            .unwrap()
            .iter()
            .any(|s| s.id == window));

        desktop.remove(&window);
        assert!(matches!(
            capturer.start_capture(&window),
            Err(CaptureError::SourceNotFound { .. })
        ));
        assert_eq!(capturer.state(), CaptureState::Idle);
    }

    #[test]
    fn config_is_frozen_while_capturing() {
        let desktop = SyntheticDesktop::single_monitor(320, 200);
        let mut capturer = ready(&desktop);
        let id = first_monitor(&capturer);
        capturer.start_capture(&id).unwrap();

        let mut changed = capturer.capture_config().clone();
        changed.include_cursor = false;
        assert_eq!(
            capturer.set_capture_config(changed.clone()),
            Err(CaptureError::ConfigFrozen)
        );
        assert!(capturer.capture_config().include_cursor);

        capturer.stop_capture();
        capturer.set_capture_config(changed.clone()).unwrap();
        assert!(!capturer.is_cursor_visible());

        changed.target_fps = 1000;
        assert!(matches!(
            capturer.set_capture_config(changed),
            Err(CaptureError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn padded_frames_reach_the_texture_without_padding() {
        let desktop = SyntheticDesktop::single_monitor(100, 50);
        let mut capturer = ready(&desktop);
        let sink = attach_sink(&mut capturer);
        let id = first_monitor(&capturer);

        capturer.start_capture(&id).unwrap();
        capturer.backend().pump_frame().unwrap();

        let contents = sink.with_texture(|t| t.and_then(|t| t.read_back())).unwrap();
        assert_eq!(contents.len(), 100 * 50 * 4);
        assert!(!contents.contains(&PADDING_SENTINEL));
        // Second row, first pixel: B = x, G = y.
        assert_eq!(&contents[400..402], &[0, 1]);
    }

    #[test]
    fn extraction_failure_delivers_placeholder_of_expected_size() {
        let desktop = SyntheticDesktop::single_monitor(40, 30);
        let mut capturer = ready(&desktop);
        let sink = attach_sink(&mut capturer);
        let id = first_monitor(&capturer);

        desktop.fail_extraction(true);
        capturer.start_capture(&id).unwrap();
        capturer.backend().pump_frame().unwrap();

        assert_eq!(capturer.statistics().frames_captured, 1);
        let contents = sink.with_texture(|t| t.and_then(|t| t.read_back())).unwrap();
        assert_eq!(contents.len(), 40 * 30 * 4);
        assert!(contents.iter().all(|&b| b == pixels::PLACEHOLDER_GRAY));
    }

    #[test]
    fn lost_surfaces_and_missing_callback_count_as_dropped() {
        let desktop = SyntheticDesktop::single_monitor(40, 30);
        let mut capturer = ready(&desktop);
        let id = first_monitor(&capturer);
        capturer.start_capture(&id).unwrap();

        capturer.backend().pump_frame().unwrap();
        desktop.lose_surfaces(true);
        capturer.backend().pump_frame().unwrap();

        let stats = capturer.statistics();
        assert_eq!((stats.frames_captured, stats.frames_dropped), (0, 2));
    }

    #[test]
    fn resized_source_recreates_texture() {
        let desktop = SyntheticDesktop::single_monitor(320, 200);
        let window = desktop.add_window("Player", "player.exe", 300, 200);
        let mut capturer = ready(&desktop);
        let sink = attach_sink(&mut capturer);

        capturer.start_capture(&window).unwrap();
        capturer.backend().pump_frame().unwrap();
        desktop.resize(&window, 500, 250);
        capturer.backend().pump_frame().unwrap();

        let stats = sink.stats();
        assert_eq!((stats.width, stats.height), (500, 250));
        assert_eq!(stats.recreations, 1);
        assert_eq!(capturer.capture_size(), Some((500, 250)));
    }

    #[test]
    fn throttling_drops_early_frames() {
        let desktop = SyntheticDesktop::single_monitor(16, 16);
        let mut capturer = ready(&desktop);
        capturer
            .set_capture_config(CaptureConfig {
                target_fps: 1,
                ..CaptureConfig::default()
            })
            .unwrap();
        let _sink = attach_sink(&mut capturer);
        let id = first_monitor(&capturer);

        capturer.start_capture(&id).unwrap();
        capturer.backend().pump_frame().unwrap();
        capturer.backend().pump_frame().unwrap();

        let stats = capturer.statistics();
        assert_eq!((stats.frames_captured, stats.frames_dropped), (1, 1));
    }

    #[test]
    fn timer_pacing_delivers_until_stopped() {
        let desktop = SyntheticDesktop::single_monitor(32, 32);
        let mut capturer = Capturer::new(SyntheticBackend::new(desktop, Pacing::Timer));
        capturer.initialize().unwrap();
        capturer.set_device(SoftwareDevice::default().into()).unwrap();
        capturer.set_capture_config(unthrottled()).unwrap();
        let sink = attach_sink(&mut capturer);
        let id = first_monitor(&capturer);

        capturer.start_capture(&id).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        capturer.stop_capture();

        let delivered = capturer.statistics().frames_captured;
        assert!(delivered > 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(capturer.statistics().frames_captured, delivered);
        assert_eq!(sink.stats().uploads, delivered);
    }

    #[test]
    fn cursor_visibility_needs_config_and_system_cursor() {
        let desktop = SyntheticDesktop::single_monitor(32, 32);
        let mut capturer = ready(&desktop);
        assert!(capturer.is_cursor_visible());

        desktop.set_cursor_visible(false);
        assert!(!capturer.is_cursor_visible());

        desktop.set_cursor_visible(true);
        capturer
            .set_capture_config(CaptureConfig {
                include_cursor: false,
                ..unthrottled()
            })
            .unwrap();
        assert!(!capturer.is_cursor_visible());
    }

    #[test]
    fn screenshot_hook_is_not_implemented() {
        let desktop = SyntheticDesktop::single_monitor(32, 32);
        let capturer = ready(&desktop);
        let id = first_monitor(&capturer);
        assert!(matches!(
            capturer.save_screenshot(&id, std::path::Path::new("shot.png")),
            Err(CaptureError::NotImplemented { .. })
        ));
    }
}
