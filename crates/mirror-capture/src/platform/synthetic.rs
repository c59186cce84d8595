//! Generated virtual desktop.
//!
//! Monitors and windows live in a shared [`SyntheticDesktop`] that can be
//! changed while a capture runs (sources vanish, windows resize). Frames are
//! BGRA with padded rows; the padding holds [`PADDING_SENTINEL`] so consumers
//! that copy padding are easy to spot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use mirror_core::{
    pixels, CaptureConfig, CaptureError, FrameData, Monitor, SourceId, WindowInfo,
    FRAME_BYTES_PER_PIXEL,
};
use mirror_renderer::DeviceHandle;
use tracing::{debug, info};

use crate::backend::{ActiveCapture, CaptureBackend, CaptureTarget, TargetKind};
use crate::dispatch::{timestamp_ms, FrameDispatcher};

/// Byte written into row padding of generated frames.
pub const PADDING_SENTINEL: u8 = 0xAB;

/// Frame period used by timer pacing when the config is unthrottled.
const UNTHROTTLED_PERIOD: Duration = Duration::from_millis(16);

/// Row stride of generated frames: always padded past the visible row.
pub fn padded_stride(width: u32) -> usize {
    pixels::align_up(width as usize * FRAME_BYTES_PER_PIXEL + 16, 32)
}

// ── SyntheticDesktop ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DesktopState {
    monitors:        Vec<Monitor>,
    windows:         Vec<WindowInfo>,
    next_handle:     usize,
    fail_extraction: bool,
    lose_surfaces:   bool,
    cursor_hidden:   bool,
}

impl DesktopState {
    fn allocate(&mut self) -> SourceId {
        self.next_handle += 1;
        SourceId::new((0x1000 + self.next_handle).to_string())
    }
}

/// Shared, mutable set of virtual monitors and windows.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDesktop {
    inner: Arc<Mutex<DesktopState>>,
}

impl SyntheticDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// One primary monitor and nothing else.
    pub fn single_monitor(width: u32, height: u32) -> Self {
        let desktop = Self::new();
        desktop.add_monitor("SYNTH1", width, height, true);
        desktop
    }

    /// Two monitors and a handful of windows, for the demo mode.
    pub fn demo() -> Self {
        let desktop = Self::new();
        desktop.add_monitor("SYNTH1", 1920, 1080, true);
        desktop.add_monitor("SYNTH2", 1280, 1024, false);
        desktop.add_window("Terminal", "shell.exe", 960, 600);
        desktop.add_window("Browser", "browser.exe", 1400, 900);
        let hidden = desktop.add_window("Minimized Notes", "notes.exe", 800, 600);
        desktop.set_minimized(&hidden, true);
        desktop.add_window("Tray Popup", "tray.exe", 90, 40);
        desktop
    }

    pub fn add_monitor(&self, name: &str, width: u32, height: u32, primary: bool) -> SourceId {
        let mut state = self.lock();
        let id = state.allocate();
        let x = state.monitors.iter().map(|m| m.x + m.width as i32).max().unwrap_or(0);
        state.monitors.push(Monitor {
            id: id.clone(),
            name: name.to_string(),
            x,
            y: 0,
            width,
            height,
            is_primary: primary,
            dpi_scale: 1.0,
        });
        id
    }

    pub fn add_window(&self, title: &str, process: &str, width: u32, height: u32) -> SourceId {
        let mut state = self.lock();
        let id = state.allocate();
        let pid = 4000 + state.next_handle as u32;
        state.windows.push(WindowInfo {
            id: id.clone(),
            title: title.to_string(),
            process_name: process.to_string(),
            process_id: pid,
            x: 40,
            y: 40,
            width,
            height,
            is_visible: true,
            is_minimized: false,
        });
        id
    }

    /// Remove a monitor or window; `false` if the id was unknown.
    pub fn remove(&self, id: &SourceId) -> bool {
        let mut state = self.lock();
        let before = state.monitors.len() + state.windows.len();
        state.monitors.retain(|m| &m.id != id);
        state.windows.retain(|w| &w.id != id);
        before != state.monitors.len() + state.windows.len()
    }

    pub fn resize(&self, id: &SourceId, width: u32, height: u32) {
        let mut state = self.lock();
        if let Some(w) = state.windows.iter_mut().find(|w| &w.id == id) {
            w.width = width;
            w.height = height;
        } else if let Some(m) = state.monitors.iter_mut().find(|m| &m.id == id) {
            m.width = width;
            m.height = height;
        }
    }

    pub fn set_minimized(&self, id: &SourceId, minimized: bool) {
        if let Some(w) = self.lock().windows.iter_mut().find(|w| &w.id == id) {
            w.is_minimized = minimized;
        }
    }

    pub fn set_visible(&self, id: &SourceId, visible: bool) {
        if let Some(w) = self.lock().windows.iter_mut().find(|w| &w.id == id) {
            w.is_visible = visible;
        }
    }

    /// Make every subsequent frame fail surface extraction.
    pub fn fail_extraction(&self, fail: bool) {
        self.lock().fail_extraction = fail;
    }

    /// Make every subsequent frame unacquirable.
    pub fn lose_surfaces(&self, lose: bool) {
        self.lock().lose_surfaces = lose;
    }

    pub fn set_cursor_visible(&self, visible: bool) {
        self.lock().cursor_hidden = !visible;
    }

    fn lookup(&self, id: &SourceId) -> Option<(TargetKind, u32, u32)> {
        let state = self.lock();
        if let Some(w) = state.windows.iter().find(|w| &w.id == id) {
            return Some((TargetKind::Window, w.width, w.height));
        }
        state
            .monitors
            .iter()
            .find(|m| &m.id == id)
            .map(|m| (TargetKind::Monitor, m.width, m.height))
    }

    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Frame stream ──────────────────────────────────────────────────────────────

struct Stream {
    desktop:    SyntheticDesktop,
    id:         SourceId,
    dispatcher: Arc<FrameDispatcher>,
    size:       (u32, u32),
    frame_no:   u64,
    buffer:     Vec<u8>,
}

impl Stream {
    /// Produce and deliver one frame of the current source contents.
    fn produce(&mut self) {
        let (fail, lose) = {
            let state = self.desktop.lock();
            (state.fail_extraction, state.lose_surfaces)
        };
        let Some((_, width, height)) = self.desktop.lookup(&self.id).filter(|_| !lose) else {
            self.dispatcher.record_surface_loss();
            return;
        };

        if (width, height) != self.size {
            debug!(
                "Synthetic source {} resized {}x{} -> {width}x{height}",
                self.id, self.size.0, self.size.1
            );
            self.size = (width, height);
        }
        self.frame_no += 1;

        if fail {
            self.dispatcher.deliver_placeholder(width, height, timestamp_ms());
            return;
        }

        let stride = padded_stride(width);
        let row_bytes = width as usize * FRAME_BYTES_PER_PIXEL;
        self.buffer.resize(stride * height as usize, 0);
        let shade = (self.frame_no % 256) as u8;
        for (y, row) in self.buffer.chunks_exact_mut(stride).enumerate() {
            let (visible, padding) = row.split_at_mut(row_bytes);
            for (x, px) in visible.chunks_exact_mut(FRAME_BYTES_PER_PIXEL).enumerate() {
                px.copy_from_slice(&[x as u8, y as u8, shade, 0xFF]);
            }
            padding.fill(PADDING_SENTINEL);
        }

        let frame = FrameData {
            data: &self.buffer,
            width,
            height,
            stride,
            timestamp_ms: timestamp_ms(),
        };
        self.dispatcher.deliver(&frame);
    }
}

fn lock_stream(stream: &Mutex<Stream>) -> MutexGuard<'_, Stream> {
    stream.lock().unwrap_or_else(|e| e.into_inner())
}

// ── SyntheticBackend ──────────────────────────────────────────────────────────

/// How a synthetic capture produces frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// A background thread at the configured frame rate.
    Timer,
    /// Only when [`SyntheticBackend::pump_frame`] is called.
    Manual,
}

pub struct SyntheticBackend {
    desktop:   SyntheticDesktop,
    pacing:    Pacing,
    supported: bool,
    device:    Option<DeviceHandle>,
    current:   Weak<Mutex<Stream>>,
}

impl SyntheticBackend {
    pub fn new(desktop: SyntheticDesktop, pacing: Pacing) -> Self {
        Self {
            desktop,
            pacing,
            supported: true,
            device: None,
            current: Weak::new(),
        }
    }

    /// A backend whose probe fails, for exercising the unsupported path.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(SyntheticDesktop::new(), Pacing::Manual)
        }
    }

    pub fn desktop(&self) -> &SyntheticDesktop {
        &self.desktop
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    /// Produce one frame on the open session.
    pub fn pump_frame(&self) -> Result<(), CaptureError> {
        let stream = self.current.upgrade().ok_or(CaptureError::NotCapturing)?;
        lock_stream(&stream).produce();
        Ok(())
    }
}

impl CaptureBackend for SyntheticBackend {
    fn platform_name(&self) -> &'static str {
        "Synthetic"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn probe(&mut self) -> Result<(), CaptureError> {
        if !self.supported {
            return Err(CaptureError::Unsupported {
                platform: "Synthetic".into(),
            });
        }
        Ok(())
    }

    fn attach_device(&mut self, device: &DeviceHandle) -> Result<(), CaptureError> {
        self.device = Some(device.clone());
        Ok(())
    }

    fn monitors(&self) -> Result<Vec<Monitor>, CaptureError> {
        Ok(self.desktop.lock().monitors.clone())
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        Ok(self
            .desktop
            .lock()
            .windows
            .iter()
            .filter(|w| w.is_visible)
            .cloned()
            .collect())
    }

    fn resolve(&self, id: &SourceId) -> Option<CaptureTarget> {
        let (kind, width, height) = self.desktop.lookup(id)?;
        let handle = id.as_str().parse().ok()?;
        Some(CaptureTarget {
            id: id.clone(),
            kind,
            handle,
            width,
            height,
        })
    }

    fn open(
        &mut self,
        target: &CaptureTarget,
        config: &CaptureConfig,
        dispatcher: Arc<FrameDispatcher>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError> {
        if self.device.is_none() {
            return Err(CaptureError::InvalidDevice {
                reason: "no device attached".into(),
            });
        }
        let stream = Arc::new(Mutex::new(Stream {
            desktop: self.desktop.clone(),
            id: target.id.clone(),
            dispatcher,
            size: (target.width, target.height),
            frame_no: 0,
            buffer: Vec::new(),
        }));
        self.current = Arc::downgrade(&stream);

        let stop = Arc::new(AtomicBool::new(false));
        let worker = match self.pacing {
            Pacing::Manual => None,
            Pacing::Timer => {
                let period = config.frame_interval().unwrap_or(UNTHROTTLED_PERIOD);
                let stream = stream.clone();
                let stop = stop.clone();
                let handle = std::thread::Builder::new()
                    .name("synthetic-capture".into())
                    .spawn(move || {
                        while !stop.load(Ordering::Relaxed) {
                            lock_stream(&stream).produce();
                            std::thread::sleep(period);
                        }
                    })
                    .map_err(|e| CaptureError::backend("spawn synthetic capture thread", e))?;
                Some(handle)
            }
        };

        info!("Synthetic capture of {} opened ({:?})", target.id, self.pacing);
        Ok(Box::new(SyntheticCapture {
            stream,
            stop,
            worker,
        }))
    }

    fn is_cursor_visible(&self) -> bool {
        !self.desktop.lock().cursor_hidden
    }
}

struct SyntheticCapture {
    stream: Arc<Mutex<Stream>>,
    stop:   Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ActiveCapture for SyntheticCapture {
    fn size(&self) -> (u32, u32) {
        lock_stream(&self.stream).size
    }

    fn close(mut self: Box<Self>) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_desktop_offers_monitors_and_large_windows_only() {
        let backend = SyntheticBackend::new(SyntheticDesktop::demo(), Pacing::Manual);
        let sources = mirror_core::collect_sources(
            &backend.monitors().unwrap(),
            &backend.windows().unwrap(),
        );
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "SYNTH1 (Primary)",
                "SYNTH2",
                "Terminal - shell.exe",
                "Browser - browser.exe"
            ]
        );
    }

    #[test]
    fn resolution_is_late_bound() {
        let desktop = SyntheticDesktop::new();
        let backend = SyntheticBackend::new(desktop.clone(), Pacing::Manual);
        let win = desktop.add_window("Editor", "edit.exe", 640, 480);
        assert_eq!(backend.resolve(&win).map(|t| t.kind), Some(TargetKind::Window));

        desktop.remove(&win);
        assert!(backend.resolve(&win).is_none());
    }

    #[test]
    fn generated_rows_are_padded_with_sentinel() {
        assert_eq!(padded_stride(100), 416);

        let desktop = SyntheticDesktop::single_monitor(100, 50);
        let id = desktop.lock().monitors[0].id.clone();
        let captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let dispatcher = Arc::new(FrameDispatcher::detached(
            Box::new(move |f: &FrameData<'_>| {
                *sink.lock().unwrap() = Some((f.stride, f.data.to_vec()));
            }),
            None,
        ));
        let mut stream = Stream {
            desktop,
            id,
            dispatcher,
            size: (100, 50),
            frame_no: 0,
            buffer: Vec::new(),
        };
        stream.produce();

        let (stride, data) = captured.lock().unwrap().take().unwrap();
        assert_eq!(stride, 416);
        assert_eq!(&data[400..416], &[PADDING_SENTINEL; 16]);
        assert_eq!(&data[416..420], &[0, 1, 1, 0xFF]);
    }
}
