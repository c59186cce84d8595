use serde::{Deserialize, Serialize};

use crate::errors::FrameError;

/// Bytes per pixel of every frame the capture pipeline produces (BGRA8).
pub const FRAME_BYTES_PER_PIXEL: usize = 4;

// MARK: - SourceId

/// Opaque identifier round-tripped from enumeration to `start_capture`.
///
/// The format is platform-defined (a stringified native handle on Windows).
/// Callers compare ids for equality and never look inside them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw platform string. Only backends should interpret it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// MARK: - Monitor / WindowInfo

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: SourceId,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
    pub dpi_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: SourceId,
    pub title: String,
    pub process_name: String,
    pub process_id: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_visible: bool,
    pub is_minimized: bool,
}

impl WindowInfo {
    /// Windows smaller than this (either axis) are not offered as sources.
    pub const MIN_SOURCE_EDGE: u32 = 100;

    pub fn is_capturable(&self) -> bool {
        !self.is_minimized
            && self.width > Self::MIN_SOURCE_EDGE
            && self.height > Self::MIN_SOURCE_EDGE
    }
}

// MARK: - CaptureSource

/// A monitor or window the user can pick in the source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSource {
    pub id: SourceId,
    pub name: String,
    pub is_monitor: bool,
    pub width: u32,
    pub height: u32,
}

impl From<&Monitor> for CaptureSource {
    fn from(m: &Monitor) -> Self {
        let name = if m.is_primary {
            format!("{} (Primary)", m.name)
        } else {
            m.name.clone()
        };
        Self {
            id: m.id.clone(),
            name,
            is_monitor: true,
            width: m.width,
            height: m.height,
        }
    }
}

impl From<&WindowInfo> for CaptureSource {
    fn from(w: &WindowInfo) -> Self {
        Self {
            id: w.id.clone(),
            name: format!("{} - {}", w.title, w.process_name),
            is_monitor: false,
            width: w.width,
            height: w.height,
        }
    }
}

/// Monitors first, then every capturable window.
pub fn collect_sources(monitors: &[Monitor], windows: &[WindowInfo]) -> Vec<CaptureSource> {
    monitors
        .iter()
        .map(CaptureSource::from)
        .chain(
            windows
                .iter()
                .filter(|w| w.is_capturable())
                .map(CaptureSource::from),
        )
        .collect()
}

// MARK: - CaptureConfig

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl CaptureQuality {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Buffers requested from the OS frame pool.
    pub fn frame_pool_buffers(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Settings frozen for the lifetime of a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub quality: CaptureQuality,
    /// Upper bound on delivered frames per second. `0` disables throttling.
    #[serde(alias = "targetFps")]
    pub target_fps: u32,
    #[serde(alias = "includeCursor")]
    pub include_cursor: bool,
    #[serde(alias = "includeBorders")]
    pub include_borders: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            quality: CaptureQuality::Medium,
            target_fps: 30,
            include_cursor: true,
            include_borders: true,
        }
    }
}

impl CaptureConfig {
    pub const MAX_TARGET_FPS: u32 = 240;

    pub fn validate(&self) -> Result<(), crate::CaptureError> {
        if self.target_fps > Self::MAX_TARGET_FPS {
            return Err(crate::CaptureError::InvalidConfig {
                reason: format!(
                    "target_fps {} exceeds {}",
                    self.target_fps,
                    Self::MAX_TARGET_FPS
                ),
            });
        }
        Ok(())
    }

    /// Minimum spacing between delivered frames, `None` when unthrottled.
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        (self.target_fps > 0)
            .then(|| std::time::Duration::from_micros(1_000_000 / self.target_fps as u64))
    }
}

// MARK: - CaptureStatistics

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CaptureStatistics {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub average_fps: f64,
}

// MARK: - FrameData

/// One captured frame, borrowed from the capture backend.
///
/// `data` is only valid for the duration of the frame callback: the backend
/// unmaps or reuses the buffer as soon as the callback returns. Consumers copy
/// out synchronously.
#[derive(Debug, Clone, Copy)]
pub struct FrameData<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows. May exceed `width * 4`.
    pub stride: usize,
    pub timestamp_ms: u64,
}

impl<'a> FrameData<'a> {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes of visible pixels in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * FRAME_BYTES_PER_PIXEL
    }

    pub fn is_tightly_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::EmptyFrame);
        }
        let row_bytes = self.row_bytes();
        if self.stride < row_bytes {
            return Err(FrameError::StrideTooSmall {
                stride: self.stride,
                row_bytes,
            });
        }
        let expected = self
            .stride
            .checked_mul(self.height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or(FrameError::LayoutOverflow {
                stride: self.stride,
                height: self.height,
            })?;
        if self.data.len() < expected {
            return Err(FrameError::BufferTooSmall {
                got: self.data.len(),
                expected,
            });
        }
        Ok(())
    }

    /// Visible bytes of row `y`, padding excluded.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }
}

// MARK: - Texture description

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 32-bit BGRA, the layout every capture backend delivers.
    #[default]
    Bgra8,
    Rgba8,
    Rgb8,
    R8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra8 | Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::R8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bgra8 => "BGRA8",
            Self::Rgba8 => "RGBA8",
            Self::Rgb8 => "RGB8",
            Self::R8 => "R8",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureUsage {
    /// CPU write, GPU read. Used for capture uploads.
    #[default]
    Dynamic,
    Static,
    RenderTarget,
}

impl TextureUsage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dynamic => "Dynamic",
            Self::Static => "Static",
            Self::RenderTarget => "RenderTarget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub generate_mips: bool,
}

impl TextureDesc {
    /// BGRA8 dynamic texture sized to a captured frame.
    pub fn for_frame(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(id: &str, primary: bool) -> Monitor {
        Monitor {
            id: SourceId::new(id),
            name: format!("\\\\.\\DISPLAY{id}"),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            is_primary: primary,
            dpi_scale: 1.0,
        }
    }

    fn window(id: &str, w: u32, h: u32, minimized: bool) -> WindowInfo {
        WindowInfo {
            id: SourceId::new(id),
            title: "Notes".into(),
            process_name: "notes.exe".into(),
            process_id: 42,
            x: 10,
            y: 10,
            width: w,
            height: h,
            is_visible: true,
            is_minimized: minimized,
        }
    }

    #[test]
    fn sources_list_monitors_then_capturable_windows() {
        let monitors = [monitor("1", true), monitor("2", false)];
        let windows = [
            window("10", 800, 600, false),
            window("11", 800, 600, true),
            window("12", 100, 600, false),
        ];

        let sources = collect_sources(&monitors, &windows);
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["\\\\.\\DISPLAY1 (Primary)", "\\\\.\\DISPLAY2", "Notes - notes.exe"]
        );
        assert!(sources[0].is_monitor);
        assert!(!sources[2].is_monitor);
    }

    #[test]
    fn padded_frame_validates_and_exposes_visible_rows() {
        let data = vec![0u8; 416 * 50];
        let frame = FrameData { data: &data, width: 100, height: 50, stride: 416, timestamp_ms: 0 };
        assert!(frame.validate().is_ok());
        assert!(!frame.is_tightly_packed());
        assert_eq!(frame.row(49).len(), 400);
    }

    #[test]
    fn last_row_does_not_need_padding() {
        let data = vec![0u8; 416 * 49 + 400];
        let frame = FrameData { data: &data, width: 100, height: 50, stride: 416, timestamp_ms: 0 };
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn short_or_malformed_frames_are_rejected() {
        let data = vec![0u8; 100];
        let empty = FrameData { data: &data, width: 0, height: 5, stride: 0, timestamp_ms: 0 };
        assert_eq!(empty.validate(), Err(FrameError::EmptyFrame));

        let narrow = FrameData { data: &data, width: 10, height: 1, stride: 8, timestamp_ms: 0 };
        assert!(matches!(narrow.validate(), Err(FrameError::StrideTooSmall { .. })));

        let short = FrameData { data: &data, width: 10, height: 4, stride: 40, timestamp_ms: 0 };
        assert_eq!(
            short.validate(),
            Err(FrameError::BufferTooSmall { got: 100, expected: 160 })
        );

        let huge = FrameData { data: &data, width: 10, height: 3, stride: usize::MAX, timestamp_ms: 0 };
        assert_eq!(
            huge.validate(),
            Err(FrameError::LayoutOverflow { stride: usize::MAX, height: 3 })
        );
    }

    #[test]
    fn frame_interval_follows_target_fps() {
        let mut cfg = CaptureConfig::default();
        assert_eq!(cfg.frame_interval(), Some(std::time::Duration::from_micros(33_333)));
        cfg.target_fps = 0;
        assert_eq!(cfg.frame_interval(), None);
        cfg.target_fps = 1000;
        assert!(cfg.validate().is_err());
    }
}
