use std::sync::Mutex;

use mirror_core::{FrameData, TextureDesc, TextureError};
use tracing::{info, warn};

use crate::device::DeviceHandle;
use crate::texture::{create_texture, Texture};

/// Upload counters for the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub uploads:     u64,
    pub failures:    u64,
    pub recreations: u64,
    pub width:       u32,
    pub height:      u32,
}

struct SinkInner {
    texture: Option<Box<dyn Texture>>,
    stats:   SinkStats,
}

/// Keeps one texture in sync with the frames of the active capture.
///
/// The frame callback (capture thread) uploads and the UI thread draws; both
/// go through the same mutex, so a texture is never read mid-upload.
pub struct TextureSink {
    device: DeviceHandle,
    inner:  Mutex<SinkInner>,
}

impl TextureSink {
    /// Fails if the device cannot create textures.
    pub fn new(device: DeviceHandle) -> Result<Self, TextureError> {
        device.validate()?;
        Ok(Self {
            device,
            inner: Mutex::new(SinkInner {
                texture: None,
                stats:   SinkStats::default(),
            }),
        })
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Frame-callback entry point. Errors are logged; the previous texture
    /// stays valid.
    pub fn on_frame(&self, frame: &FrameData<'_>) {
        if let Err(e) = self.upload(frame) {
            warn!("Frame upload {}x{} failed: {e}", frame.width, frame.height);
        }
    }

    /// Upload `frame`, recreating the texture if its size changed.
    pub fn upload(&self, frame: &FrameData<'_>) -> Result<(), TextureError> {
        let mut inner = self.lock();
        let result = Self::upload_locked(&self.device, &mut inner, frame);
        match &result {
            Ok(()) => inner.stats.uploads += 1,
            Err(_) => inner.stats.failures += 1,
        }
        result
    }

    fn upload_locked(
        device: &DeviceHandle,
        inner: &mut SinkInner,
        frame: &FrameData<'_>,
    ) -> Result<(), TextureError> {
        frame.validate()?;

        let same_size = inner
            .texture
            .as_ref()
            .is_some_and(|t| t.width() == frame.width && t.height() == frame.height);
        if let (true, Some(texture)) = (same_size, inner.texture.as_mut()) {
            return texture.update(frame.data, frame.stride);
        }

        // Build and fill the replacement before swapping it in.
        let mut fresh = create_texture(device);
        fresh.create(&TextureDesc::for_frame(frame.width, frame.height))?;
        fresh.update(frame.data, frame.stride)?;
        info!(
            "Texture created {}x{} ({})",
            frame.width,
            frame.height,
            fresh.platform_name()
        );

        if let Some(mut old) = inner.texture.replace(fresh) {
            old.destroy();
            inner.stats.recreations += 1;
        }
        inner.stats.width = frame.width;
        inner.stats.height = frame.height;
        Ok(())
    }

    /// Run `f` against the current texture while holding the sink lock.
    pub fn with_texture<R>(&self, f: impl FnOnce(Option<&dyn Texture>) -> R) -> R {
        let inner = self.lock();
        f(inner.texture.as_deref())
    }

    pub fn has_texture(&self) -> bool {
        self.lock().texture.is_some()
    }

    pub fn stats(&self) -> SinkStats {
        self.lock().stats
    }

    /// Drop the current texture; the next frame creates a new one.
    pub fn release(&self) {
        let mut inner = self.lock();
        if let Some(mut texture) = inner.texture.take() {
            texture.destroy();
        }
        inner.stats.width = 0;
        inner.stats.height = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
