use mirror_core::{pixels, TextureDesc, TextureError, TextureFormat, TextureUsage};

use crate::device::DeviceHandle;
use crate::egui_texture::EguiTexture;
use crate::software::SoftwareTexture;

// MARK: - Texture trait

/// A GPU-side (or host-side) 2D texture that captured frames are uploaded into.
///
/// Lifecycle: `create` → any number of `update` → `destroy`. Calling `create`
/// on a live texture replaces it.
pub trait Texture: Send {
    fn create(&mut self, desc: &TextureDesc) -> Result<(), TextureError>;

    /// Upload `data`, whose rows are `row_pitch` bytes apart (0 = tightly packed).
    fn update(&mut self, data: &[u8], row_pitch: usize) -> Result<(), TextureError>;

    fn destroy(&mut self);

    /// Description of the live texture, `None` before `create` / after `destroy`.
    fn desc(&self) -> Option<&TextureDesc>;

    fn platform_name(&self) -> &'static str;

    fn width(&self) -> u32 {
        self.desc().map_or(0, |d| d.width)
    }

    fn height(&self) -> u32 {
        self.desc().map_or(0, |d| d.height)
    }

    fn format(&self) -> TextureFormat {
        self.desc().map_or_else(TextureFormat::default, |d| d.format)
    }

    fn is_valid(&self) -> bool {
        self.desc().is_some()
    }

    /// Handle the UI can draw, for textures registered with egui.
    fn texture_id(&self) -> Option<egui::TextureId> {
        None
    }

    /// Tightly packed copy of the current contents, where the backend keeps one.
    fn read_back(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Build an empty texture for `device`. Call [`Texture::create`] before use.
pub fn create_texture(device: &DeviceHandle) -> Box<dyn Texture> {
    match device {
        DeviceHandle::Software(dev) => Box::new(SoftwareTexture::new(dev.row_alignment)),
        DeviceHandle::Egui(ctx) => Box::new(EguiTexture::new(ctx.clone())),
        #[cfg(target_os = "windows")]
        DeviceHandle::D3D11(dev) => Box::new(crate::d3d11::D3D11Texture::new(dev.clone())),
    }
}

// ── Shared checks ─────────────────────────────────────────────────────────────

pub(crate) fn check_desc(desc: &TextureDesc) -> Result<(), TextureError> {
    if desc.width == 0 || desc.height == 0 {
        return Err(TextureError::InvalidDimensions {
            width: desc.width,
            height: desc.height,
        });
    }
    Ok(())
}

/// Validate an upload against `desc`; returns the effective source pitch.
pub(crate) fn check_update(
    desc: Option<&TextureDesc>,
    data: &[u8],
    row_pitch: usize,
) -> Result<usize, TextureError> {
    let desc = desc.ok_or(TextureError::NotCreated)?;
    if desc.usage != TextureUsage::Dynamic {
        return Err(TextureError::NotDynamic);
    }
    let row_bytes = desc.row_bytes();
    let pitch = if row_pitch == 0 { row_bytes } else { row_pitch };
    if pitch < row_bytes {
        return Err(TextureError::PitchTooSmall { pitch, row_bytes });
    }
    let expected = pixels::required_len(pitch, row_bytes, desc.height as usize);
    if data.len() < expected {
        return Err(TextureError::DataTooSmall {
            got: data.len(),
            expected,
        });
    }
    Ok(pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    #[test]
    fn update_checks_run_in_order() {
        let desc = TextureDesc::for_frame(10, 2);
        assert_eq!(check_update(None, &[], 0), Err(TextureError::NotCreated));
        assert_eq!(check_update(Some(&desc), &[0; 80], 0), Ok(40));
        assert_eq!(
            check_update(Some(&desc), &[0; 80], 20),
            Err(TextureError::PitchTooSmall { pitch: 20, row_bytes: 40 })
        );
        assert_eq!(
            check_update(Some(&desc), &[0; 50], 48),
            Err(TextureError::DataTooSmall { got: 50, expected: 88 })
        );

        let fixed = TextureDesc { usage: TextureUsage::Static, ..desc };
        assert_eq!(check_update(Some(&fixed), &[0; 80], 0), Err(TextureError::NotDynamic));
    }

    #[test]
    fn factory_picks_backend_from_device() {
        let tex = create_texture(&SoftwareDevice::default().into());
        assert_eq!(tex.platform_name(), "Software");
        assert!(!tex.is_valid());
        assert_eq!((tex.width(), tex.height()), (0, 0));

        let tex = create_texture(&egui::Context::default().into());
        assert_eq!(tex.platform_name(), "egui");
    }
}
