use egui::{Color32, ColorImage, TextureHandle, TextureOptions};
use mirror_core::{pixels, TextureDesc, TextureError, TextureFormat};

use crate::texture::{check_desc, check_update, Texture};

const TEXTURE_NAME: &str = "capture-mirror";

/// Texture registered with an egui context.
///
/// Uploads are staged as tight BGRA and converted to opaque `Color32`; the
/// alpha channel of desktop captures carries no meaning.
pub struct EguiTexture {
    ctx:     egui::Context,
    handle:  Option<TextureHandle>,
    desc:    Option<TextureDesc>,
    staging: Vec<u8>,
}

impl EguiTexture {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            handle: None,
            desc: None,
            staging: Vec::new(),
        }
    }

    pub fn handle(&self) -> Option<&TextureHandle> {
        self.handle.as_ref()
    }

    fn to_image(&self, desc: &TextureDesc) -> ColorImage {
        let size = [desc.width as usize, desc.height as usize];
        let pixels = match desc.format {
            TextureFormat::Rgba8 => self
                .staging
                .chunks_exact(4)
                .map(|p| Color32::from_rgb(p[0], p[1], p[2]))
                .collect(),
            _ => self
                .staging
                .chunks_exact(4)
                .map(|p| Color32::from_rgb(p[2], p[1], p[0]))
                .collect(),
        };
        ColorImage { size, pixels }
    }
}

impl Texture for EguiTexture {
    fn create(&mut self, desc: &TextureDesc) -> Result<(), TextureError> {
        check_desc(desc)?;
        if !matches!(desc.format, TextureFormat::Bgra8 | TextureFormat::Rgba8) {
            return Err(TextureError::UnsupportedFormat {
                format: desc.format.name(),
                backend: "egui",
            });
        }
        self.staging = vec![0; desc.row_bytes() * desc.height as usize];
        let blank = ColorImage::new([desc.width as usize, desc.height as usize], Color32::BLACK);
        self.handle = Some(self.ctx.load_texture(TEXTURE_NAME, blank, TextureOptions::LINEAR));
        self.desc = Some(*desc);
        Ok(())
    }

    fn update(&mut self, data: &[u8], row_pitch: usize) -> Result<(), TextureError> {
        let src_pitch = check_update(self.desc.as_ref(), data, row_pitch)?;
        let desc = self.desc.ok_or(TextureError::NotCreated)?;
        let row_bytes = desc.row_bytes();
        pixels::copy_rows(
            data,
            src_pitch,
            &mut self.staging,
            row_bytes,
            row_bytes,
            desc.height as usize,
        )?;

        let image = self.to_image(&desc);
        let handle = self.handle.as_mut().ok_or(TextureError::NotCreated)?;
        handle.set(image, TextureOptions::LINEAR);
        self.ctx.request_repaint();
        Ok(())
    }

    fn destroy(&mut self) {
        // Dropping the last handle frees the egui texture.
        self.handle = None;
        self.desc = None;
        self.staging = Vec::new();
    }

    fn desc(&self) -> Option<&TextureDesc> {
        self.desc.as_ref()
    }

    fn platform_name(&self) -> &'static str {
        "egui"
    }

    fn texture_id(&self) -> Option<egui::TextureId> {
        self.handle.as_ref().map(TextureHandle::id)
    }

    fn read_back(&self) -> Option<Vec<u8>> {
        self.desc.map(|_| self.staging.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_registers_texture_and_keeps_bgra_staging() {
        let mut tex = EguiTexture::new(egui::Context::default());
        tex.create(&TextureDesc::for_frame(2, 2)).unwrap();
        assert!(tex.texture_id().is_some());

        // Row stride 12 for 8 visible bytes.
        let frame = [
            1, 2, 3, 255, 4, 5, 6, 255, 0xAB, 0xAB, 0xAB, 0xAB, //
            7, 8, 9, 255, 10, 11, 12, 255,
        ];
        tex.update(&frame, 12).unwrap();
        assert_eq!(
            tex.read_back().unwrap(),
            vec![1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 255, 10, 11, 12, 255]
        );

        let image = tex.to_image(&TextureDesc::for_frame(2, 2));
        assert_eq!(image.pixels[0], Color32::from_rgb(3, 2, 1));
    }

    #[test]
    fn create_then_update_is_valid_for_any_size() {
        let ctx = egui::Context::default();
        for (w, h) in [(1, 1), (3, 7), (257, 3), (1920, 1)] {
            let mut tex = EguiTexture::new(ctx.clone());
            tex.create(&TextureDesc::for_frame(w, h)).unwrap();
            let data = vec![0x40u8; w as usize * h as usize * 4];
            tex.update(&data, 0).unwrap();
            assert!(tex.is_valid(), "{w}x{h}");
            assert_eq!((tex.width(), tex.height()), (w, h));
            assert!(tex.texture_id().is_some());
        }
    }

    #[test]
    fn single_channel_formats_are_rejected() {
        let mut tex = EguiTexture::new(egui::Context::default());
        let desc = TextureDesc {
            format: TextureFormat::R8,
            ..TextureDesc::for_frame(8, 8)
        };
        assert!(matches!(
            tex.create(&desc),
            Err(TextureError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn destroy_releases_handle() {
        let mut tex = EguiTexture::new(egui::Context::default());
        tex.create(&TextureDesc::for_frame(4, 4)).unwrap();
        tex.destroy();
        assert!(tex.texture_id().is_none());
        assert!(!tex.is_valid());
    }
}
