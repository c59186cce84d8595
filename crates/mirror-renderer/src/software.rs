use mirror_core::{pixels, TextureDesc, TextureError};
use tracing::debug;

use crate::texture::{check_desc, check_update, Texture};

/// Texture backed by host memory with an aligned row pitch.
///
/// Stands in for a mapped GPU resource: `pitch >= width * bpp`, and bytes
/// past the visible row are never written by an upload.
#[derive(Debug)]
pub struct SoftwareTexture {
    alignment: usize,
    desc:      Option<TextureDesc>,
    pitch:     usize,
    memory:    Vec<u8>,
}

impl SoftwareTexture {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment: alignment.max(1),
            desc:      None,
            pitch:     0,
            memory:    Vec::new(),
        }
    }

    /// Destination row pitch in bytes.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Raw texture memory, `pitch * height` bytes.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }
}

impl Texture for SoftwareTexture {
    fn create(&mut self, desc: &TextureDesc) -> Result<(), TextureError> {
        check_desc(desc)?;
        let pitch = pixels::align_up(desc.row_bytes(), self.alignment);
        self.memory = vec![0; pitch * desc.height as usize];
        self.pitch = pitch;
        self.desc = Some(*desc);
        debug!(
            "Software texture {}x{} {} pitch {}",
            desc.width,
            desc.height,
            desc.format.name(),
            pitch
        );
        Ok(())
    }

    fn update(&mut self, data: &[u8], row_pitch: usize) -> Result<(), TextureError> {
        let src_pitch = check_update(self.desc.as_ref(), data, row_pitch)?;
        let desc = self.desc.ok_or(TextureError::NotCreated)?;
        pixels::copy_rows(
            data,
            src_pitch,
            &mut self.memory,
            self.pitch,
            desc.row_bytes(),
            desc.height as usize,
        )
    }

    fn destroy(&mut self) {
        self.desc = None;
        self.pitch = 0;
        self.memory = Vec::new();
    }

    fn desc(&self) -> Option<&TextureDesc> {
        self.desc.as_ref()
    }

    fn platform_name(&self) -> &'static str {
        "Software"
    }

    fn read_back(&self) -> Option<Vec<u8>> {
        let desc = self.desc?;
        let row_bytes = desc.row_bytes();
        let mut out = vec![0; row_bytes * desc.height as usize];
        pixels::copy_rows(
            &self.memory,
            self.pitch,
            &mut out,
            row_bytes,
            row_bytes,
            desc.height as usize,
        )
        .ok()?;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTINEL: u8 = 0xAB;

    fn padded(width: usize, height: usize, stride: usize) -> Vec<u8> {
        let mut buf = vec![SENTINEL; stride * height];
        for y in 0..height {
            for x in 0..width * 4 {
                buf[y * stride + x] = (x % 97) as u8;
            }
        }
        buf
    }

    #[test]
    fn create_then_update_is_valid_for_any_size() {
        for (w, h) in [(1, 1), (3, 7), (257, 3), (1920, 1)] {
            let mut tex = SoftwareTexture::new(256);
            tex.create(&TextureDesc::for_frame(w, h)).unwrap();
            let data = vec![0x40u8; w as usize * h as usize * 4];
            tex.update(&data, 0).unwrap();
            assert!(tex.is_valid(), "{w}x{h}");
            assert_eq!((tex.width(), tex.height()), (w, h));
            assert_eq!(tex.read_back().unwrap(), data);
        }
    }

    #[test]
    fn create_rejects_zero_dimensions() {
        let mut tex = SoftwareTexture::new(256);
        assert_eq!(
            tex.create(&TextureDesc::for_frame(0, 10)),
            Err(TextureError::InvalidDimensions { width: 0, height: 10 })
        );
        assert!(!tex.is_valid());
    }

    #[test]
    fn padded_frame_lands_in_aligned_pitch_without_padding_bytes() {
        let mut tex = SoftwareTexture::new(256);
        tex.create(&TextureDesc::for_frame(100, 50)).unwrap();
        assert_eq!(tex.pitch(), 512);

        let frame = padded(100, 50, 416);
        tex.update(&frame, 416).unwrap();

        assert!(!tex.memory().contains(&SENTINEL));
        let tight = tex.read_back().unwrap();
        for y in 0..50 {
            assert_eq!(&tight[y * 400..(y + 1) * 400], &frame[y * 416..y * 416 + 400]);
        }
    }

    #[test]
    fn tight_pitch_texture() {
        let mut tex = SoftwareTexture::new(1);
        tex.create(&TextureDesc::for_frame(100, 50)).unwrap();
        assert_eq!(tex.pitch(), 400);
        tex.update(&padded(100, 50, 416), 416).unwrap();
        assert!(!tex.memory().contains(&SENTINEL));
    }

    #[test]
    fn destroy_then_update_fails() {
        let mut tex = SoftwareTexture::new(4);
        tex.create(&TextureDesc::for_frame(4, 4)).unwrap();
        tex.destroy();
        assert_eq!(tex.update(&[0; 64], 0), Err(TextureError::NotCreated));
        assert!(tex.read_back().is_none());
    }
}
