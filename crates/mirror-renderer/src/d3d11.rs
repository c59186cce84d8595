//! Direct3D 11 texture target (Windows only).
//!
//! Textures are created `USAGE_DYNAMIC` + `CPU_ACCESS_WRITE` and bound as a
//! shader resource. Uploads map with `WRITE_DISCARD` and copy row by row into
//! the driver-chosen `RowPitch`.

use mirror_core::{pixels, TextureDesc, TextureError, TextureFormat, TextureUsage};
use tracing::debug;
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::{
    Direct3D::D3D_DRIVER_TYPE_HARDWARE,
    Direct3D11::{
        D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11ShaderResourceView,
        ID3D11Texture2D, D3D11_BIND_RENDER_TARGET, D3D11_BIND_SHADER_RESOURCE,
        D3D11_CPU_ACCESS_WRITE, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
        D3D11_MAP_WRITE_DISCARD, D3D11_RESOURCE_MISC_GENERATE_MIPS, D3D11_SDK_VERSION,
        D3D11_TEXTURE2D_DESC, D3D11_USAGE, D3D11_USAGE_DEFAULT, D3D11_USAGE_DYNAMIC,
    },
    Dxgi::{
        Common::{
            DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R8G8B8A8_UNORM,
            DXGI_FORMAT_R8_UNORM, DXGI_SAMPLE_DESC,
        },
        IDXGIDevice,
    },
};

use crate::texture::{check_desc, check_update, Texture};

// ── D3D11Device ───────────────────────────────────────────────────────────────

/// Shared `ID3D11Device`.
#[derive(Clone)]
pub struct D3D11Device(ID3D11Device);

// SAFETY: ID3D11Device is free-threaded. Immediate-context access is
// serialised by the TextureSink mutex and the capture callback.
unsafe impl Send for D3D11Device {}
unsafe impl Sync for D3D11Device {}

impl D3D11Device {
    /// Create a hardware device with BGRA support, as WGC requires.
    pub fn create_hardware() -> Result<Self, TextureError> {
        let mut device: Option<ID3D11Device> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                None,
            )
            .map_err(|e| TextureError::Backend {
                reason: format!("D3D11CreateDevice: {e}"),
            })?;
        }
        device.map(Self).ok_or(TextureError::NoDevice)
    }

    pub fn from_raw(device: ID3D11Device) -> Self {
        Self(device)
    }

    pub fn raw(&self) -> &ID3D11Device {
        &self.0
    }

    /// WGC needs the device to expose `IDXGIDevice`.
    pub fn validate(&self) -> Result<(), TextureError> {
        self.0
            .cast::<IDXGIDevice>()
            .map(|_| ())
            .map_err(|e| TextureError::InvalidDevice {
                reason: format!("not a DXGI device: {e}"),
            })
    }

    fn immediate_context(&self) -> Result<ID3D11DeviceContext, TextureError> {
        let mut ctx: Option<ID3D11DeviceContext> = None;
        unsafe { self.0.GetImmediateContext(&mut ctx) };
        ctx.ok_or(TextureError::NoDevice)
    }
}

// ── D3D11Texture ──────────────────────────────────────────────────────────────

pub struct D3D11Texture {
    device:  D3D11Device,
    context: Option<ID3D11DeviceContext>,
    texture: Option<ID3D11Texture2D>,
    srv:     Option<ID3D11ShaderResourceView>,
    desc:    Option<TextureDesc>,
}

// SAFETY: see D3D11Device; the texture is only touched by its owner.
unsafe impl Send for D3D11Texture {}

impl D3D11Texture {
    pub fn new(device: D3D11Device) -> Self {
        Self {
            device,
            context: None,
            texture: None,
            srv: None,
            desc: None,
        }
    }

    pub fn shader_resource_view(&self) -> Option<&ID3D11ShaderResourceView> {
        self.srv.as_ref()
    }
}

fn dxgi_format(format: TextureFormat) -> Result<DXGI_FORMAT, TextureError> {
    match format {
        TextureFormat::Bgra8 => Ok(DXGI_FORMAT_B8G8R8A8_UNORM),
        TextureFormat::Rgba8 => Ok(DXGI_FORMAT_R8G8B8A8_UNORM),
        TextureFormat::R8 => Ok(DXGI_FORMAT_R8_UNORM),
        TextureFormat::Rgb8 => Err(TextureError::UnsupportedFormat {
            format: format.name(),
            backend: "Direct3D11",
        }),
    }
}

fn usage_flags(usage: TextureUsage) -> (D3D11_USAGE, u32, u32) {
    match usage {
        TextureUsage::Dynamic => (
            D3D11_USAGE_DYNAMIC,
            D3D11_BIND_SHADER_RESOURCE.0 as u32,
            D3D11_CPU_ACCESS_WRITE.0 as u32,
        ),
        TextureUsage::Static => (D3D11_USAGE_DEFAULT, D3D11_BIND_SHADER_RESOURCE.0 as u32, 0),
        TextureUsage::RenderTarget => (
            D3D11_USAGE_DEFAULT,
            (D3D11_BIND_SHADER_RESOURCE.0 | D3D11_BIND_RENDER_TARGET.0) as u32,
            0,
        ),
    }
}

impl Texture for D3D11Texture {
    fn create(&mut self, desc: &TextureDesc) -> Result<(), TextureError> {
        check_desc(desc)?;
        self.destroy();

        let (usage, bind, cpu) = usage_flags(desc.usage);
        // Mip generation needs a render-target binding and a full chain.
        let mips = desc.generate_mips && desc.usage == TextureUsage::RenderTarget;
        let tex_desc = D3D11_TEXTURE2D_DESC {
            Width:          desc.width,
            Height:         desc.height,
            MipLevels:      if mips { 0 } else { 1 },
            ArraySize:      1,
            Format:         dxgi_format(desc.format)?,
            SampleDesc:     DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage:          usage,
            BindFlags:      bind,
            CPUAccessFlags: cpu,
            MiscFlags:      if mips { D3D11_RESOURCE_MISC_GENERATE_MIPS.0 as u32 } else { 0 },
        };

        let device = self.device.raw();
        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { device.CreateTexture2D(&tex_desc, None, Some(&mut texture)) }.map_err(|e| {
            TextureError::Backend {
                reason: format!("CreateTexture2D {}x{}: {e}", desc.width, desc.height),
            }
        })?;
        let texture = texture.ok_or(TextureError::NotCreated)?;

        let mut srv: Option<ID3D11ShaderResourceView> = None;
        unsafe { device.CreateShaderResourceView(&texture, None, Some(&mut srv)) }.map_err(
            |e| TextureError::Backend {
                reason: format!("CreateShaderResourceView: {e}"),
            },
        )?;

        self.context = Some(self.device.immediate_context()?);
        self.texture = Some(texture);
        self.srv = srv;
        self.desc = Some(*desc);
        debug!("D3D11 texture {}x{} {}", desc.width, desc.height, desc.format.name());
        Ok(())
    }

    fn update(&mut self, data: &[u8], row_pitch: usize) -> Result<(), TextureError> {
        let src_pitch = check_update(self.desc.as_ref(), data, row_pitch)?;
        let (Some(desc), Some(texture), Some(context)) =
            (self.desc, self.texture.as_ref(), self.context.as_ref())
        else {
            return Err(TextureError::NotCreated);
        };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { context.Map(texture, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped)) }
            .map_err(|e| TextureError::Backend {
                reason: format!("Map: {e}"),
            })?;

        let height = desc.height as usize;
        let dst_pitch = mapped.RowPitch as usize;
        // SAFETY: a successful WRITE_DISCARD map exposes RowPitch * height
        // writable bytes until Unmap.
        let dst = unsafe {
            std::slice::from_raw_parts_mut(mapped.pData as *mut u8, dst_pitch * height)
        };
        let result = pixels::copy_rows(data, src_pitch, dst, dst_pitch, desc.row_bytes(), height);
        unsafe { context.Unmap(texture, 0) };
        result
    }

    fn destroy(&mut self) {
        self.srv = None;
        self.texture = None;
        self.context = None;
        self.desc = None;
    }

    fn desc(&self) -> Option<&TextureDesc> {
        self.desc.as_ref()
    }

    fn platform_name(&self) -> &'static str {
        "Direct3D11"
    }
}
