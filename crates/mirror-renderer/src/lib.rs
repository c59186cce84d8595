//! Texture upload for captured frames.
//!
//! ```text
//!   FrameData ──▶ TextureSink ──▶ Box<dyn Texture>
//!                   (mutex)        ├─ SoftwareTexture   (host memory, aligned pitch)
//!                                  ├─ EguiTexture       (egui::TextureHandle)
//!                                  └─ D3D11Texture      (Windows, dynamic + SRV)
//! ```
//!
//! The sink owns the single texture that mirrors the active capture and
//! recreates it whenever the frame size changes.

pub mod device;
pub mod egui_texture;
pub mod sink;
pub mod software;
pub mod texture;

#[cfg(target_os = "windows")]
pub mod d3d11;

pub use device::{DeviceHandle, SoftwareDevice};
pub use egui_texture::EguiTexture;
pub use sink::{SinkStats, TextureSink};
pub use software::SoftwareTexture;
pub use texture::{create_texture, Texture};

#[cfg(target_os = "windows")]
pub use d3d11::{D3D11Device, D3D11Texture};
