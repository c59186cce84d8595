use mirror_core::TextureError;

/// Default row alignment of [`SoftwareDevice`], matching common GPU upload pitch.
pub const DEFAULT_ROW_ALIGNMENT: usize = 256;

/// Host-memory "device": textures live in a `Vec<u8>` with aligned row pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareDevice {
    pub row_alignment: usize,
}

impl SoftwareDevice {
    pub fn new(row_alignment: usize) -> Self {
        Self { row_alignment }
    }

    /// Rows are stored without padding.
    pub fn tight() -> Self {
        Self { row_alignment: 1 }
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_ALIGNMENT)
    }
}

// MARK: - DeviceHandle

/// Opaque handle to the graphics device textures are created on.
///
/// Cheap to clone; capture backends and the texture sink share one handle.
#[derive(Clone)]
pub enum DeviceHandle {
    Software(SoftwareDevice),
    /// Textures are registered with an egui context and drawn by the app.
    Egui(egui::Context),
    #[cfg(target_os = "windows")]
    D3D11(crate::d3d11::D3D11Device),
}

impl DeviceHandle {
    /// Check the handle is usable for texture creation.
    pub fn validate(&self) -> Result<(), TextureError> {
        match self {
            Self::Software(dev) => {
                if dev.row_alignment == 0 || !dev.row_alignment.is_power_of_two() {
                    return Err(TextureError::InvalidDevice {
                        reason: format!(
                            "row alignment {} is not a power of two",
                            dev.row_alignment
                        ),
                    });
                }
                Ok(())
            }
            Self::Egui(_) => Ok(()),
            #[cfg(target_os = "windows")]
            Self::D3D11(dev) => dev.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Software(_) => "software",
            Self::Egui(_) => "egui",
            #[cfg(target_os = "windows")]
            Self::D3D11(_) => "d3d11",
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Software(dev) => f.debug_tuple("Software").field(dev).finish(),
            other => write!(f, "DeviceHandle::{}", other.kind()),
        }
    }
}

impl From<SoftwareDevice> for DeviceHandle {
    fn from(dev: SoftwareDevice) -> Self {
        Self::Software(dev)
    }
}

impl From<egui::Context> for DeviceHandle {
    fn from(ctx: egui::Context) -> Self {
        Self::Egui(ctx)
    }
}
