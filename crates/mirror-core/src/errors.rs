use thiserror::Error;

/// Session-level failures returned by the capture abstraction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Screen capture is not supported on {platform}")]
    Unsupported { platform: String },

    #[error("Capture backend not initialized")]
    NotInitialized,

    #[error("Invalid GPU device: {reason}")]
    InvalidDevice { reason: String },

    #[error("Capture source not found: {id}")]
    SourceNotFound { id: String },

    #[error("A capture session is already running")]
    AlreadyCapturing,

    #[error("No capture session is running")]
    NotCapturing,

    #[error("Capture config cannot change while capturing")]
    ConfigFrozen,

    #[error("Capture config invalid: {reason}")]
    InvalidConfig { reason: String },

    #[error("Capture backend has been shut down")]
    ShutDown,

    #[error("Not implemented yet: {feature}")]
    NotImplemented { feature: String },

    #[error("{context}: {reason}")]
    Backend { context: String, reason: String },
}

impl CaptureError {
    pub fn backend(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    #[error("Invalid texture dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("No GPU device available for texture creation")]
    NoDevice,

    #[error("Invalid GPU device: {reason}")]
    InvalidDevice { reason: String },

    #[error("Unsupported texture format {format} for {backend}")]
    UnsupportedFormat { format: &'static str, backend: &'static str },

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),

    #[error("Texture has not been created")]
    NotCreated,

    #[error("Cannot update a non-dynamic texture")]
    NotDynamic,

    #[error("Data size too small: got {got}, expected {expected}")]
    DataTooSmall { got: usize, expected: usize },

    #[error("Row pitch {pitch} is smaller than a row ({row_bytes} bytes)")]
    PitchTooSmall { pitch: usize, row_bytes: usize },

    #[error("Texture backend error: {reason}")]
    Backend { reason: String },
}

/// Rejections raised when a delivered frame does not describe its own buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has zero width or height")]
    EmptyFrame,

    #[error("Stride {stride} is smaller than a packed row ({row_bytes} bytes)")]
    StrideTooSmall { stride: usize, row_bytes: usize },

    #[error("Frame buffer holds {got} bytes, {expected} required")]
    BufferTooSmall { got: usize, expected: usize },

    #[error("Frame layout overflows: stride {stride} x {height} rows")]
    LayoutOverflow { stride: usize, height: u32 },
}
