//! Screen capture behind one interface.
//!
//! ```text
//!   create(kind) ──▶ Box<dyn GraphicsCapture>
//!                        │  Capturer<B: CaptureBackend>   (state machine, stats, callback slot)
//!                        ▼
//!   WgcBackend (Windows) │ SyntheticBackend (generated) │ UnsupportedBackend
//!           │ OS / worker thread
//!           ▼
//!   FrameDispatcher::deliver ──▶ FrameCallback(&FrameData)  e.g. TextureSink::on_frame
//! ```
//!
//! `FrameData` borrows the backend's buffer, so a callback has to copy what it
//! needs before returning.

pub mod backend;
pub mod capture;
pub mod capturer;
pub mod dispatch;
pub mod platform;

pub use backend::{ActiveCapture, CaptureBackend, CaptureTarget, TargetKind};
pub use capture::{CaptureState, GraphicsCapture};
pub use capturer::Capturer;
pub use dispatch::{Delivery, DropReason, FrameCallback, FrameDispatcher};
pub use platform::{create, current_platform, Pacing, SyntheticBackend, SyntheticDesktop};
