//! ScreenMirror: capture a monitor or window and show it live.
//!
//! ```text
//!   GraphicsCapture (OS thread) ──FrameData──▶ TextureSink ──▶ egui texture
//!          ▲                                                      │
//!          └──── start / stop / settings ◀── MirrorApp (UI) ◀─────┘
//! ```

mod app;
mod state;
mod theme;

use anyhow::anyhow;
use mirror_core::MirrorConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    info!("ScreenMirror v{}", env!("CARGO_PKG_VERSION"));
    let config = MirrorConfig::load();
    info!(
        "Backend {} | {} quality | {} fps | cursor {} | borders {}",
        config.backend,
        config.capture.quality.label(),
        config.capture.target_fps,
        config.capture.include_cursor,
        config.capture.include_borders
    );

    // ── Window options ────────────────────────────────────────────────────
    let window_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("ScreenMirror")
            .with_inner_size([config.window.width, config.window.height])
            .with_min_inner_size([720.0, 480.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "ScreenMirror",
        window_options,
        Box::new(move |cc| Ok(Box::new(app::MirrorApp::new(cc, config)))),
    )
    .map_err(|e| anyhow!("eframe: {e}"))
}
