use std::sync::Arc;
use std::time::{Duration, Instant};

use egui::{
    Align, Color32, FontFamily, FontId, Frame, Layout, Margin, RichText, ScrollArea, Stroke, Vec2,
};
use mirror_capture::{current_platform, GraphicsCapture};
use mirror_core::{
    CaptureConfig, CaptureError, CaptureQuality, CaptureSource, FrameData, MirrorConfig, SourceId,
};
use mirror_renderer::{DeviceHandle, TextureSink};
use tracing::{error, info, warn};

use crate::state::{LogBuffer, Phase};
use crate::theme::{self, card, small, stat_chip, ACCENT, BG_INSET, BG_PANEL, TEXT_DIM, TEXT_NORM};

/// How often stats are repainted while nothing else triggers a frame.
const STATS_REPAINT: Duration = Duration::from_millis(250);

// ── App struct ────────────────────────────────────────────────────────────────

pub struct MirrorApp {
    capture:          Box<dyn GraphicsCapture>,
    sink:             Option<Arc<TextureSink>>,
    config:           MirrorConfig,
    /// Editable copy of the capture settings, applied while idle.
    settings:         CaptureConfig,
    phase:            Phase,
    logs:             LogBuffer,
    sources:          Vec<CaptureSource>,
    selected:         Option<SourceId>,
    last_refresh:     Option<Instant>,
    auto_scroll_logs: bool,
}

impl MirrorApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: MirrorConfig) -> Self {
        theme::apply(&cc.egui_ctx);

        let mut app = Self {
            capture:          mirror_capture::create(config.backend),
            sink:             None,
            settings:         config.capture.clone(),
            config,
            phase:            Phase::Idle,
            logs:             LogBuffer::default(),
            sources:          Vec::new(),
            selected:         None,
            last_refresh:     None,
            auto_scroll_logs: true,
        };
        app.logs.info(format!(
            "ScreenMirror on {} ({} backend)",
            current_platform(),
            app.config.backend
        ));

        // The renderer's device is shared by the sink and the capture backend.
        let device = DeviceHandle::Egui(cc.egui_ctx.clone());
        match TextureSink::new(device.clone()) {
            Ok(sink) => app.sink = Some(Arc::new(sink)),
            Err(e) => app.fail(format!("Texture sink unavailable: {e}")),
        }
        if let Err(e) = app.init_capture(device) {
            app.fail(format!("Capture unavailable: {e}"));
        }
        app.refresh_sources();
        app
    }

    fn init_capture(&mut self, device: DeviceHandle) -> Result<(), CaptureError> {
        self.capture.initialize()?;
        self.capture.set_device(device)?;
        self.capture.set_capture_config(self.settings.clone())?;
        if let Some(sink) = &self.sink {
            let sink = Arc::clone(sink);
            self.capture
                .set_frame_callback(Box::new(move |frame: &FrameData<'_>| sink.on_frame(frame)));
        }
        self.logs.info(format!(
            "{} capture ready",
            self.capture.platform_name()
        ));
        Ok(())
    }

    fn fail(&mut self, message: String) {
        error!("{message}");
        self.logs.error(&message);
        self.phase = Phase::Error(message);
    }

    // ── Actions ───────────────────────────────────────────────────────────

    fn refresh_sources(&mut self) {
        self.last_refresh = Some(Instant::now());
        if !self.capture.is_initialized() {
            return;
        }
        match self.capture.available_sources() {
            Ok(sources) => {
                if sources.len() != self.sources.len() {
                    info!("{} capture sources", sources.len());
                }
                self.sources = sources;
            }
            Err(e) => warn!("Source enumeration failed: {e}"),
        }
    }

    /// Switching is stop then start.
    fn start(&mut self, source: CaptureSource) {
        if self.capture.is_capturing() {
            self.stop();
        }
        match self.capture.start_capture(&source.id) {
            Ok(()) => {
                self.logs
                    .info(format!("Capturing {} ({}x{})", source.name, source.width, source.height));
                self.phase = Phase::Capturing {
                    source: source.name,
                };
            }
            Err(e @ CaptureError::SourceNotFound { .. }) => {
                self.logs.warn(format!("{} is gone: {e}", source.name));
                self.refresh_sources();
            }
            Err(e) => self.fail(format!("Start failed: {e}")),
        }
    }

    fn stop(&mut self) {
        self.capture.stop_capture();
        if let Some(sink) = &self.sink {
            sink.release();
        }
        if let Phase::Capturing { source } = &self.phase {
            self.logs.info(format!("Stopped {source}"));
        }
        self.phase = Phase::Idle;
    }

    fn apply_settings(&mut self) {
        match self.capture.set_capture_config(self.settings.clone()) {
            Ok(()) => self.logs.info(format!(
                "Settings: {} quality, {} fps, cursor {}, borders {}",
                self.settings.quality.label(),
                self.settings.target_fps,
                self.settings.include_cursor,
                self.settings.include_borders
            )),
            Err(e) => {
                self.logs.warn(format!("Settings rejected: {e}"));
                self.settings = self.capture.capture_config().clone();
            }
        }
    }

    fn screenshot(&mut self) {
        let Some(source) = self.capture.active_source().cloned() else {
            self.logs.warn("Screenshot: no active capture");
            return;
        };
        let path = std::path::Path::new("screenshot.png");
        match self.capture.save_screenshot(&source, path) {
            Ok(()) => self.logs.info(format!("Saved {}", path.display())),
            Err(e) => self.logs.warn(format!("Screenshot: {e}")),
        }
    }
}

// ── eframe::App implementation ────────────────────────────────────────────────

impl eframe::App for MirrorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let refresh = self.config.source_refresh();
        if self.last_refresh.map_or(true, |t| t.elapsed() >= refresh) {
            self.refresh_sources();
        }
        ctx.request_repaint_after(if self.capture.is_capturing() {
            STATS_REPAINT
        } else {
            refresh
        });

        egui::TopBottomPanel::top("header")
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::symmetric(8.0, 8.0)))
            .show(ctx, |ui| self.render_header(ui));

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::symmetric(8.0, 6.0)))
            .show(ctx, |ui| {
                self.render_sources(ui);
                ui.add_space(10.0);
                self.render_settings(ui);
                ui.add_space(10.0);
                self.render_stats(ui);
            });

        egui::TopBottomPanel::bottom("log")
            .resizable(true)
            .default_height(160.0)
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::symmetric(8.0, 6.0)))
            .show(ctx, |ui| self.render_log_panel(ui));

        egui::CentralPanel::default()
            .frame(Frame::none().fill(BG_INSET))
            .show(ctx, |ui| self.render_mirror(ui));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.capture.shutdown();
        if let Some(sink) = &self.sink {
            sink.release();
        }
        info!("ScreenMirror exiting");
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

impl MirrorApp {
    fn render_header(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(
                RichText::new("Screen")
                    .font(FontId::new(24.0, FontFamily::Proportional))
                    .strong()
                    .color(Color32::WHITE),
            );
            ui.label(
                RichText::new("Mirror")
                    .font(FontId::new(24.0, FontFamily::Proportional))
                    .color(ACCENT),
            );
            ui.add_space(16.0);

            let (rect, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
            ui.painter().circle_filled(rect.center(), 5.0, self.phase.color());
            ui.label(RichText::new(self.phase.label()).strong().color(TEXT_NORM));
            match &self.phase {
                Phase::Capturing { source } => {
                    ui.label(RichText::new(source).color(Color32::WHITE));
                }
                Phase::Error(msg) => {
                    ui.label(RichText::new(msg).color(Color32::from_rgb(220, 100, 100)));
                }
                Phase::Idle => {}
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.label(small(format!(
                    "{} · {}",
                    current_platform(),
                    self.capture.platform_name()
                )));
            });
        });
    }

    fn render_sources(&mut self, ui: &mut egui::Ui) {
        let mut clicked_start: Option<CaptureSource> = None;
        let mut clicked_stop = false;
        let mut clicked_refresh = false;

        card(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(small("Sources"));
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    clicked_refresh = ui.small_button("⟳").on_hover_text("Refresh").clicked();
                });
            });
            ui.add_space(4.0);

            ScrollArea::vertical()
                .id_salt("sources")
                .max_height(220.0)
                .show(ui, |ui| {
                    if self.sources.is_empty() {
                        ui.label(small("No capture sources"));
                    }
                    for source in &self.sources {
                        let icon = if source.is_monitor { "🖵" } else { "🗔" };
                        let selected = self.selected.as_ref() == Some(&source.id);
                        let text = format!("{icon} {}  ({}x{})", source.name, source.width, source.height);
                        if ui.selectable_label(selected, text).clicked() {
                            self.selected = Some(source.id.clone());
                        }
                    }
                });

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let chosen = self
                    .selected
                    .as_ref()
                    .and_then(|id| self.sources.iter().find(|s| &s.id == id));
                let can_start = chosen.is_some() && self.capture.is_initialized();
                if ui
                    .add_enabled(can_start, egui::Button::new("▶ Start"))
                    .clicked()
                {
                    clicked_start = chosen.cloned();
                }
                if ui
                    .add_enabled(self.capture.is_capturing(), egui::Button::new("■ Stop"))
                    .clicked()
                {
                    clicked_stop = true;
                }
            });
        });

        if clicked_refresh {
            self.refresh_sources();
        }
        if clicked_stop {
            self.stop();
        }
        if let Some(source) = clicked_start {
            self.start(source);
        }
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        let editable = !self.capture.is_capturing();
        let mut changed = false;
        let mut clicked_screenshot = false;

        card(ui, |ui| {
            ui.label(small(if editable {
                "Capture settings"
            } else {
                "Capture settings (stop to edit)"
            }));
            ui.add_space(4.0);

            ui.add_enabled_ui(editable, |ui| {
                egui::ComboBox::from_label("Quality")
                    .selected_text(self.settings.quality.label())
                    .show_ui(ui, |ui| {
                        for quality in CaptureQuality::ALL {
                            changed |= ui
                                .selectable_value(&mut self.settings.quality, quality, quality.label())
                                .changed();
                        }
                    });
                let fps = ui.add(
                    egui::Slider::new(
                        &mut self.settings.target_fps,
                        0..=CaptureConfig::MAX_TARGET_FPS,
                    )
                    .text("Target FPS (0 = unlimited)"),
                );
                // Apply once the drag ends, not on every intermediate value.
                changed |= fps.drag_stopped() || (fps.changed() && !fps.dragged());
                changed |= ui
                    .checkbox(&mut self.settings.include_cursor, "Include cursor")
                    .changed();
                changed |= ui
                    .checkbox(&mut self.settings.include_borders, "Capture border")
                    .changed();
            });

            ui.add_space(4.0);
            clicked_screenshot = ui.button("Screenshot").clicked();
        });

        if changed {
            self.apply_settings();
        }
        if clicked_screenshot {
            self.screenshot();
        }
    }

    fn render_stats(&mut self, ui: &mut egui::Ui) {
        let stats = self.capture.statistics();
        let sink = self.sink.as_ref().map(|s| s.stats()).unwrap_or_default();

        card(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(small("Statistics"));
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    if ui.small_button("Reset").clicked() {
                        self.capture.reset_statistics();
                    }
                });
            });
            ui.add_space(6.0);
            ui.horizontal_wrapped(|ui| {
                stat_chip(ui, "FPS",      &format!("{:.1}", stats.average_fps));
                stat_chip(ui, "Captured", &stats.frames_captured.to_string());
                stat_chip(ui, "Dropped",  &stats.frames_dropped.to_string());
                stat_chip(ui, "Uploads",  &sink.uploads.to_string());
                stat_chip(ui, "Failures", &sink.failures.to_string());
            });
        });
    }

    fn render_mirror(&mut self, ui: &mut egui::Ui) {
        let texture = self.sink.as_ref().and_then(|sink| {
            sink.with_texture(|t| {
                t.and_then(|t| t.texture_id().map(|id| (id, t.width(), t.height())))
            })
        });

        let Some((id, width, height)) = texture else {
            ui.centered_and_justified(|ui| {
                ui.label(
                    RichText::new("No active mirror")
                        .font(FontId::new(18.0, FontFamily::Proportional))
                        .color(TEXT_DIM),
                );
            });
            return;
        };

        let available = ui.available_size();
        let scale = (available.x / width as f32)
            .min(available.y / height as f32)
            .min(1.0);
        let size = Vec2::new(width as f32 * scale, height as f32 * scale);
        ui.centered_and_justified(|ui| {
            ui.image((id, size));
        });
    }

    fn render_log_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(small("Log"));
            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.checkbox(&mut self.auto_scroll_logs, small("auto-scroll"));
            });
        });
        ui.add_space(3.0);

        Frame::none()
            .fill(BG_INSET)
            .inner_margin(Margin::symmetric(8.0, 6.0))
            .stroke(Stroke::new(1.0, Color32::from_rgb(45, 48, 60)))
            .rounding(egui::Rounding::same(6.0))
            .show(ui, |ui| {
                ScrollArea::vertical()
                    .id_salt("log_scroll")
                    .auto_shrink([false, false])
                    .stick_to_bottom(self.auto_scroll_logs)
                    .show(ui, |ui| {
                        ui.set_min_width(ui.available_width());
                        for line in self.logs.lines() {
                            let color = if line.starts_with("[ERROR]") {
                                Color32::from_rgb(220, 80, 70)
                            } else if line.starts_with("[WARN]") {
                                Color32::from_rgb(220, 165, 50)
                            } else {
                                Color32::from_rgb(160, 170, 185)
                            };
                            ui.label(
                                RichText::new(line)
                                    .font(FontId::new(11.5, FontFamily::Monospace))
                                    .color(color),
                            );
                        }
                    });
            });
    }
}
