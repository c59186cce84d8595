use egui::{Color32, FontFamily, FontId, Frame, Margin, RichText, Stroke};

// ── Colours ───────────────────────────────────────────────────────────────────

pub const BG_PANEL:  Color32 = Color32::from_rgb(28,  30,  36);
pub const BG_INSET:  Color32 = Color32::from_rgb(20,  22,  28);
pub const BG_CARD:   Color32 = Color32::from_rgb(36,  38,  46);
pub const ACCENT:    Color32 = Color32::from_rgb(99, 144, 255);
pub const TEXT_DIM:  Color32 = Color32::from_rgb(130, 135, 148);
pub const TEXT_NORM: Color32 = Color32::from_rgb(210, 215, 230);
pub const BORDER:    Color32 = Color32::from_rgb(50,  53,  68);

/// Dark visuals with slightly larger body text.
pub fn apply(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.window_fill               = BG_PANEL;
    visuals.panel_fill                = BG_PANEL;
    visuals.extreme_bg_color          = BG_INSET;
    visuals.faint_bg_color            = BG_CARD;
    visuals.widgets.inactive.bg_fill  = BG_CARD;
    visuals.widgets.hovered.bg_fill   = Color32::from_rgb(50, 53, 65);
    visuals.widgets.active.bg_fill    = Color32::from_rgb(65, 68, 82);
    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.text_styles.insert(
        egui::TextStyle::Body,
        FontId::new(14.0, FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Button,
        FontId::new(13.5, FontFamily::Proportional),
    );
    ctx.set_style(style);
}

pub fn small(text: impl Into<String>) -> RichText {
    RichText::new(text)
        .font(FontId::new(12.0, FontFamily::Proportional))
        .color(TEXT_DIM)
}

pub fn card(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    Frame::none()
        .fill(BG_CARD)
        .inner_margin(Margin::symmetric(12.0, 10.0))
        .rounding(egui::Rounding::same(8.0))
        .stroke(Stroke::new(1.0, BORDER))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            add_contents(ui);
        });
}

pub fn stat_chip(ui: &mut egui::Ui, label: &str, value: &str) {
    Frame::none()
        .fill(BG_INSET)
        .inner_margin(Margin::symmetric(10.0, 6.0))
        .rounding(egui::Rounding::same(6.0))
        .stroke(Stroke::new(1.0, BORDER))
        .show(ui, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(
                    RichText::new(value)
                        .font(FontId::new(18.0, FontFamily::Monospace))
                        .strong()
                        .color(Color32::WHITE),
                );
                ui.add_space(1.0);
                ui.label(
                    RichText::new(label)
                        .font(FontId::new(11.0, FontFamily::Proportional))
                        .color(TEXT_DIM),
                );
            });
        });
    ui.add_space(6.0);
}
