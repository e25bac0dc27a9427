//! Dark theme for the caption desk UI.

use eframe::egui;

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub app_background: egui::Color32,
    pub panel_background: egui::Color32,
    pub drop_zone_fill: egui::Color32,
    pub drop_zone_border: egui::Color32,
    pub drop_zone_border_active: egui::Color32,
    pub accent: egui::Color32,
    pub text_primary: egui::Color32,
    pub text_muted: egui::Color32,
    pub error_background: egui::Color32,
    pub error_border: egui::Color32,
    pub error_text: egui::Color32,
    pub ok_text: egui::Color32,
}

pub fn dark_palette() -> Palette {
    Palette {
        app_background: egui::Color32::from_rgb(12, 12, 14),
        panel_background: egui::Color32::from_rgb(24, 24, 28),
        drop_zone_fill: egui::Color32::from_rgb(18, 18, 22),
        drop_zone_border: egui::Color32::from_rgb(63, 63, 70),
        drop_zone_border_active: egui::Color32::from_rgb(99, 102, 241),
        accent: egui::Color32::from_rgb(99, 102, 241),
        text_primary: egui::Color32::from_rgb(244, 244, 245),
        text_muted: egui::Color32::from_rgb(161, 161, 170),
        error_background: egui::Color32::from_rgb(46, 20, 24),
        error_border: egui::Color32::from_rgb(127, 29, 29),
        error_text: egui::Color32::from_rgb(248, 113, 113),
        ok_text: egui::Color32::from_rgb(74, 222, 128),
    }
}

pub fn apply(ctx: &egui::Context, palette: &Palette) {
    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = palette.app_background;
    visuals.window_fill = palette.panel_background;
    visuals.selection.bg_fill = palette.accent;
    visuals.hyperlink_color = palette.accent;
    ctx.set_visuals(visuals);
}
