use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui::TextureHandle;
use shared::domain::ImageMediaType;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorCategory, UiEvent};
use crate::controller::orchestration::dispatch_backend_command;
use crate::ui::theme::{self, Palette};
use client_core::ImagePreview;

/// Seconds between background probes of the service health endpoint.
const HEALTH_PROBE_INTERVAL_SECS: f64 = 20.0;
const PREVIEW_MAX_HEIGHT: f32 = 340.0;

#[derive(Debug, Clone)]
struct StagedImage {
    file_name: Option<String>,
    media_type: ImageMediaType,
    size_bytes: u64,
}

#[derive(Debug, Clone)]
struct StatusBanner {
    category: UiErrorCategory,
    message: String,
}

impl StatusBanner {
    fn from_error(error: &UiError) -> Self {
        Self {
            category: error.category(),
            message: error.message().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum HealthState {
    Unknown,
    Healthy(String),
    Unreachable(String),
}

fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Service => "Service",
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

fn server_environment_label(server_url: &str) -> &'static str {
    let server = server_url.to_ascii_lowercase();
    if server.contains("127.0.0.1") || server.contains("localhost") {
        "Local"
    } else if server.contains("staging") {
        "Staging"
    } else if server.contains("dev") {
        "Development"
    } else {
        "Production"
    }
}

fn human_readable_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else if value.fract() == 0.0 {
        format!("{} {}", value as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub struct CaptionDeskApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    palette: Palette,
    theme_applied: bool,
    server_url: String,
    worker_ready: bool,
    staged: Option<StagedImage>,
    preview: Option<ImagePreview>,
    preview_texture: Option<TextureHandle>,
    preview_error: Option<String>,
    caption: Option<String>,
    uploading: bool,
    banner: Option<StatusBanner>,
    status_line: String,
    health: HealthState,
    last_health_probe_at: f64,
    drag_active: bool,
}

impl CaptionDeskApp {
    pub fn new(
        server_url: String,
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
    ) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            palette: theme::dark_palette(),
            theme_applied: false,
            server_url,
            worker_ready: false,
            staged: None,
            preview: None,
            preview_texture: None,
            preview_error: None,
            caption: None,
            uploading: false,
            banner: None,
            status_line: String::new(),
            health: HealthState::Unknown,
            last_health_probe_at: f64::NEG_INFINITY,
            drag_active: false,
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::WorkerReady => {
                self.worker_ready = true;
            }
            UiEvent::ImageStaged {
                file_name,
                media_type,
                size_bytes,
            } => {
                self.staged = Some(StagedImage {
                    file_name,
                    media_type,
                    size_bytes,
                });
                self.preview = None;
                self.preview_texture = None;
                self.preview_error = None;
                self.caption = None;
                self.banner = None;
            }
            UiEvent::PreviewLoaded { preview } => {
                self.preview = Some(preview);
                self.preview_texture = None;
                self.preview_error = None;
            }
            UiEvent::PreviewFailed { reason } => {
                self.preview = None;
                self.preview_texture = None;
                self.preview_error = Some(reason);
            }
            UiEvent::UploadStarted => {
                self.uploading = true;
                self.caption = None;
                self.banner = None;
            }
            UiEvent::CaptionReady { caption } => {
                self.uploading = false;
                self.caption = Some(caption);
            }
            UiEvent::Cleared => {
                self.staged = None;
                self.preview = None;
                self.preview_texture = None;
                self.preview_error = None;
                self.caption = None;
                self.banner = None;
                self.uploading = false;
            }
            UiEvent::HealthChecked { result } => {
                self.health = match result {
                    Ok(status) => HealthState::Healthy(status),
                    Err(reason) => HealthState::Unreachable(reason),
                };
            }
            UiEvent::Error(error) => {
                self.uploading = false;
                self.banner = Some(StatusBanner::from_error(&error));
            }
        }
    }

    fn drain_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        self.drag_active = ctx.input(|i| !i.raw.hovered_files.is_empty());
        if self.uploading {
            return;
        }
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(file) = dropped.into_iter().next() {
            self.stage_dropped_file(file);
        }
    }

    fn stage_dropped_file(&mut self, file: egui::DroppedFile) {
        if let Some(bytes) = file.bytes {
            let declared_media_type = if file.mime.trim().is_empty() {
                None
            } else {
                Some(file.mime.clone())
            };
            let file_name = if file.name.is_empty() {
                "dropped-image".to_string()
            } else {
                file.name.clone()
            };
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::SelectBytes {
                    file_name,
                    declared_media_type,
                    bytes: bytes.to_vec(),
                },
                &mut self.status_line,
            );
        } else if let Some(path) = file.path {
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::SelectPath { path },
                &mut self.status_line,
            );
        }
    }

    fn open_file_dialog(&mut self) {
        let mut extensions: Vec<&str> = Vec::new();
        for media_type in ImageMediaType::ACCEPTED {
            extensions.extend_from_slice(media_type.extensions());
        }
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &extensions)
            .pick_file()
        {
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::SelectPath { path },
                &mut self.status_line,
            );
        }
    }

    fn maybe_probe_health(&mut self, ctx: &egui::Context) {
        if !self.worker_ready {
            return;
        }
        let now = ctx.input(|i| i.time);
        if now - self.last_health_probe_at >= HEALTH_PROBE_INTERVAL_SECS {
            self.last_health_probe_at = now;
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::CheckHealth,
                &mut self.status_line,
            );
        }
    }

    fn ensure_preview_texture(&mut self, ctx: &egui::Context) {
        if self.preview_texture.is_some() {
            return;
        }
        if let Some(preview) = &self.preview {
            let color_image = egui::ColorImage::from_rgba_unmultiplied(
                [preview.width, preview.height],
                &preview.rgba,
            );
            self.preview_texture = Some(ctx.load_texture(
                "selected-image-preview",
                color_image,
                egui::TextureOptions::LINEAR,
            ));
        }
    }

    fn show_upload_zone(&mut self, ui: &mut egui::Ui) {
        let border = if self.drag_active {
            self.palette.drop_zone_border_active
        } else {
            self.palette.drop_zone_border
        };

        let frame = egui::Frame::new()
            .fill(self.palette.drop_zone_fill)
            .stroke(egui::Stroke::new(2.0, border))
            .corner_radius(egui::CornerRadius::same(16))
            .inner_margin(egui::Margin::symmetric(24, 36));

        let inner = frame.show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.vertical_centered(|ui| {
                if let Some(texture) = &self.preview_texture {
                    ui.add(
                        egui::Image::new(texture)
                            .max_size(egui::vec2(ui.available_width(), PREVIEW_MAX_HEIGHT)),
                    );
                    ui.add_space(8.0);
                }
                match (&self.staged, &self.preview_error) {
                    (Some(staged), preview_error) => {
                        if self.preview_texture.is_none() {
                            match preview_error {
                                Some(reason) => {
                                    ui.colored_label(
                                        self.palette.text_muted,
                                        format!("No preview available ({reason})"),
                                    );
                                }
                                None => {
                                    ui.add(egui::Spinner::new());
                                }
                            }
                            ui.add_space(8.0);
                        }
                        let name = staged.file_name.as_deref().unwrap_or("image");
                        ui.colored_label(
                            self.palette.text_primary,
                            format!(
                                "{name} · {} · {}",
                                staged.media_type.as_str(),
                                human_readable_bytes(staged.size_bytes)
                            ),
                        );
                    }
                    (None, _) => {
                        ui.colored_label(
                            self.palette.text_muted,
                            "Drag and drop an image here, or click to browse",
                        );
                        ui.add_space(4.0);
                        ui.colored_label(self.palette.text_muted, "JPEG, PNG, WebP, or GIF");
                    }
                }
            });
        });

        let response = inner
            .response
            .interact(egui::Sense::click())
            .on_hover_cursor(egui::CursorIcon::PointingHand);
        if response.clicked() && !self.uploading {
            self.open_file_dialog();
        }
    }

    fn show_banner(&mut self, ui: &mut egui::Ui) {
        if let Some(banner) = &self.banner {
            egui::Frame::new()
                .fill(self.palette.error_background)
                .stroke(egui::Stroke::new(1.0, self.palette.error_border))
                .corner_radius(egui::CornerRadius::same(10))
                .inner_margin(egui::Margin::symmetric(12, 10))
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.colored_label(
                        self.palette.error_text,
                        format!("{}: {}", err_label(banner.category), banner.message),
                    );
                });
            ui.add_space(8.0);
        }
    }

    fn show_action_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let can_submit = self.staged.is_some() && !self.uploading && self.worker_ready;
            let submit_label = if self.uploading {
                "Generating caption…"
            } else {
                "Generate caption"
            };
            if ui
                .add_enabled(can_submit, egui::Button::new(submit_label))
                .clicked()
            {
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::Submit,
                    &mut self.status_line,
                );
            }

            if self.staged.is_some() && !self.uploading {
                if ui.button("Choose another image").clicked() {
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::Clear,
                        &mut self.status_line,
                    );
                    self.open_file_dialog();
                }
                if ui.button("Remove").clicked() {
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::Clear,
                        &mut self.status_line,
                    );
                }
            }
        });
    }

    fn show_caption_box(&mut self, ui: &mut egui::Ui) {
        if let Some(caption) = &self.caption {
            ui.add_space(8.0);
            egui::Frame::new()
                .fill(self.palette.panel_background)
                .corner_radius(egui::CornerRadius::same(12))
                .inner_margin(egui::Margin::same(16))
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.colored_label(self.palette.text_muted, egui::RichText::new("CAPTION").size(11.0));
                    ui.add_space(4.0);
                    ui.colored_label(
                        self.palette.text_primary,
                        egui::RichText::new(caption).size(16.0),
                    );
                });
        }
    }

    fn show_footer(&mut self, ui: &mut egui::Ui) {
        ui.add_space(12.0);
        ui.separator();
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.colored_label(
                self.palette.text_muted,
                format!(
                    "Backend: {} ({})",
                    self.server_url,
                    server_environment_label(&self.server_url)
                ),
            );
            match &self.health {
                HealthState::Unknown => {
                    ui.colored_label(self.palette.text_muted, "· checking service…");
                }
                HealthState::Healthy(status) => {
                    ui.colored_label(self.palette.ok_text, format!("· service {status}"));
                }
                HealthState::Unreachable(_) => {
                    ui.colored_label(self.palette.error_text, "· service unreachable");
                }
            }
        });
        if !self.status_line.is_empty() {
            ui.colored_label(self.palette.text_muted, self.status_line.clone());
        }
    }
}

impl eframe::App for CaptionDeskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            theme::apply(ctx, &self.palette);
            self.theme_applied = true;
        }

        self.drain_ui_events();
        self.handle_dropped_files(ctx);
        self.maybe_probe_health(ctx);
        self.ensure_preview_texture(ctx);

        egui::CentralPanel::default()
            .frame(
                egui::Frame::new()
                    .fill(self.palette.app_background)
                    .inner_margin(egui::Margin::symmetric(32, 24)),
            )
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.colored_label(
                        self.palette.text_primary,
                        egui::RichText::new("Image Caption Generator").size(24.0).strong(),
                    );
                    ui.colored_label(
                        self.palette.text_muted,
                        "Upload an image and get an AI-generated caption",
                    );
                });
                ui.add_space(16.0);

                self.show_upload_zone(ui);
                ui.add_space(12.0);
                self.show_banner(ui);
                self.show_action_row(ui);
                self.show_caption_box(ui);
                self.show_footer(ui);
            });

        // Backend events arrive on a plain channel; keep polling while idle.
        ctx.request_repaint_after(std::time::Duration::from_millis(200));
    }
}

#[cfg(test)]
mod tests {
    use super::{human_readable_bytes, server_environment_label};

    #[test]
    fn formats_file_sizes_readably() {
        assert_eq!(human_readable_bytes(0), "0 B");
        assert_eq!(human_readable_bytes(1023), "1023 B");
        assert_eq!(human_readable_bytes(1024), "1 KB");
        assert_eq!(human_readable_bytes(1536), "1.5 KB");
        assert_eq!(human_readable_bytes(2 * 1024 * 1024), "2 MB");
        assert_eq!(human_readable_bytes(1_572_864), "1.5 MB");
        assert_eq!(human_readable_bytes(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn labels_server_environment_from_url() {
        assert_eq!(server_environment_label("http://127.0.0.1:8000"), "Local");
        assert_eq!(server_environment_label("http://localhost:8000"), "Local");
        assert_eq!(
            server_environment_label("https://captions.staging.example.com"),
            "Staging"
        );
        assert_eq!(
            server_environment_label("https://captions.example.com"),
            "Production"
        );
    }
}
