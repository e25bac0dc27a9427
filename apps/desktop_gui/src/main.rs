mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use eframe::egui;

use backend_bridge::commands::BackendCommand;
use client_core::Settings;
use controller::events::UiEvent;
use ui::CaptionDeskApp;

#[derive(Parser, Debug)]
#[command(about = "Desktop client for the image captioning service")]
struct Args {
    /// Captioning service base URL; defaults to config file / environment.
    #[arg(long)]
    server_url: Option<String>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let settings = match args.server_url {
        Some(url) => Settings::with_base_url(url),
        None => client_core::load_settings(),
    };
    let server_url = client_core::normalize_base_url(&settings.api_base_url);

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    backend_bridge::runtime::launch(settings, cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Image Caption Desk")
            .with_inner_size([760.0, 840.0])
            .with_min_inner_size([560.0, 640.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Image Caption Desk",
        options,
        Box::new(move |_cc| Ok(Box::new(CaptionDeskApp::new(server_url, cmd_tx, ui_rx)))),
    )
}
