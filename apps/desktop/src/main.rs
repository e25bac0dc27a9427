use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use client_core::{CaptionClient, ImageCandidate, Settings};
use shared::domain::SessionStatus;

#[derive(Parser, Debug)]
#[command(about = "Send one image to the captioning service and print the caption")]
struct Args {
    /// Image file to caption.
    #[arg(long, required_unless_present = "check_health")]
    image: Option<PathBuf>,
    /// Captioning service base URL; defaults to config file / environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Probe the service health endpoint instead of captioning.
    #[arg(long)]
    check_health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let settings = match args.server_url {
        Some(url) => Settings::with_base_url(url),
        None => client_core::load_settings(),
    };
    let client = CaptionClient::new(settings);

    if args.check_health {
        let status = client
            .check_health()
            .await
            .map_err(|err| anyhow!(err.message().to_string()))?;
        println!("Service at {} reports: {status}", client.base_url());
        return Ok(());
    }

    let Some(path) = args.image else {
        bail!("--image is required unless --check-health is set");
    };
    let bytes = std::fs::read(&path)
        .with_context(|| format!("failed to read image '{}'", path.display()))?;
    let declared_media_type = mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    client
        .select_image(ImageCandidate {
            bytes,
            declared_media_type,
            file_name,
        })
        .await;

    let staged = client.snapshot().await;
    if staged.selected_image.is_none() {
        bail!(staged
            .error_message
            .unwrap_or_else(|| "file was rejected".to_string()));
    }

    client.submit().await;

    let session = client.snapshot().await;
    match session.status {
        SessionStatus::Success => {
            println!("{}", session.caption.unwrap_or_default());
            Ok(())
        }
        _ => bail!(session
            .error_message
            .unwrap_or_else(|| "captioning failed".to_string())),
    }
}
