//! Runtime bridge between UI command queue and the captioning client.

use std::thread;

use client_core::{CaptionClient, ImageCandidate, SessionEvent, Settings};
use crossbeam_channel::{Receiver, Sender};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(settings: Settings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::Startup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let client = CaptionClient::new(settings);

            let mut session_events = client.subscribe_events();
            let ui_tx_events = ui_tx.clone();
            let forwarder = tokio::spawn(async move {
                while let Ok(event) = session_events.recv().await {
                    let event = match event {
                        SessionEvent::ImageStaged {
                            file_name,
                            media_type,
                            size_bytes,
                        } => UiEvent::ImageStaged {
                            file_name,
                            media_type,
                            size_bytes,
                        },
                        SessionEvent::SelectionRejected { message } => UiEvent::Error(
                            UiError::validation(UiErrorContext::Selection, message),
                        ),
                        SessionEvent::PreviewReady { preview } => {
                            UiEvent::PreviewLoaded { preview }
                        }
                        SessionEvent::PreviewFailed { reason } => {
                            UiEvent::PreviewFailed { reason }
                        }
                        SessionEvent::UploadStarted => UiEvent::UploadStarted,
                        SessionEvent::CaptionReady { caption } => {
                            UiEvent::CaptionReady { caption }
                        }
                        SessionEvent::SubmitFailed { error } => UiEvent::Error(
                            UiError::from_submit_error(UiErrorContext::Submit, &error),
                        ),
                        SessionEvent::Cleared => UiEvent::Cleared,
                    };
                    let _ = ui_tx_events.try_send(event);
                }
            });

            let _ = ui_tx.try_send(UiEvent::WorkerReady);

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::SelectPath { path } => {
                        tracing::info!(path = %path.display(), "backend: select_path");
                        match tokio::fs::read(&path).await {
                            Ok(bytes) => {
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
                            }
                            Err(err) => {
                                tracing::warn!(path = %path.display(), "backend: select_path failed: {err}");
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                    UiErrorContext::Selection,
                                    format!("failed to read '{}': {err}", path.display()),
                                )));
                            }
                        }
                    }
                    BackendCommand::SelectBytes {
                        file_name,
                        declared_media_type,
                        bytes,
                    } => {
                        tracing::info!(file = %file_name, "backend: select_bytes");
                        let declared_media_type = declared_media_type.unwrap_or_else(|| {
                            mime_guess::from_path(&file_name)
                                .first_raw()
                                .unwrap_or("application/octet-stream")
                                .to_string()
                        });
                        client
                            .select_image(ImageCandidate {
                                bytes,
                                declared_media_type,
                                file_name: Some(file_name),
                            })
                            .await;
                    }
                    BackendCommand::Submit => {
                        tracing::info!("backend: submit");
                        client.submit().await;
                    }
                    BackendCommand::Clear => {
                        tracing::info!("backend: clear");
                        client.clear_image().await;
                    }
                    BackendCommand::CheckHealth => {
                        tracing::debug!("backend: check_health");
                        let result = client
                            .check_health()
                            .await
                            .map_err(|err| err.message().to_string());
                        let _ = ui_tx.try_send(UiEvent::HealthChecked { result });
                    }
                }
            }

            forwarder.abort();
        });
    });
}
