use std::sync::Arc;

use reqwest::{multipart, Client};
use shared::{
    domain::{ImageMediaType, SessionStatus},
    error::{SubmitError, VALIDATION_MESSAGE},
    protocol::{ApiErrorBody, CaptionResponse, HealthResponse},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod config;

pub use config::{load_settings, normalize_base_url, Settings};

const EVENT_CHANNEL_CAPACITY: usize = 256;
/// Previews are bounded thumbnails; the service gets the original bytes.
const PREVIEW_MAX_DIMENSION: u32 = 1024;

/// A file the user picked or dropped, before validation.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub bytes: Vec<u8>,
    pub declared_media_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: Option<String>,
    pub media_type: ImageMediaType,
    pub bytes: Vec<u8>,
}

/// RGBA thumbnail derived from the selected image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// The single stateful record tracking one captioning attempt's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub selected_image: Option<SelectedImage>,
    pub preview: Option<ImagePreview>,
    pub caption: Option<String>,
    pub status: SessionStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ImageStaged {
        file_name: Option<String>,
        media_type: ImageMediaType,
        size_bytes: u64,
    },
    SelectionRejected {
        message: String,
    },
    PreviewReady {
        preview: ImagePreview,
    },
    PreviewFailed {
        reason: String,
    },
    UploadStarted,
    CaptionReady {
        caption: String,
    },
    SubmitFailed {
        error: SubmitError,
    },
    Cleared,
}

struct SessionState {
    session: Session,
    // Bumped on every selection and clear; a preview decode only lands if the
    // sequence it was spawned under is still current.
    selection_seq: u64,
}

/// Owns the lifecycle of one image-captioning attempt: selection and
/// validation, preview derivation, the single multipart POST, and the
/// interpretation of the response or failure into session state.
pub struct CaptionClient {
    http: Client,
    base_url: String,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl CaptionClient {
    pub fn new(settings: Settings) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            http: Client::new(),
            base_url: normalize_base_url(&settings.api_base_url),
            inner: Mutex::new(SessionState {
                session: Session::default(),
                selection_seq: 0,
            }),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    /// Stage a candidate image. Rejects declared types outside the accepted
    /// set with an inline validation message, leaving any previous selection
    /// and the session status untouched.
    pub async fn select_image(self: &Arc<Self>, candidate: ImageCandidate) {
        let Some(media_type) = ImageMediaType::parse_declared(&candidate.declared_media_type)
        else {
            warn!(
                declared = %candidate.declared_media_type,
                "selection rejected: not an accepted image type"
            );
            {
                let mut guard = self.inner.lock().await;
                guard.session.error_message = Some(VALIDATION_MESSAGE.to_string());
            }
            let _ = self.events.send(SessionEvent::SelectionRejected {
                message: VALIDATION_MESSAGE.to_string(),
            });
            return;
        };

        let ImageCandidate {
            bytes, file_name, ..
        } = candidate;
        let size_bytes = bytes.len() as u64;
        let decode_bytes = bytes.clone();

        let seq = {
            let mut guard = self.inner.lock().await;
            if guard.session.status == SessionStatus::Uploading {
                debug!("selection ignored while a submission is in flight");
                return;
            }
            guard.selection_seq += 1;
            guard.session.selected_image = Some(SelectedImage {
                file_name: file_name.clone(),
                media_type,
                bytes,
            });
            guard.session.preview = None;
            guard.session.caption = None;
            guard.session.error_message = None;
            guard.session.status = SessionStatus::Idle;
            guard.selection_seq
        };

        info!(
            media_type = media_type.as_str(),
            size_bytes, "image staged for captioning"
        );
        let _ = self.events.send(SessionEvent::ImageStaged {
            file_name,
            media_type,
            size_bytes,
        });

        let client = Arc::clone(self);
        tokio::spawn(async move {
            let decoded = tokio::task::spawn_blocking(move || derive_preview(&decode_bytes)).await;
            let outcome = match decoded {
                Ok(result) => result,
                Err(err) => Err(format!("preview task failed: {err}")),
            };

            let mut guard = client.inner.lock().await;
            if guard.selection_seq != seq {
                debug!("discarding preview for a superseded selection");
                return;
            }
            match outcome {
                Ok(preview) => {
                    guard.session.preview = Some(preview.clone());
                    drop(guard);
                    let _ = client.events.send(SessionEvent::PreviewReady { preview });
                }
                Err(reason) => {
                    drop(guard);
                    warn!("preview decode failed: {reason}");
                    let _ = client.events.send(SessionEvent::PreviewFailed { reason });
                }
            }
        });
    }

    /// Reset every session field to its initial empty state. Idempotent.
    pub async fn clear_image(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.selection_seq += 1;
            guard.session = Session::default();
        }
        let _ = self.events.send(SessionEvent::Cleared);
    }

    /// The user-facing "start over" action after a completed or failed
    /// attempt.
    pub async fn reset(&self) {
        self.clear_image().await;
    }

    /// Perform exactly one captioning request for the selected image. No-op
    /// when nothing is selected or a submission is already in flight; no
    /// automatic retry, no cancellation of the in-flight request.
    pub async fn submit(self: &Arc<Self>) {
        let (bytes, media_type, file_name) = {
            let mut guard = self.inner.lock().await;
            if guard.session.status == SessionStatus::Uploading {
                debug!("submit ignored: a submission is already in flight");
                return;
            }
            let Some(image) = guard.session.selected_image.as_ref() else {
                debug!("submit ignored: no image selected");
                return;
            };
            let parts = (
                image.bytes.clone(),
                image.media_type,
                image.file_name.clone(),
            );
            guard.session.status = SessionStatus::Uploading;
            guard.session.caption = None;
            guard.session.error_message = None;
            parts
        };

        info!(
            media_type = media_type.as_str(),
            size_bytes = bytes.len(),
            "submitting image to {}/caption",
            self.base_url
        );
        let _ = self.events.send(SessionEvent::UploadStarted);

        let outcome = self.request_caption(bytes, media_type, file_name).await;

        let mut guard = self.inner.lock().await;
        match outcome {
            Ok(caption) => {
                info!("caption received ({} chars)", caption.len());
                guard.session.caption = Some(caption.clone());
                guard.session.status = SessionStatus::Success;
                drop(guard);
                let _ = self.events.send(SessionEvent::CaptionReady { caption });
            }
            Err(error) => {
                warn!("submission failed: {error}");
                guard.session.error_message = Some(error.message().to_string());
                guard.session.status = SessionStatus::Error;
                drop(guard);
                let _ = self.events.send(SessionEvent::SubmitFailed { error });
            }
        }
    }

    async fn request_caption(
        &self,
        bytes: Vec<u8>,
        media_type: ImageMediaType,
        file_name: Option<String>,
    ) -> Result<String, SubmitError> {
        let file_name = file_name.unwrap_or_else(|| fallback_file_name(media_type));
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(media_type.as_str())
            .map_err(|err| SubmitError::transport(err.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/caption", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|err| SubmitError::transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            // A 2xx body that is missing the caption field, or is not JSON at
            // all, yields an empty caption rather than an error.
            let text = response
                .text()
                .await
                .map_err(|err| SubmitError::transport(err.to_string()))?;
            let body: CaptionResponse = serde_json::from_str(&text).unwrap_or_default();
            Ok(body.caption)
        } else {
            let detail = response
                .text()
                .await
                .ok()
                .and_then(|text| serde_json::from_str::<ApiErrorBody>(&text).ok())
                .and_then(|body| body.detail);
            Err(SubmitError::service(status.as_u16(), detail))
        }
    }

    /// Probe `GET {base}/health`. Never touches the session.
    pub async fn check_health(&self) -> Result<String, SubmitError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|err| SubmitError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::service(status.as_u16(), None));
        }
        let body: HealthResponse = response
            .json()
            .await
            .map_err(|err| SubmitError::transport(err.to_string()))?;
        Ok(body.status)
    }
}

fn fallback_file_name(media_type: ImageMediaType) -> String {
    format!("upload.{}", media_type.extensions()[0])
}

fn derive_preview(bytes: &[u8]) -> Result<ImagePreview, String> {
    let dynamic = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let resized = dynamic
        .thumbnail(PREVIEW_MAX_DIMENSION, PREVIEW_MAX_DIMENSION)
        .to_rgba8();
    let width = resized.width() as usize;
    let height = resized.height() as usize;
    Ok(ImagePreview {
        width,
        height,
        rgba: resized.into_raw(),
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
