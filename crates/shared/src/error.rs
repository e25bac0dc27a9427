use thiserror::Error;

/// Inline message shown when a selected file's declared type is not an
/// accepted image type.
pub const VALIDATION_MESSAGE: &str = "Please choose an image file (JPEG, PNG, WebP, or GIF).";

/// Shown when a transport failure carries no description of its own.
pub const TRANSPORT_FALLBACK_MESSAGE: &str = "Could not reach the server. Is the backend running?";

/// A submission that reached a terminal failure. `Service` means the request
/// got a non-2xx response; `Transport` means no response arrived at all.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("{message}")]
    Service { status: u16, message: String },
    #[error("{message}")]
    Transport { message: String },
}

impl SubmitError {
    pub fn service(status: u16, detail: Option<String>) -> Self {
        let message = detail.unwrap_or_else(|| format!("Request failed ({status})"));
        Self::Service { status, message }
    }

    pub fn transport(description: impl Into<String>) -> Self {
        let description = description.into();
        let message = if description.trim().is_empty() {
            TRANSPORT_FALLBACK_MESSAGE.to_string()
        } else {
            description
        };
        Self::Transport { message }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Service { message, .. } | Self::Transport { message } => message,
        }
    }
}
