//! UI/backend events and error modeling for the desktop GUI controller.

use client_core::ImagePreview;
use shared::{domain::ImageMediaType, error::SubmitError};

pub enum UiEvent {
    WorkerReady,
    ImageStaged {
        file_name: Option<String>,
        media_type: ImageMediaType,
        size_bytes: u64,
    },
    PreviewLoaded {
        preview: ImagePreview,
    },
    PreviewFailed {
        reason: String,
    },
    UploadStarted,
    CaptionReady {
        caption: String,
    },
    Cleared,
    HealthChecked {
        result: Result<String, String>,
    },
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Validation,
    Service,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    Startup,
    Selection,
    Submit,
    General,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn validation(context: UiErrorContext, message: impl Into<String>) -> Self {
        Self {
            category: UiErrorCategory::Validation,
            context,
            message: message.into(),
        }
    }

    /// Submission failures arrive typed, so no keyword sniffing is needed.
    pub fn from_submit_error(context: UiErrorContext, error: &SubmitError) -> Self {
        let category = match error {
            SubmitError::Service { .. } => UiErrorCategory::Service,
            SubmitError::Transport { .. } => UiErrorCategory::Transport,
        };
        Self {
            category,
            context,
            message: error.message().to_string(),
        }
    }

    /// Classify free-text failures (worker startup, file reads) by keyword.
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("choose an image")
            || message_lower.contains("invalid")
            || message_lower.contains("unsupported")
            || message_lower.contains("malformed")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("unreachable")
            || message_lower.contains("could not reach")
            || message_lower.contains("dns")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("request failed") {
            UiErrorCategory::Service
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_submit_errors_map_to_their_category() {
        let service = SubmitError::service(503, Some("model overloaded".to_string()));
        let transport = SubmitError::transport("connection refused");

        let service_err = UiError::from_submit_error(UiErrorContext::Submit, &service);
        assert_eq!(service_err.category(), UiErrorCategory::Service);
        assert_eq!(service_err.message(), "model overloaded");

        let transport_err = UiError::from_submit_error(UiErrorContext::Submit, &transport);
        assert_eq!(transport_err.category(), UiErrorCategory::Transport);
    }

    #[test]
    fn classifies_queue_disconnect_as_transport_error() {
        let err = UiError::from_message(
            UiErrorContext::General,
            "Backend command processor disconnected (possible startup/runtime failure)",
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
    }

    #[test]
    fn classifies_unrecognized_failures_as_unknown() {
        let err = UiError::from_message(UiErrorContext::Startup, "something odd happened");
        assert_eq!(err.category(), UiErrorCategory::Unknown);
        assert_eq!(err.context(), UiErrorContext::Startup);
    }

    #[test]
    fn classifies_file_type_complaints_as_validation() {
        let err = UiError::from_message(
            UiErrorContext::Selection,
            "Please choose an image file (JPEG, PNG, WebP, or GIF).",
        );
        assert_eq!(err.category(), UiErrorCategory::Validation);
    }
}
