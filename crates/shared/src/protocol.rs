use serde::{Deserialize, Serialize};

/// Successful response body from `POST /caption`. A missing `caption` field
/// deserializes to the empty string rather than an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptionResponse {
    #[serde(default)]
    pub caption: String,
}

/// Error body the captioning service attaches to non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
