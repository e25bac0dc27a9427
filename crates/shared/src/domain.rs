use serde::{Deserialize, Serialize};

/// Media types the captioning endpoint accepts. Anything else is rejected
/// client-side before a request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMediaType {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageMediaType {
    pub const ACCEPTED: [ImageMediaType; 4] = [
        ImageMediaType::Jpeg,
        ImageMediaType::Png,
        ImageMediaType::Webp,
        ImageMediaType::Gif,
    ];

    /// Exact match against the declared media type string, e.g. "image/png".
    pub fn parse_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Png => &["png"],
            Self::Webp => &["webp"],
            Self::Gif => &["gif"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Uploading,
    Success,
    Error,
}
