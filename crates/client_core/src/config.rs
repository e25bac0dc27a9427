use std::{collections::HashMap, fs};

use serde::Deserialize;

/// Base-URL configuration for the captioning service.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".into(),
        }
    }
}

impl Settings {
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
        }
    }
}

/// Defaults, overlaid by `caption_client.toml`, overlaid by environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("caption_client.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("api_base_url") {
                settings.api_base_url = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("CAPTION_API_URL") {
        settings.api_base_url = v;
    }
    if let Ok(v) = std::env::var("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    settings
}

/// Request paths are joined as `{base}/caption`, so the stored base must not
/// end with a slash.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Settings::default().api_base_url;
    }

    trimmed.trim_end_matches('/').to_string()
}
