//! Backend commands queued from UI to backend worker.

use std::path::PathBuf;

pub enum BackendCommand {
    SelectPath {
        path: PathBuf,
    },
    SelectBytes {
        file_name: String,
        declared_media_type: Option<String>,
        bytes: Vec<u8>,
    },
    Submit,
    Clear,
    CheckHealth,
}
