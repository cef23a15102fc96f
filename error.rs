use serde::{Serialize, Serializer};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF Error: {0}")]
    Pdf(#[from] genpdf::error::Error),

    #[error("Path Error: {0}")]
    Path(String),

    #[error("Initialization Failed: {0}")]
    Init(String),

    #[error("Inference Failed: {0}")]
    Inference(String),

    #[error("Invalid Input: {0}")]
    Validation(String),

    #[error("Incident not found: {0}")]
    NotFound(String),

    #[error("No analysis to submit; analyze an image first")]
    NoPendingAnalysis,

    #[error("State lock poisoned")]
    Lock,
}

// Tauri commands hand errors to the webview as plain strings.
impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
