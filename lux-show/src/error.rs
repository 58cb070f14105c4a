use lux_render::RenderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Project format error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Unsupported project version {0}")]
    UnsupportedVersion(u32),
}
