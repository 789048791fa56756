use thiserror::Error;

#[derive(Error, Debug)]
pub enum BitbakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Shadow store error: {0}")]
    Store(String),

    #[error("Invalid URI: {0}")]
    Uri(String),
}

pub type Result<T> = std::result::Result<T, BitbakeError>;
