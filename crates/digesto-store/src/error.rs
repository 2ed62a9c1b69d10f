use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path: {0:?}")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "dropbox")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("listing reported more entries but returned no cursor")]
    MissingCursor,

    #[error("{0}")]
    Other(String),
}
