mod auth;
mod config;
mod cursor;
mod pool;

pub use auth::Auth;
pub use config::DatabaseConfig;
pub use cursor::{count_documents, CursorBatch, CursorQuery, CursorStream};
pub use pool::{Pool, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint: '{0}'")]
    InvalidEndpoint(String),
    #[error("transport error reaching '{endpoint}'")]
    Transport {
        endpoint: String,
        #[source]
        cause: reqwest::Error,
    },
    #[error("authentication rejected by the server")]
    Auth,
    #[error("HTTP {code}: {body_excerpt}")]
    HttpStatus { code: u16, body_excerpt: String },
    #[error("failed to decode server response: {context}")]
    Decode { context: String },
    #[error("cursor '{cursor_id}' lost after exhausting retries")]
    CursorLost { cursor_id: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a fresh attempt against this or a sibling endpoint could
    /// plausibly succeed. Auth rejections and 4xx responses are not retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::HttpStatus { code, .. } => *code >= 500,
            _ => false,
        }
    }
}
