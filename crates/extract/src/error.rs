use thiserror::Error;

/// Failure of a single annotation call. Always recoverable by the caller.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("annotation request failed: {0}")]
    Transport(reqwest::Error),

    #[error("annotation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed annotation response: {reason}")]
    Malformed { reason: String, raw: String },
}

// The request URL carries the API token in its query string.
impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        ExtractError::Transport(e.without_url())
    }
}

impl ExtractError {
    /// Raw response body, when there was one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            ExtractError::Transport(_) => None,
            ExtractError::Status { body, .. } => Some(body),
            ExtractError::Malformed { raw, .. } => Some(raw),
        }
    }
}
