use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Credentials rejected, credential artifact missing, or login endpoint unreachable.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream returned HTTP {status}")]
    Transport { status: u16 },

    #[error("unexpected payload: {0}")]
    Protocol(String),

    /// Connection refused, DNS failure, timeout.
    #[error("request failed: {0}")]
    Request(String),
}

impl UpstreamError {
    pub(crate) fn request(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Request(format!("timed out: {e}"))
        } else {
            UpstreamError::Request(e.to_string())
        }
    }
}
