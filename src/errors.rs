use crate::net::Response;

/// Failures reported by a [`Transport`](crate::net::Transport).
///
/// Timeouts and connection problems are a transport concern; this layer only
/// sees them as one of these outcomes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Errors surfaced by [`Session::perform`](crate::Session::perform).
///
/// Chain errors carry the last response that was received (if any), so callers
/// can still inspect what the server said before things went wrong.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Too many redirects ({hops} hops)")]
    TooManyRedirects {
        hops: usize,
        last: Option<Box<Response>>,
    },

    #[error("Transport failure: {source}")]
    Transport {
        source: TransportError,
        last: Option<Box<Response>>,
    },

    #[error("Failing status code {} for {}", .0.status, .0.url)]
    FailingStatus(Box<Response>),

    #[error("Invalid redirect location: {0}")]
    InvalidLocation(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl NetError {
    /// Returns the last response received before the failure, if there was one.
    pub fn last_response(&self) -> Option<&Response> {
        match self {
            NetError::TooManyRedirects { last, .. } | NetError::Transport { last, .. } => last.as_deref(),
            NetError::FailingStatus(response) => Some(response),
            NetError::InvalidLocation(_) | NetError::Cancelled => None,
        }
    }
}
