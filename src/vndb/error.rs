use thiserror::Error;

/// Failure below the HTTP status line, before the server answered.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The secure channel never came up (TLS handshake, refused, reset).
    /// Recovered by pausing and re-running the whole call, outside the
    /// bounded retry budget.
    #[error("secure channel failure: {0}")]
    SecureChannel(String),

    /// The request went out but the exchange died later (timeout,
    /// truncated body). Retried within the bounded budget.
    #[error("transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::SecureChannel(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Errors surfaced by the VNDB API client.
///
/// `is_retryable()` picks out the statuses worth another attempt (the
/// server's own rate limit and server-side faults); everything else is
/// definitive for the current call.
#[derive(Debug, Error)]
pub enum VndbError {
    #[error("HTTP {status} from {path}")]
    Status { status: u16, path: String },

    #[error("{source} on {path}")]
    Transport {
        source: TransportError,
        path: String,
    },

    #[error("gave up on {path} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        path: String,
        last_error: String,
    },

    /// The server rejected a well-formed update (validation failure,
    /// unknown entry). Not retried; the record lands in the failure log.
    #[error("update rejected with HTTP {status} on {path}: {body}")]
    Rejected {
        status: u16,
        path: String,
        body: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VndbError {
    /// Whether another attempt inside the bounded retry budget makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            VndbError::Status { status, .. } => *status == 429 || *status >= 500,
            VndbError::Transport { source, .. } => matches!(source, TransportError::Other(_)),
            _ => false,
        }
    }

    /// Whether this is the transport fault handled by the unbounded
    /// pause-and-restart recovery path.
    pub fn is_secure_channel(&self) -> bool {
        matches!(
            self,
            VndbError::Transport {
                source: TransportError::SecureChannel(_),
                ..
            }
        )
    }
}
