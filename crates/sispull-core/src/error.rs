//! Transport-level error classification

/// Error raised while dispatching a single HTTP request.
///
/// Connection-level failures (no response at all) carry no status code and
/// are eventually converted into a synthetic 408 outcome by the transport;
/// they are never surfaced to the orchestrator as `Err`.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error while reading the body
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create from a reqwest error, stripping the URL to keep credentials
    /// in query strings out of the logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.without_url().to_string(),
        }
    }

    /// Connection-level failure: the request never produced a response.
    /// These become a synthetic 408 outcome once the retry budget is spent.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Http { status, .. } => status.is_none(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
