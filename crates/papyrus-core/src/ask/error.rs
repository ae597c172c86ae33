use std::fmt;

use serde_json::Value;

/// Categories of failures while asking a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskErrorKind {
    /// The streaming exchange could not be opened. Triggers the fallback.
    TransportOpen,
    /// Connection or read failure after the exchange started.
    Transport,
    /// The backend reported a failure (`error` event or `detail` body).
    ServerReported,
    /// A fallback response body did not have the expected shape.
    Parse,
}

impl fmt::Display for AskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AskErrorKind::TransportOpen => write!(f, "transport_open"),
            AskErrorKind::Transport => write!(f, "transport"),
            AskErrorKind::ServerReported => write!(f, "server_reported"),
            AskErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error with kind and optional raw details.
#[derive(Debug, Clone, PartialEq)]
pub struct AskError {
    pub kind: AskErrorKind,
    /// One-line summary suitable for display.
    pub message: String,
    /// Raw response body, when there was one.
    pub details: Option<String>,
}

impl AskError {
    pub fn new(kind: AskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn transport_open(message: impl Into<String>) -> Self {
        Self::new(AskErrorKind::TransportOpen, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(AskErrorKind::ServerReported, message)
    }

    /// Builds a server-reported error from a non-success response.
    ///
    /// The backend's `{"detail": "..."}` body becomes the message verbatim;
    /// anything else falls back to `HTTP <status>`.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| match json.get("detail") {
                Some(Value::String(detail)) => Some(detail.clone()),
                Some(other) if !other.is_null() => Some(other.to_string()),
                _ => None,
            });

        Self {
            kind: AskErrorKind::ServerReported,
            message: detail.unwrap_or_else(|| format!("HTTP {status}")),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }
}

impl fmt::Display for AskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AskError {}

pub type AskResult<T> = std::result::Result<T, AskError>;

/// Maps a reqwest failure onto an [`AskError`] of the given kind.
pub fn classify_reqwest_error(kind: AskErrorKind, e: &reqwest::Error) -> AskError {
    let message = if e.is_timeout() {
        format!("Request timed out: {e}")
    } else if e.is_connect() {
        format!("Connection failed: {e}")
    } else if e.is_decode() {
        return AskError::new(AskErrorKind::Parse, format!("Invalid response: {e}"));
    } else if e.is_request() {
        format!("Request error: {e}")
    } else {
        format!("Network error: {e}")
    };
    AskError::new(kind, message)
}
