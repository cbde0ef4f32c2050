//! Error type shared by the API client and the session services.

use thiserror::Error;

/// Shown when a failure carries no message of its own.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Every way a request against the health API can fail.
///
/// `Display` renders the message meant for the user, so `Http` prints the
/// server's `detail` verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Rejected locally before anything was sent.
    #[error("{0}")]
    Validation(String),

    /// The token source could not produce a credential.
    #[error("{0}")]
    Auth(String),

    /// No response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// `detail` from the response body, or a status-coded fallback.
        message: String,
    },

    /// The response body was not the JSON we expected.
    #[error("Invalid response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Message to surface to the user, never empty.
    pub fn display_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_detail_only() {
        let err = ApiError::Http {
            status: 500,
            message: "model unavailable".to_string(),
        };
        assert_eq!(err.display_message(), "model unavailable");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn empty_message_falls_back() {
        let err = ApiError::Auth(String::new());
        assert_eq!(err.display_message(), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(err.status(), None);
    }
}
