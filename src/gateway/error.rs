//! Error types for calls to the inference service.
//!
//! These never escape [`InferenceGateway`](super::InferenceGateway): the
//! gateway turns them into degraded results. They are still typed so tests
//! and logs can tell a timeout from a bad credential.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The request never produced an HTTP response.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// The service answered with a non-success status.
    pub const HTTP_ERROR: &str = "HTTP_ERROR";

    /// The response body did not contain usable text.
    pub const BAD_RESPONSE: &str = "BAD_RESPONSE";

    /// The call exceeded its deadline.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
}

/// Errors produced by an [`InferenceService`](super::InferenceService).
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level failure (DNS, connect, TLS, body read).
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Non-success HTTP status.
    #[error("[{}] HTTP {status}: {message}", error_codes::HTTP_ERROR)]
    Http {
        /// Status code returned by the service.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },

    /// Successful status but no text could be extracted.
    #[error("[{}] {}", error_codes::BAD_RESPONSE, .0)]
    Response(String),

    /// Deadline exceeded.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),
}

impl GatewayError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Http { .. } => error_codes::HTTP_ERROR,
            Self::Response(_) => error_codes::BAD_RESPONSE,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
        }
    }

    /// Returns true if the failure is transient.
    ///
    /// The gateway does not retry; this is exposed for callers that want to.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Response(_) => false,
        }
    }

    /// True when the service rejected the credential that was sent.
    ///
    /// Gemini answers an invalid key with 400 `API key not valid`, so that
    /// counts alongside 401/403.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Http { status: 401 | 403, .. } => true,
            Self::Http { status: 400, message } => message.contains("API key"),
            _ => false,
        }
    }
}
