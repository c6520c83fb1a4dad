//! Error types surfaced by the request client.
//!
//! The request client is the only layer that propagates failures to callers;
//! the store and the read cache degrade to "no data" instead. Variants are
//! matchable so callers can redirect to login on `AuthExpired` without
//! string-sniffing messages.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
  /// No bearer token in the persistent store; the request was never sent.
  #[error("No authentication token available")]
  MissingToken,

  /// The backend answered 401; stored credentials have already been cleared.
  #[error("Authentication expired")]
  AuthExpired,

  /// The request did not complete within its timeout and was aborted.
  #[error("Request timeout after {0}ms")]
  Timeout(u64),

  /// Non-2xx status other than 401.
  #[error("HTTP {status}: {message}")]
  Status { status: u16, message: String },

  /// The body was not JSON; carries a truncated excerpt for diagnostics.
  #[error("Non-JSON response: {excerpt}")]
  MalformedResponse { excerpt: String },

  /// Connection-level failure (DNS, refused, reset, ...).
  #[error("Network error: {0}")]
  Network(String),

  /// The HTTP client itself could not be constructed.
  #[error("Failed to build HTTP client: {0}")]
  Client(String),
}

impl ApiError {
  /// Whether the retry policy may re-attempt after this failure.
  ///
  /// Auth expiry and local precondition failures are terminal; everything
  /// transport-shaped is fair game for backoff.
  pub fn is_retryable(&self) -> bool {
    match self {
      ApiError::MissingToken | ApiError::AuthExpired | ApiError::Client(_) => false,
      ApiError::Timeout(_)
      | ApiError::Status { .. }
      | ApiError::MalformedResponse { .. }
      | ApiError::Network(_) => true,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      // The elapsed budget is not recoverable from the error itself.
      ApiError::Timeout(0)
    } else {
      ApiError::Network(err.to_string())
    }
  }
}
