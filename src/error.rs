//! Error types for the x402 payment handshake
//!
//! Every failure the client engine or the server guard can produce is one of the
//! variants of [`X402Error`]. Each variant carries a stable machine-readable
//! [`code`](X402Error::code), an optional HTTP-like [`status`](X402Error::status)
//! and, for server-rejected outcomes, structured [`details`](X402Error::details).
//!
//! Only the externally owned capabilities (the payment executor and the payment
//! verifier) may surface opaque foreign error values; they travel as [`BoxError`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

/// Opaque error type produced by external capabilities
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for x402 operations
pub type Result<T> = std::result::Result<T, X402Error>;

/// Closed taxonomy of x402 failures
#[derive(Error, Debug)]
pub enum X402Error {
    /// The 402 challenge is malformed or incomplete
    #[error("Invalid 402 response: {message}")]
    InvalidChallenge { message: String },

    /// The challenge asks for more than the effective payment ceiling
    #[error("Payment amount {requested} exceeds maximum allowed {limit}")]
    MaxPaymentExceeded { requested: Decimal, limit: Decimal },

    /// The challenge expired before it could be paid
    #[error("Payment window for {reference} expired at {expired_at}")]
    PaymentExpired {
        reference: String,
        expired_at: DateTime<Utc>,
    },

    /// Missing or invalid configuration
    ///
    /// `field` names the offending setting. A 402 met without a payment
    /// executor reports `field == "executor"`.
    #[error("Configuration error for '{field}': {message}")]
    Configuration { field: String, message: String },

    /// Transport-level failure
    #[error("{message}")]
    Network {
        message: String,
        timed_out: bool,
        #[source]
        source: Option<BoxError>,
    },

    /// The server asked the client to slow down
    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64, limit: u64 },

    /// Generic server-rejected outcome
    #[error("{message}")]
    Api {
        message: String,
        code: String,
        status: Option<u16>,
        details: Value,
    },

    /// The payment reference was already consumed
    #[error("Payment reference already used: {reference}")]
    ReplayDetected { reference: String },

    /// The verifier answered that the proof does not satisfy the requirement
    #[error("Payment verification failed for {reference}")]
    VerificationFailed { reference: String },

    /// The verifier could not be consulted
    #[error("Payment verification error: {message}")]
    VerificationError { message: String },

    /// Failure raised by the payment executor, passed through untouched
    #[error("Payment executor failed: {0}")]
    Executor(#[source] BoxError),
}

impl X402Error {
    /// Create an invalid challenge error
    pub fn invalid_challenge(message: impl Into<String>) -> Self {
        Self::InvalidChallenge {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a network error without an underlying cause
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: false,
            source: None,
        }
    }

    /// Create a verification error
    pub fn verification_error(message: impl Into<String>) -> Self {
        Self::VerificationError {
            message: message.into(),
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidChallenge { .. } => "INVALID_402",
            Self::MaxPaymentExceeded { .. } => "MAX_PAYMENT_EXCEEDED",
            Self::PaymentExpired { .. } => "PAYMENT_EXPIRED",
            Self::Configuration { .. } => "CONFIG_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Api { code, .. } => code,
            Self::ReplayDetected { .. } => "REPLAY_ATTACK",
            Self::VerificationFailed { .. } => "VERIFICATION_FAILED",
            Self::VerificationError { .. } => "VERIFICATION_ERROR",
            Self::Executor(_) => "EXECUTOR_ERROR",
        }
    }

    /// HTTP-like status associated with the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::MaxPaymentExceeded { .. }
            | Self::ReplayDetected { .. }
            | Self::VerificationFailed { .. }
            | Self::VerificationError { .. } => Some(402),
            Self::PaymentExpired { .. } => Some(410),
            Self::RateLimited { .. } => Some(429),
            Self::Api { status, .. } => *status,
            Self::InvalidChallenge { .. }
            | Self::Configuration { .. }
            | Self::Network { .. }
            | Self::Executor(_) => None,
        }
    }

    /// Structured details returned by the server
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Api { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Whether this is a transport timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network { timed_out: true, .. })
    }
}

impl From<reqwest::Error> for X402Error {
    fn from(err: reqwest::Error) -> Self {
        let timed_out = err.is_timeout();
        let message = if timed_out {
            "Request timed out".to_string()
        } else {
            format!("Network request failed: {}", err)
        };
        Self::Network {
            message,
            timed_out,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for X402Error {
    fn into_response(self) -> axum::response::Response {
        let status = self
            .status()
            .and_then(|s| axum::http::StatusCode::from_u16(s).ok())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Self::VerificationError { message } = &self {
            body["message"] = Value::String(message.clone());
        }

        (status, axum::Json(body)).into_response()
    }
}
