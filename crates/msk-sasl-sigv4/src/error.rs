//! Error types for credential retrieval, presigning and payload verification.
//!
//! Each stage of the IAM handshake has its own error enum so that callers can
//! tell a credential problem apart from a signing problem without inspecting
//! messages.

use chrono::{DateTime, Utc};

/// Errors returned by a [`CredentialsProvider`](crate::CredentialsProvider).
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// No credentials could be found (e.g. environment variables unset).
    #[error("credentials not loaded: {0}")]
    NotLoaded(String),

    /// The credentials were found but are past their expiration time.
    #[error("credentials expired at {0}")]
    Expired(DateTime<Utc>),

    /// The underlying provider failed for another reason.
    #[error("credentials provider error: {0}")]
    Provider(String),
}

/// Errors that can occur while presigning a request.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The request URI has no authority to sign as the `host` header.
    #[error("request has no host to sign")]
    MissingHost,

    /// A signing scope component (region or service) is empty.
    #[error("missing signing scope component: {0}")]
    MissingScope(&'static str),

    /// The presigned URL could not be assembled or parsed back.
    #[error("malformed presigned URL: {0}")]
    MalformedUrl(String),

    /// A signed header value is not visible ASCII.
    #[error("invalid signed header {name}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors that can occur while verifying an IAM authentication payload.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A required payload field is absent.
    #[error("missing required payload field: {0}")]
    MissingField(String),

    /// The signing algorithm is not supported (only AWS4-HMAC-SHA256 is supported).
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The `x-amz-credential` field does not match
    /// `AKID/date/region/service/aws4_request`.
    #[error("invalid credential format")]
    InvalidCredential,

    /// The credential scope names a different service than the broker expects.
    #[error("credential scope service mismatch: expected {expected}, got {actual}")]
    ServiceMismatch {
        /// Service the verifier was configured for.
        expected: String,
        /// Service found in the credential scope.
        actual: String,
    },

    /// The access key ID was not found in the secret store.
    #[error("access key not found: {0}")]
    AccessKeyNotFound(String),

    /// `x-amz-date` or `x-amz-expires` could not be parsed.
    #[error("invalid field value for {0}")]
    InvalidField(&'static str),

    /// The payload is past `x-amz-date` + `x-amz-expires`.
    #[error("authentication payload has expired")]
    Expired,

    /// The computed signature does not match the provided signature.
    #[error("signature does not match")]
    SignatureDoesNotMatch,
}
