//! Error types for SASL mechanisms.
//!
//! Every failure surfaced by [`Mechanism::begin`](crate::Mechanism::begin) or
//! [`Mechanism::step`](crate::Mechanism::step) is a [`SaslError`]. Upstream
//! credential and signing errors are wrapped transparently so their message
//! and source chain reach the caller unchanged; [`SaslError::kind`] groups
//! the variants into the coarse categories a broker client acts on.

use std::fmt;

use msk_sasl_sigv4::{CredentialsError, SignError};

use crate::mechanism::HandshakeState;
use crate::scram::ScramError;

/// Coarse classification of a [`SaslError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The mechanism is missing required configuration; fix it and retry.
    Configuration,
    /// The challenge had the wrong shape for the current step.
    ProtocolViolation,
    /// The server challenge could not be decoded or failed validation.
    ChallengeValidation,
    /// Credential retrieval, signing, or the surrounding call context failed.
    Upstream,
    /// `step` was called before `begin` or after the handshake ended.
    InvalidInvocation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::ProtocolViolation => "protocol violation",
            Self::ChallengeValidation => "challenge validation",
            Self::Upstream => "upstream",
            Self::InvalidInvocation => "invalid invocation",
        })
    }
}

/// Errors produced by SASL mechanisms.
#[derive(Debug, thiserror::Error)]
pub enum SaslError {
    /// `begin` was called without a credentials provider.
    #[error("missing required credentials provider")]
    MissingCredentialsProvider,

    /// `begin` was called without a signing region.
    #[error("missing AWS region")]
    MissingRegion,

    /// `begin` was called without a username.
    #[error("missing SCRAM username")]
    MissingUsername,

    /// The challenge was empty when data was required, or the other way round.
    #[error("invalid challenge data provided: {0}")]
    BadChallenge(&'static str),

    /// The server challenge failed to decode or carried an unexpected version.
    #[error("failed server challenge: {reason}")]
    FailedServerChallenge {
        /// What was wrong with the challenge.
        reason: String,
        /// The JSON decode error, when decoding was the problem.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// `step` was called in a state that accepts no more input.
    #[error("invalid state reached: {0}")]
    InvalidState(HandshakeState),

    /// The call context carried no connection metadata.
    #[error("missing sasl connection metadata")]
    MissingMetadata,

    /// The broker host from the connection metadata is not a valid URI authority.
    #[error("invalid broker host {host:?}: {reason}")]
    InvalidHost {
        /// The rejected host.
        host: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The credentials provider failed.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// The presigner failed.
    #[error(transparent)]
    Signing(#[from] SignError),

    /// The authentication payload could not be serialized.
    #[error("failed to encode authentication payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The call was cancelled through its [`CancelHandle`](crate::CancelHandle).
    #[error("operation cancelled")]
    Cancelled,

    /// The call outlived the deadline of its context.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The SCRAM conversation failed.
    #[error(transparent)]
    Scram(#[from] ScramError),
}

impl SaslError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredentialsProvider | Self::MissingRegion | Self::MissingUsername => {
                ErrorKind::Configuration
            }
            Self::BadChallenge(_) => ErrorKind::ProtocolViolation,
            Self::FailedServerChallenge { .. } => ErrorKind::ChallengeValidation,
            Self::InvalidState(_) => ErrorKind::InvalidInvocation,
            Self::MissingMetadata
            | Self::InvalidHost { .. }
            | Self::Credentials(_)
            | Self::Signing(_)
            | Self::Encode(_)
            | Self::Cancelled
            | Self::DeadlineExceeded => ErrorKind::Upstream,
            Self::Scram(err) => err.kind(),
        }
    }

    pub(crate) fn failed_challenge(reason: impl Into<String>) -> Self {
        Self::FailedServerChallenge {
            reason: reason.into(),
            source: None,
        }
    }
}

/// Convenience result type for SASL operations.
pub type SaslResult<T> = Result<T, SaslError>;
