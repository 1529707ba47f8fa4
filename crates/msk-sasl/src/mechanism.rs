//! The SASL mechanism capability shared by every client mechanism.
//!
//! A broker client drives a mechanism with one [`Mechanism::begin`] followed
//! by [`Mechanism::step`] calls until [`Mechanism::done`] reports `true` or a
//! step fails. Instances are single-use: after completion or failure a new
//! instance must be created for the next connection attempt.
//!
//! # Object safety
//!
//! The trait uses `#[async_trait]` so connection configuration can pick an
//! implementation at runtime and hold it as `Box<dyn Mechanism>`.

use std::fmt;

use crate::context::SaslContext;
use crate::error::SaslResult;

/// Progress of a single handshake.
///
/// `Uninitialized` is deliberately distinct from the first real state so that
/// a `step` without a prior `begin` is an invalid invocation rather than the
/// start of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandshakeState {
    /// `begin` has not succeeded yet.
    #[default]
    Uninitialized,
    /// Waiting for the empty initial challenge.
    AwaitingInitialRequest,
    /// Waiting for the server's response to the client payload.
    AwaitingServerResponse,
    /// The handshake finished successfully.
    Complete,
    /// The handshake failed; the instance cannot be reused.
    Failed,
}

impl HandshakeState {
    /// Whether no further step is accepted in this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingInitialRequest => "awaiting initial request",
            Self::AwaitingServerResponse => "awaiting server response",
            Self::Complete => "complete",
            Self::Failed => "failed",
        })
    }
}

/// A pluggable client-side SASL mechanism.
#[async_trait::async_trait]
pub trait Mechanism: Send + Sync + fmt::Debug {
    /// The SASL mechanism name announced to the broker.
    fn name(&self) -> &'static str;

    /// Prepare the mechanism for a handshake.
    ///
    /// Mechanisms that derive identity elsewhere may ignore the user
    /// credentials.
    async fn begin(
        &mut self,
        ctx: &SaslContext,
        username: &str,
        password: &str,
        authz_id: &str,
    ) -> SaslResult<()>;

    /// Consume a server challenge and produce the next client response.
    async fn step(&mut self, ctx: &SaslContext, challenge: &str) -> SaslResult<String>;

    /// Whether the handshake has completed successfully.
    fn done(&self) -> bool;
}

/// The mechanisms this crate implements, by SASL name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    /// `AWS_MSK_IAM`
    AwsMskIam,
    /// `SCRAM-SHA-256`
    ScramSha256,
    /// `SCRAM-SHA-512`
    ScramSha512,
}

impl MechanismKind {
    /// Get the mechanism name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AwsMskIam => crate::iam::MECHANISM_NAME,
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }

    /// Parse a mechanism from its name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AWS_MSK_IAM" => Some(Self::AwsMskIam),
            "SCRAM-SHA-256" => Some(Self::ScramSha256),
            "SCRAM-SHA-512" => Some(Self::ScramSha512),
            _ => None,
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
