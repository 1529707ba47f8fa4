//! `SCRAM-SHA-256` and `SCRAM-SHA-512` client mechanisms.
//!
//! Same begin/step contract as [`IamMechanism`](crate::IamMechanism), with
//! identity taken from the username and password passed to `begin`:
//!
//! 1. `step("")` returns the client-first message.
//! 2. `step(server-first)` returns the client-final message with the proof.
//! 3. `step(server-final)` verifies the server signature and returns `""`.

mod conversation;

use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;

use crate::context::SaslContext;
use crate::error::{ErrorKind, SaslError, SaslResult};
use crate::mechanism::{HandshakeState, Mechanism, MechanismKind};
use conversation::ClientConversation;

/// Lowest iteration count accepted from a server.
pub const MIN_ITERATIONS: u32 = 4096;

/// Errors raised by the SCRAM conversation.
#[derive(Debug, thiserror::Error)]
pub enum ScramError {
    /// A server message could not be parsed.
    #[error("malformed SCRAM message: {0}")]
    Malformed(String),

    /// The server nonce does not extend the client nonce.
    #[error("server nonce does not extend client nonce")]
    NonceMismatch,

    /// The server asked for fewer iterations than allowed.
    #[error("iteration count {actual} below minimum {min}")]
    IterationsTooLow {
        /// Requested by the server.
        actual: u32,
        /// Lowest accepted.
        min: u32,
    },

    /// The server sent an `e=` attribute.
    #[error("server rejected authentication: {0}")]
    Server(String),

    /// The server signature did not verify.
    #[error("server signature mismatch")]
    ServerSignatureMismatch,

    /// A message arrived in the wrong conversation stage.
    #[error("unexpected message in stage {0}")]
    OutOfOrder(&'static str),
}

impl ScramError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) => ErrorKind::ProtocolViolation,
            Self::NonceMismatch
            | Self::IterationsTooLow { .. }
            | Self::Server(_)
            | Self::ServerSignatureMismatch => ErrorKind::ChallengeValidation,
            Self::OutOfOrder(_) => ErrorKind::InvalidInvocation,
        }
    }
}

/// Hash function of a SCRAM variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramHash {
    /// `SCRAM-SHA-256`
    Sha256,
    /// `SCRAM-SHA-512`
    Sha512,
}

impl ScramHash {
    /// The corresponding [`MechanismKind`].
    #[must_use]
    pub fn kind(self) -> MechanismKind {
        match self {
            Self::Sha256 => MechanismKind::ScramSha256,
            Self::Sha512 => MechanismKind::ScramSha512,
        }
    }

    pub(crate) fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .expect("HMAC can accept keys of any length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(key)
                    .expect("HMAC can accept keys of any length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    pub(crate) fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// `Hi(password, salt, i)`, which is PBKDF2 sized to one digest.
    pub(crate) fn hi(self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        match self {
            Self::Sha256 => {
                let mut salted = [0u8; 32];
                pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut salted);
                salted.to_vec()
            }
            Self::Sha512 => {
                let mut salted = [0u8; 64];
                pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut salted);
                salted.to_vec()
            }
        }
    }
}

/// Client side of a SCRAM handshake.
///
/// # Examples
///
/// ```
/// use msk_sasl::{Mechanism, SaslContext, ScramHash, ScramMechanism};
///
/// # tokio_test::block_on(async {
/// let mut mechanism = ScramMechanism::new(ScramHash::Sha512);
/// let ctx = SaslContext::new();
/// mechanism.begin(&ctx, "alice", "secret", "").await.unwrap();
///
/// let client_first = mechanism.step(&ctx, "").await.unwrap();
/// assert!(client_first.starts_with("n,,n=alice,r="));
/// # });
/// ```
#[derive(Debug)]
pub struct ScramMechanism {
    hash: ScramHash,
    client_nonce: Option<String>,
    conversation: Option<ClientConversation>,
    state: HandshakeState,
}

impl ScramMechanism {
    /// Create a mechanism for the given hash.
    #[must_use]
    pub fn new(hash: ScramHash) -> Self {
        Self {
            hash,
            client_nonce: None,
            conversation: None,
            state: HandshakeState::Uninitialized,
        }
    }

    /// Use a fixed client nonce instead of a random one.
    #[must_use]
    pub fn with_client_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.client_nonce = Some(nonce.into());
        self
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn fail(&mut self, err: SaslError) -> SaslError {
        debug!(
            mechanism = self.name(),
            state = %self.state,
            kind = %err.kind(),
            error = %err,
            "handshake failed"
        );
        self.state = HandshakeState::Failed;
        self.conversation = None;
        err
    }

    fn conversation(&mut self) -> SaslResult<&mut ClientConversation> {
        self.conversation
            .as_mut()
            .ok_or(SaslError::InvalidState(self.state))
    }
}

#[async_trait::async_trait]
impl Mechanism for ScramMechanism {
    fn name(&self) -> &'static str {
        self.hash.kind().name()
    }

    async fn begin(
        &mut self,
        _ctx: &SaslContext,
        username: &str,
        password: &str,
        authz_id: &str,
    ) -> SaslResult<()> {
        if self.state != HandshakeState::Uninitialized {
            return Err(SaslError::InvalidState(self.state));
        }
        if username.is_empty() {
            return Err(SaslError::MissingUsername);
        }

        let nonce = self
            .client_nonce
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        self.conversation = Some(ClientConversation::new(
            self.hash, username, password, authz_id, nonce,
        ));
        self.state = HandshakeState::AwaitingInitialRequest;
        debug!(mechanism = self.name(), "handshake started");
        Ok(())
    }

    async fn step(&mut self, _ctx: &SaslContext, challenge: &str) -> SaslResult<String> {
        let result = match self.state {
            HandshakeState::AwaitingInitialRequest => {
                if !challenge.is_empty() {
                    return Err(self.fail(SaslError::BadChallenge(
                        "challenge must be empty for initial request",
                    )));
                }
                self.conversation()
                    .and_then(|c| c.client_first().map_err(SaslError::from))
            }
            HandshakeState::AwaitingServerResponse => {
                if challenge.is_empty() {
                    return Err(self.fail(SaslError::BadChallenge(
                        "challenge must not be empty for server response",
                    )));
                }
                self.conversation().and_then(|c| {
                    c.receive(challenge)
                        .map(Option::unwrap_or_default)
                        .map_err(SaslError::from)
                })
            }
            state => return Err(SaslError::InvalidState(state)),
        };

        match result {
            Ok(response) => {
                let finished = self.conversation.as_ref().is_some_and(ClientConversation::is_done);
                self.state = if finished {
                    debug!(mechanism = self.name(), "server signature verified");
                    HandshakeState::Complete
                } else {
                    HandshakeState::AwaitingServerResponse
                };
                Ok(response)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn done(&self) -> bool {
        self.state == HandshakeState::Complete
    }
}
