//! Client side of the SCRAM message exchange (RFC 5802, RFC 7677).
//!
//! ```text
//! client-first  n,,n=<user>,r=<client-nonce>
//! server-first  r=<client-nonce><server-nonce>,s=<salt>,i=<iterations>
//! client-final  c=biws,r=<nonce>,p=<proof>
//! server-final  v=<server-signature> | e=<error>
//! ```

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;

use super::{MIN_ITERATIONS, ScramError, ScramHash};

enum Stage {
    Initial,
    AwaitingServerFirst {
        client_first_bare: String,
    },
    AwaitingServerFinal {
        server_signature: Vec<u8>,
    },
    Done,
    Failed,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::AwaitingServerFirst { .. } => "awaiting server-first",
            Self::AwaitingServerFinal { .. } => "awaiting server-final",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// One SCRAM conversation. Not reusable.
pub(crate) struct ClientConversation {
    hash: ScramHash,
    username: String,
    password: String,
    gs2_header: String,
    client_nonce: String,
    stage: Stage,
}

impl fmt::Debug for ClientConversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConversation")
            .field("hash", &self.hash)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("stage", &self.stage.name())
            .finish_non_exhaustive()
    }
}

impl ClientConversation {
    pub(crate) fn new(
        hash: ScramHash,
        username: &str,
        password: &str,
        authz_id: &str,
        client_nonce: String,
    ) -> Self {
        let gs2_header = if authz_id.is_empty() {
            "n,,".to_owned()
        } else {
            format!("n,a={},", escape_name(authz_id))
        };
        Self {
            hash,
            username: escape_name(username),
            password: password.to_owned(),
            gs2_header,
            client_nonce,
            stage: Stage::Initial,
        }
    }

    /// Whether the server signature has been verified.
    pub(crate) fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    /// Produce the client-first message.
    pub(crate) fn client_first(&mut self) -> Result<String, ScramError> {
        if !matches!(self.stage, Stage::Initial) {
            return Err(ScramError::OutOfOrder(self.stage.name()));
        }
        let client_first_bare = format!("n={},r={}", self.username, self.client_nonce);
        let message = format!("{}{client_first_bare}", self.gs2_header);
        self.stage = Stage::AwaitingServerFirst { client_first_bare };
        Ok(message)
    }

    /// Consume a server message, returning the client-final message after
    /// server-first and `None` once server-final has been verified.
    pub(crate) fn receive(&mut self, message: &str) -> Result<Option<String>, ScramError> {
        match std::mem::replace(&mut self.stage, Stage::Failed) {
            Stage::AwaitingServerFirst { client_first_bare } => self
                .handle_server_first(&client_first_bare, message)
                .map(Some),
            Stage::AwaitingServerFinal { server_signature } => {
                handle_server_final(&server_signature, message)?;
                self.stage = Stage::Done;
                Ok(None)
            }
            stage => {
                let name = stage.name();
                self.stage = stage;
                Err(ScramError::OutOfOrder(name))
            }
        }
    }

    fn handle_server_first(
        &mut self,
        client_first_bare: &str,
        server_first: &str,
    ) -> Result<String, ScramError> {
        let ServerFirst {
            nonce,
            salt,
            iterations,
        } = ServerFirst::parse(server_first)?;

        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(ScramError::NonceMismatch);
        }
        if iterations < MIN_ITERATIONS {
            return Err(ScramError::IterationsTooLow {
                actual: iterations,
                min: MIN_ITERATIONS,
            });
        }

        let channel_binding = STANDARD.encode(self.gs2_header.as_bytes());
        let client_final_without_proof = format!("c={channel_binding},r={nonce}");
        let auth_message = format!("{client_first_bare},{server_first},{client_final_without_proof}");

        let salted_password = self.hash.hi(self.password.as_bytes(), &salt, iterations);
        let client_key = self.hash.hmac(&salted_password, b"Client Key");
        let stored_key = self.hash.digest(&client_key);
        let client_signature = self.hash.hmac(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(&client_signature)
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = self.hash.hmac(&salted_password, b"Server Key");
        let server_signature = self.hash.hmac(&server_key, auth_message.as_bytes());

        self.stage = Stage::AwaitingServerFinal { server_signature };
        Ok(format!(
            "{client_final_without_proof},p={}",
            STANDARD.encode(client_proof)
        ))
    }
}

fn handle_server_final(expected: &[u8], server_final: &str) -> Result<(), ScramError> {
    if let Some(error) = server_final.strip_prefix("e=") {
        return Err(ScramError::Server(error.to_owned()));
    }
    let verifier = server_final
        .split(',')
        .find_map(|attr| attr.strip_prefix("v="))
        .ok_or_else(|| ScramError::Malformed("server-final without verifier".to_owned()))?;
    let actual = STANDARD
        .decode(verifier)
        .map_err(|e| ScramError::Malformed(format!("server signature: {e}")))?;

    if bool::from(actual.ct_eq(expected)) {
        Ok(())
    } else {
        Err(ScramError::ServerSignatureMismatch)
    }
}

struct ServerFirst {
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

impl ServerFirst {
    fn parse(message: &str) -> Result<Self, ScramError> {
        if message.starts_with("m=") {
            return Err(ScramError::Malformed(
                "unsupported mandatory extension".to_owned(),
            ));
        }
        if let Some(error) = message.strip_prefix("e=") {
            return Err(ScramError::Server(error.to_owned()));
        }

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in message.split(',') {
            if let Some(v) = attr.strip_prefix("r=") {
                nonce = Some(v.to_owned());
            } else if let Some(v) = attr.strip_prefix("s=") {
                salt = Some(
                    STANDARD
                        .decode(v)
                        .map_err(|e| ScramError::Malformed(format!("salt: {e}")))?,
                );
            } else if let Some(v) = attr.strip_prefix("i=") {
                iterations = Some(
                    v.parse::<u32>()
                        .map_err(|e| ScramError::Malformed(format!("iteration count: {e}")))?,
                );
            }
        }

        let missing = |field: &str| ScramError::Malformed(format!("server-first without {field}"));
        Ok(Self {
            nonce: nonce.ok_or_else(|| missing("nonce"))?,
            salt: salt.ok_or_else(|| missing("salt"))?,
            iterations: iterations.ok_or_else(|| missing("iteration count"))?,
        })
    }
}

/// Escape a SCRAM `saslname`: `,` becomes `=2C` and `=` becomes `=3D`.
fn escape_name(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}
