//! End-to-end handshake tests for `msk-sasl`.
//!
//! The broker side runs in-process: [`MockIamBroker`] verifies `AWS_MSK_IAM`
//! payloads with `verify_auth_payload` the way an MSK broker would, and
//! [`ScriptedBroker`] replays a fixed SCRAM exchange. [`run_handshake`] is the
//! loop a Kafka client runs around a [`Mechanism`].
//!
//! Run them with:
//! ```text
//! cargo test -p msk-sasl-integration
//! ```

use std::collections::VecDeque;
use std::sync::Once;

use anyhow::{Context, Result, bail, ensure};
use chrono::{DateTime, Utc};
use msk_sasl::iam::{CONNECT_ACTION, PROTOCOL_VERSION, SIGN_SERVICE};
use msk_sasl::{AuthPayload, Mechanism, SaslContext, SaslError};
use msk_sasl_sigv4::{StaticSecretKeyProvider, VerifiedPayload, verify_auth_payload};
use tracing::debug;

static INIT: Once = Once::new();

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Server half of a SASL exchange.
pub trait BrokerSide: Send {
    /// Answer a client response with the next challenge.
    fn respond(&mut self, client_response: &str) -> Result<String>;
}

/// Why [`run_handshake`] stopped.
#[derive(Debug)]
pub enum HandshakeFailure {
    /// The mechanism rejected a challenge or could not produce a response.
    Client(SaslError),
    /// The broker rejected a client response.
    Broker(anyhow::Error),
}

/// Drive `mechanism` against `broker` until it reports done.
///
/// The broker's first challenge is always empty.
pub async fn run_handshake(
    mechanism: &mut dyn Mechanism,
    ctx: &SaslContext,
    broker: &mut dyn BrokerSide,
) -> Result<(), HandshakeFailure> {
    mechanism
        .begin(ctx, "", "", "")
        .await
        .map_err(HandshakeFailure::Client)?;
    drive(mechanism, ctx, broker).await
}

/// Like [`run_handshake`] but for a mechanism that was already begun.
pub async fn drive(
    mechanism: &mut dyn Mechanism,
    ctx: &SaslContext,
    broker: &mut dyn BrokerSide,
) -> Result<(), HandshakeFailure> {
    let mut challenge = String::new();
    loop {
        let response = mechanism
            .step(ctx, &challenge)
            .await
            .map_err(HandshakeFailure::Client)?;
        if mechanism.done() {
            return Ok(());
        }
        challenge = broker
            .respond(&response)
            .map_err(HandshakeFailure::Broker)?;
    }
}

/// An MSK broker accepting `AWS_MSK_IAM`.
#[derive(Debug)]
pub struct MockIamBroker {
    host: String,
    secrets: StaticSecretKeyProvider,
    now: DateTime<Utc>,
    version: String,
    /// Identities of every accepted payload.
    pub accepted: Vec<VerifiedPayload>,
}

impl MockIamBroker {
    /// A broker at `host` that knows one access key and evaluates expiry at `now`.
    #[must_use]
    pub fn new(host: &str, access_key_id: &str, secret_key: &str, now: DateTime<Utc>) -> Self {
        Self {
            host: host.to_owned(),
            secrets: StaticSecretKeyProvider::new([(
                access_key_id.to_owned(),
                secret_key.to_owned(),
            )]),
            now,
            version: PROTOCOL_VERSION.to_owned(),
            accepted: Vec::new(),
        }
    }

    /// Answer with another protocol version than the client's.
    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_owned();
        self
    }

    /// Check a step-one payload, returning the verified identity.
    pub fn authenticate(&self, payload: &AuthPayload) -> Result<VerifiedPayload> {
        ensure!(
            payload.get("version") == Some(PROTOCOL_VERSION),
            "unsupported payload version {:?}",
            payload.get("version")
        );
        ensure!(
            payload.get("action") == Some(CONNECT_ACTION),
            "unexpected action {:?}",
            payload.get("action")
        );
        ensure!(
            payload.get("user-agent").is_some(),
            "payload has no user-agent"
        );

        let verified = verify_auth_payload(payload.fields(), &self.secrets, SIGN_SERVICE, self.now)
            .context("signature verification failed")?;
        if verified.host != self.host {
            bail!("payload signed for {} but broker is {}", verified.host, self.host);
        }
        Ok(verified)
    }
}

impl BrokerSide for MockIamBroker {
    fn respond(&mut self, client_response: &str) -> Result<String> {
        let payload = AuthPayload::from_json(client_response).context("payload is not JSON")?;
        let verified = self.authenticate(&payload)?;
        debug!(access_key_id = %verified.access_key_id, "broker accepted payload");
        self.accepted.push(verified);

        Ok(serde_json::json!({
            "version": self.version,
            "request-id": uuid::Uuid::new_v4().to_string(),
        })
        .to_string())
    }
}

/// A broker replaying fixed server messages, checking each client message.
#[derive(Debug, Default)]
pub struct ScriptedBroker {
    script: VecDeque<(String, String)>,
}

impl ScriptedBroker {
    /// Expect `client`, then answer with `server`.
    #[must_use]
    pub fn expect(mut self, client: &str, server: &str) -> Self {
        self.script.push_back((client.to_owned(), server.to_owned()));
        self
    }
}

impl BrokerSide for ScriptedBroker {
    fn respond(&mut self, client_response: &str) -> Result<String> {
        let Some((expected, answer)) = self.script.pop_front() else {
            bail!("unexpected client message {client_response:?}");
        };
        ensure!(
            client_response == expected,
            "expected {expected:?}, got {client_response:?}"
        );
        Ok(answer)
    }
}

mod test_iam_handshake;
mod test_scram_handshake;
