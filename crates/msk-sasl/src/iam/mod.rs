//! The `AWS_MSK_IAM` SASL mechanism.
//!
//! The handshake takes two round trips:
//!
//! 1. The broker sends an empty challenge. The client answers with a JSON
//!    payload carrying a SigV4-presigned `kafka-cluster:Connect` request for
//!    the broker host.
//! 2. The broker answers with `{"version": ..., "request-id": ...}`. The
//!    client checks the version and sends an empty response.
//!
//! ```text
//! Uninitialized --begin--> AwaitingInitialRequest --step("")--> AwaitingServerResponse
//!                                                                   |
//!                                              step(server json) --> Complete
//! any error in step ---------------------------------------------> Failed
//! ```

mod challenge;
mod payload;

use std::sync::Arc;
use std::time::Duration;

use msk_sasl_sigv4::{CredentialsProvider, Presigner, SigV4Presigner};
use tracing::debug;

pub use challenge::{ServerChallenge, validate_server_challenge};
pub use payload::AuthPayload;

use crate::clock::{Clock, SystemClock};
use crate::config::IamConfig;
use crate::context::SaslContext;
use crate::error::{SaslError, SaslResult};
use crate::mechanism::{HandshakeState, Mechanism};
use payload::PayloadBuilder;

/// SASL mechanism name announced to the broker.
pub const MECHANISM_NAME: &str = "AWS_MSK_IAM";

/// SigV4 service name used for signing.
pub const SIGN_SERVICE: &str = "kafka-cluster";

/// Payload protocol version; the broker must echo it.
pub const PROTOCOL_VERSION: &str = "2020_10_22";

/// The IAM action being authorized.
pub const CONNECT_ACTION: &str = "kafka-cluster:Connect";

/// Presigned payload lifetime used when none is configured.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(300);

pub(crate) const SIGN_SCHEME: &str = "kafka";

/// Client side of the `AWS_MSK_IAM` handshake.
///
/// Identity comes from the credentials provider; the username and password
/// passed to `begin` are ignored.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use msk_sasl::{IamConfig, IamMechanism, Mechanism, SaslContext, SaslMetadata};
/// use msk_sasl_sigv4::StaticCredentialsProvider;
///
/// # tokio_test::block_on(async {
/// let config = IamConfig::builder().region("us-east-1".into()).build();
/// let mut mechanism = IamMechanism::new(config).with_credentials(Arc::new(
///     StaticCredentialsProvider::new("AKID", "SECRET", None),
/// ));
///
/// let ctx = SaslContext::new().with_metadata(SaslMetadata::new("b-1.example.com", Some(9098)));
/// mechanism.begin(&ctx, "", "", "").await.unwrap();
/// let payload = mechanism.step(&ctx, "").await.unwrap();
/// assert!(payload.contains("\"action\":\"kafka-cluster:Connect\""));
///
/// mechanism
///     .step(&ctx, r#"{"version":"2020_10_22","request-id":"r-1"}"#)
///     .await
///     .unwrap();
/// assert!(mechanism.done());
/// # });
/// ```
#[derive(Debug)]
pub struct IamMechanism {
    credentials: Option<Arc<dyn CredentialsProvider>>,
    presigner: Arc<dyn Presigner>,
    clock: Arc<dyn Clock>,
    region: String,
    expiry: Duration,
    user_agent: String,
    state: HandshakeState,
}

impl IamMechanism {
    /// Create a mechanism from configuration, signing with [`SigV4Presigner`]
    /// and the system clock. A credentials provider must be attached with
    /// [`with_credentials`](Self::with_credentials) before `begin`.
    #[must_use]
    pub fn new(config: IamConfig) -> Self {
        let expiry = config.effective_expiry();
        Self {
            credentials: None,
            presigner: Arc::new(SigV4Presigner::new()),
            clock: Arc::new(SystemClock),
            region: config.region,
            expiry,
            user_agent: config.user_agent,
            state: HandshakeState::Uninitialized,
        }
    }

    /// Attach the credentials provider.
    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Replace the presigner.
    #[must_use]
    pub fn with_presigner(mut self, presigner: Arc<dyn Presigner>) -> Self {
        self.presigner = presigner;
        self
    }

    /// Replace the signing clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The payload lifetime in effect.
    #[must_use]
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    fn fail(&mut self, err: SaslError) -> SaslError {
        debug!(
            mechanism = MECHANISM_NAME,
            state = %self.state,
            kind = %err.kind(),
            error = %err,
            "handshake failed"
        );
        self.state = HandshakeState::Failed;
        err
    }

    async fn initial_response(&mut self, ctx: &SaslContext, challenge: &str) -> SaslResult<String> {
        if !challenge.is_empty() {
            return Err(self.fail(SaslError::BadChallenge(
                "challenge must be empty for initial request",
            )));
        }
        let Some(credentials) = self.credentials.clone() else {
            return Err(self.fail(SaslError::MissingCredentialsProvider));
        };

        let built = PayloadBuilder {
            region: &self.region,
            expiry: self.expiry,
            user_agent: &self.user_agent,
            credentials: credentials.as_ref(),
            presigner: self.presigner.as_ref(),
            clock: self.clock.as_ref(),
        }
        .build(ctx)
        .await
        .and_then(|payload| payload.to_json());

        match built {
            Ok(json) => {
                self.state = HandshakeState::AwaitingServerResponse;
                debug!(mechanism = MECHANISM_NAME, "sent authentication payload");
                Ok(json)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn server_response(&mut self, challenge: &str) -> SaslResult<String> {
        if challenge.is_empty() {
            return Err(self.fail(SaslError::BadChallenge(
                "challenge must not be empty for server response",
            )));
        }

        match validate_server_challenge(challenge) {
            Ok(response) => {
                debug!(
                    mechanism = MECHANISM_NAME,
                    request_id = %response.request_id,
                    "server accepted authentication"
                );
                self.state = HandshakeState::Complete;
                Ok(String::new())
            }
            Err(err) => Err(self.fail(err)),
        }
    }
}

#[async_trait::async_trait]
impl Mechanism for IamMechanism {
    fn name(&self) -> &'static str {
        MECHANISM_NAME
    }

    async fn begin(
        &mut self,
        _ctx: &SaslContext,
        _username: &str,
        _password: &str,
        _authz_id: &str,
    ) -> SaslResult<()> {
        if self.state != HandshakeState::Uninitialized {
            return Err(SaslError::InvalidState(self.state));
        }
        if self.credentials.is_none() {
            return Err(SaslError::MissingCredentialsProvider);
        }
        if self.region.is_empty() {
            return Err(SaslError::MissingRegion);
        }

        self.state = HandshakeState::AwaitingInitialRequest;
        debug!(
            mechanism = MECHANISM_NAME,
            region = %self.region,
            expiry_secs = self.expiry.as_secs(),
            "handshake started"
        );
        Ok(())
    }

    async fn step(&mut self, ctx: &SaslContext, challenge: &str) -> SaslResult<String> {
        match self.state {
            HandshakeState::AwaitingInitialRequest => self.initial_response(ctx, challenge).await,
            HandshakeState::AwaitingServerResponse => self.server_response(challenge),
            state => Err(SaslError::InvalidState(state)),
        }
    }

    fn done(&self) -> bool {
        self.state == HandshakeState::Complete
    }
}
