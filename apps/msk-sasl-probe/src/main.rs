//! MSK SASL probe - prints the `AWS_MSK_IAM` authentication payload.
//!
//! Runs the client half of the handshake up to the first response against a
//! broker host without opening a connection, so the payload an MSK broker
//! would receive can be inspected. With `--verify` the payload is also checked
//! locally against the same credentials.
//!
//! # Usage
//!
//! ```text
//! AWS_REGION=us-east-1 msk-sasl-probe b-1.cluster.kafka.us-east-1.amazonaws.com --verify
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MSK_BROKER_HOST` | *(first argument)* | Broker host to sign for |
//! | `MSK_BROKER_PORT` | *(unset)* | Broker port, logged only |
//! | `AWS_REGION` | `AWS_DEFAULT_REGION` | Signing region |
//! | `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN` | *(required)* | Credentials |
//! | `MSK_IAM_EXPIRY_SECS` | `300` | Payload lifetime |
//! | `MSK_IAM_USER_AGENT` | `msk-sasl/<version>` | Reported user agent |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use msk_sasl::{AuthPayload, IamConfig, IamMechanism, Mechanism, SaslContext, SaslMetadata};
use msk_sasl_sigv4::{
    CredentialsProvider, EnvironmentCredentialsProvider, StaticSecretKeyProvider,
    verify_auth_payload,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Probe version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bound on credential retrieval and signing.
const STEP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to `LOG_LEVEL`.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Broker endpoint from the environment and command line.
fn broker_metadata(args: &[String]) -> Result<SaslMetadata> {
    let host = std::env::var("MSK_BROKER_HOST")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| args.iter().find(|a| !a.starts_with("--")).cloned());
    let Some(host) = host else {
        bail!("no broker host given: pass it as the first argument or set MSK_BROKER_HOST");
    };

    let port = match std::env::var("MSK_BROKER_PORT") {
        Ok(p) if !p.is_empty() => Some(
            p.parse::<u16>()
                .with_context(|| format!("invalid MSK_BROKER_PORT: {p}"))?,
        ),
        _ => None,
    };

    Ok(SaslMetadata::new(host, port))
}

/// Check the payload the way a broker would, with the same credentials.
async fn verify_locally(
    payload: &AuthPayload,
    credentials: &dyn CredentialsProvider,
) -> Result<()> {
    let credentials = credentials
        .retrieve()
        .await
        .context("failed to reload credentials for verification")?;
    let secrets = StaticSecretKeyProvider::new([(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
    )]);

    let verified = verify_auth_payload(
        payload.fields(),
        &secrets,
        msk_sasl::iam::SIGN_SERVICE,
        chrono::Utc::now(),
    )
    .context("payload failed local verification")?;

    info!(
        access_key_id = %verified.access_key_id,
        region = %verified.region,
        host = %verified.host,
        expires_at = %verified.expires_at,
        "payload verified"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    init_tracing(&log_level)?;

    let config = IamConfig::from_env();
    let metadata = broker_metadata(&args)?;

    info!(
        host = %metadata.host,
        port = ?metadata.port,
        region = %config.region,
        expiry_secs = config.effective_expiry().as_secs(),
        user_agent = %config.user_agent,
        version = VERSION,
        "building AWS_MSK_IAM payload",
    );

    let credentials: Arc<dyn CredentialsProvider> = Arc::new(EnvironmentCredentialsProvider::new());
    let mut mechanism = IamMechanism::new(config).with_credentials(Arc::clone(&credentials));
    let ctx = SaslContext::new()
        .with_metadata(metadata)
        .with_timeout(STEP_TIMEOUT);

    mechanism
        .begin(&ctx, "", "", "")
        .await
        .context("failed to start handshake")?;
    let json = mechanism
        .step(&ctx, "")
        .await
        .context("failed to build authentication payload")?;

    let payload = AuthPayload::from_json(&json).context("payload is not valid JSON")?;
    println!("{}", serde_json::to_string_pretty(&payload)?);

    if args.iter().any(|a| a == "--verify") {
        verify_locally(&payload, credentials.as_ref()).await?;
    } else if payload.get("x-amz-security-token").is_none() {
        warn!("no session token in payload; long-term keys are being used");
    }

    Ok(())
}
