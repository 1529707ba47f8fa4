//! Client-side SASL mechanisms for Kafka brokers.
//!
//! The main mechanism is [`IamMechanism`] (`AWS_MSK_IAM`), which answers the
//! broker with a SigV4-presigned `kafka-cluster:Connect` request built from
//! AWS credentials. [`ScramMechanism`] implements `SCRAM-SHA-256` and
//! `SCRAM-SHA-512` behind the same [`Mechanism`] trait, so a client can pick
//! either at runtime.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use msk_sasl::{IamConfig, IamMechanism, Mechanism, SaslContext, SaslMetadata};
//! use msk_sasl_sigv4::StaticCredentialsProvider;
//!
//! # tokio_test::block_on(async {
//! let mut mechanism: Box<dyn Mechanism> = Box::new(
//!     IamMechanism::new(IamConfig::builder().region("us-east-1".into()).build())
//!         .with_credentials(Arc::new(StaticCredentialsProvider::new("AKID", "SECRET", None))),
//! );
//! let ctx = SaslContext::new().with_metadata(SaslMetadata::new("localhost", None));
//!
//! mechanism.begin(&ctx, "", "", "").await.unwrap();
//! let payload = mechanism.step(&ctx, "").await.unwrap();
//! assert!(payload.starts_with('{'));
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod iam;
pub mod mechanism;
pub mod scram;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::IamConfig;
pub use context::{
    CancelHandle, CancellationSignal, SaslContext, SaslMetadata, cancellation_pair,
};
pub use error::{ErrorKind, SaslError, SaslResult};
pub use iam::{AuthPayload, IamMechanism};
pub use mechanism::{HandshakeState, Mechanism, MechanismKind};
pub use scram::{ScramError, ScramHash, ScramMechanism};
