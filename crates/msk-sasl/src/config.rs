//! Configuration of the `AWS_MSK_IAM` mechanism.
//!
//! Provides [`IamConfig`], built either with its typed builder or from
//! environment variables via [`IamConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::iam::DEFAULT_EXPIRY;

/// Default user agent reported by [`IamConfig::from_env`].
pub const DEFAULT_USER_AGENT: &str = concat!("msk-sasl/", env!("CARGO_PKG_VERSION"));

/// `AWS_MSK_IAM` mechanism configuration.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use msk_sasl::IamConfig;
///
/// let config = IamConfig::builder()
///     .region("eu-west-1".into())
///     .expiry(Duration::from_secs(900))
///     .build();
/// assert_eq!(config.region, "eu-west-1");
/// assert!(config.user_agent.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct IamConfig {
    /// Signing region of the cluster (e.g. `"us-east-1"`). Required.
    #[builder(default)]
    pub region: String,

    /// How long the presigned payload stays valid. Zero means the default
    /// of five minutes.
    #[builder(default = DEFAULT_EXPIRY)]
    pub expiry: Duration,

    /// Value sent verbatim as `user-agent` in the payload.
    #[builder(default)]
    pub user_agent: String,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            expiry: DEFAULT_EXPIRY,
            user_agent: String::new(),
        }
    }
}

impl IamConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `AWS_REGION` | `AWS_DEFAULT_REGION`, else empty |
    /// | `MSK_IAM_EXPIRY_SECS` | `300` |
    /// | `MSK_IAM_USER_AGENT` | `msk-sasl/<version>` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            ..Self::default()
        };

        if let Some(v) = env_var("AWS_REGION").or_else(|| env_var("AWS_DEFAULT_REGION")) {
            config.region = v;
        }
        if let Some(v) = env_var("MSK_IAM_EXPIRY_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.expiry = Duration::from_secs(secs);
            }
        }
        if let Some(v) = env_var("MSK_IAM_USER_AGENT") {
            config.user_agent = v;
        }

        config
    }

    /// The expiry actually used for signing.
    #[must_use]
    pub fn effective_expiry(&self) -> Duration {
        if self.expiry.is_zero() {
            DEFAULT_EXPIRY
        } else {
            self.expiry
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
