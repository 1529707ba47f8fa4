//! Temporary AWS credentials and the credential source trait.
//!
//! This module defines [`Credentials`], the access key / secret / session
//! token triple used to presign requests, and the [`CredentialsProvider`]
//! trait through which the handshake obtains them on demand. Two simple
//! providers are included: [`StaticCredentialsProvider`] for tests and fixed
//! configuration, and [`EnvironmentCredentialsProvider`] which reads the
//! standard `AWS_*` environment variables.
//!
//! # Object safety
//!
//! [`CredentialsProvider`] uses `#[async_trait]` because it is held as
//! `Arc<dyn CredentialsProvider>` by the mechanisms.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::CredentialsError;

/// A set of (possibly temporary) AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The access key ID (`AKIA...` or `ASIA...`).
    pub access_key_id: String,
    /// The secret access key.
    pub secret_access_key: String,
    /// The session token for temporary credentials.
    pub session_token: Option<String>,
    /// When temporary credentials stop being valid.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Create long-term credentials without a session token or expiry.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    /// Attach a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.session_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Attach an expiration time.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the credentials are expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of credentials for signing.
///
/// Implementations may call out to STS, an instance metadata service, or any
/// other store. Retrieval happens once per handshake, so implementations that
/// are expensive should cache on their own side.
#[async_trait::async_trait]
pub trait CredentialsProvider: Send + Sync + fmt::Debug {
    /// Retrieve the current credentials.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialsError`] when no usable credentials are available.
    async fn retrieve(&self) -> Result<Credentials, CredentialsError>;
}

/// A provider that always returns the same credentials.
///
/// # Examples
///
/// ```
/// use msk_sasl_sigv4::{CredentialsProvider, StaticCredentialsProvider};
///
/// # tokio_test::block_on(async {
/// let provider = StaticCredentialsProvider::new("AKID", "secret", Some("token"));
/// let creds = provider.retrieve().await.unwrap();
/// assert_eq!(creds.access_key_id, "AKID");
/// assert_eq!(creds.session_token.as_deref(), Some("token"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    /// Create a provider from an access key, secret key and optional session token.
    #[must_use]
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<&str>,
    ) -> Self {
        let mut credentials = Credentials::new(access_key_id, secret_access_key);
        if let Some(token) = session_token {
            credentials = credentials.with_session_token(token);
        }
        Self { credentials }
    }

    /// Create a provider from an existing [`Credentials`] value.
    #[must_use]
    pub fn from_credentials(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait::async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        if let Some(at) = self.credentials.expires_at {
            if self.credentials.is_expired(Utc::now()) {
                return Err(CredentialsError::Expired(at));
            }
        }
        Ok(self.credentials.clone())
    }
}

/// A provider that reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the
/// optional `AWS_SESSION_TOKEN` on every retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentCredentialsProvider;

impl EnvironmentCredentialsProvider {
    /// Create a new environment provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CredentialsProvider for EnvironmentCredentialsProvider {
    async fn retrieve(&self) -> Result<Credentials, CredentialsError> {
        let access_key = non_empty_var("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| CredentialsError::NotLoaded("AWS_ACCESS_KEY_ID is not set".to_owned()))?;
        let secret_key = non_empty_var("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            CredentialsError::NotLoaded("AWS_SECRET_ACCESS_KEY is not set".to_owned())
        })?;

        let mut credentials = Credentials::new(access_key, secret_key);
        if let Some(token) = non_empty_var("AWS_SESSION_TOKEN") {
            credentials = credentials.with_session_token(token);
        }

        debug!(
            access_key_id = %credentials.access_key_id,
            has_session_token = credentials.session_token.is_some(),
            "loaded credentials from environment"
        );

        Ok(credentials)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
