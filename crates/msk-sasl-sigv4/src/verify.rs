//! Broker-side verification of IAM authentication payloads.
//!
//! The client sends the presigned query parameters as a flat JSON object with
//! lowercase keys. To check it, the broker maps those keys back to their
//! canonical query names, rebuilds the canonical `GET` request for the
//! advertised host, and recomputes the signature with the secret key of the
//! access key named in `x-amz-credential`.
//!
//! Fields consumed:
//!
//! - `host` - The broker host the payload was signed for
//! - `action` - The authorized action (`kafka-cluster:Connect`)
//! - `x-amz-algorithm` - Must be `AWS4-HMAC-SHA256`
//! - `x-amz-credential` - `AKID/date/region/service/aws4_request`
//! - `x-amz-date` - ISO 8601 basic format timestamp
//! - `x-amz-expires` - Validity duration in seconds
//! - `x-amz-signedheaders` - Semicolon-separated signed header names
//! - `x-amz-security-token` - Optional session token
//! - `x-amz-signature` - The hex-encoded signature

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::build_canonical_request;
use crate::error::VerifyError;
use crate::sigv4::{
    AMZ_DATE_FORMAT, EMPTY_PAYLOAD_HASH, SCOPE_TERMINATOR, SIGNING_ALGORITHM,
    sign_canonical_request,
};

/// Lowercase payload keys that travel as signed query parameters, with their
/// canonical names.
const QUERY_FIELDS: &[(&str, &str)] = &[
    ("action", "Action"),
    ("x-amz-algorithm", "X-Amz-Algorithm"),
    ("x-amz-credential", "X-Amz-Credential"),
    ("x-amz-date", "X-Amz-Date"),
    ("x-amz-expires", "X-Amz-Expires"),
    ("x-amz-signedheaders", "X-Amz-SignedHeaders"),
    ("x-amz-security-token", "X-Amz-Security-Token"),
];

/// Query fields a payload may omit.
const OPTIONAL_FIELDS: &[&str] = &["x-amz-security-token"];

/// Trait for looking up secret access keys by access key ID.
pub trait SecretKeyProvider: Send + Sync {
    /// Retrieve the secret access key for the given access key ID.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::AccessKeyNotFound`] if the access key ID is not recognized.
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, VerifyError>;
}

/// An in-memory secret store backed by a `HashMap`.
///
/// # Examples
///
/// ```
/// use msk_sasl_sigv4::verify::{SecretKeyProvider, StaticSecretKeyProvider};
///
/// let store = StaticSecretKeyProvider::new(vec![("AKID".to_owned(), "secret".to_owned())]);
/// assert_eq!(store.get_secret_key("AKID").unwrap(), "secret");
/// ```
#[derive(Debug, Clone)]
pub struct StaticSecretKeyProvider {
    secrets: HashMap<String, String>,
}

impl StaticSecretKeyProvider {
    /// Create a store from (access_key_id, secret_key) pairs.
    pub fn new(secrets: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            secrets: secrets.into_iter().collect(),
        }
    }
}

impl SecretKeyProvider for StaticSecretKeyProvider {
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, VerifyError> {
        self.secrets
            .get(access_key_id)
            .cloned()
            .ok_or_else(|| VerifyError::AccessKeyNotFound(access_key_id.to_owned()))
    }
}

/// Identity established by a successfully verified payload.
#[derive(Debug, Clone)]
pub struct VerifiedPayload {
    /// The access key ID that signed the payload.
    pub access_key_id: String,
    /// Region from the credential scope.
    pub region: String,
    /// Service from the credential scope.
    pub service: String,
    /// Host the payload was signed for.
    pub host: String,
    /// Signing time (`x-amz-date`).
    pub signed_at: DateTime<Utc>,
    /// Time after which the payload is no longer accepted.
    pub expires_at: DateTime<Utc>,
}

/// Verify a lowercase-keyed IAM authentication payload at time `now`.
///
/// # Errors
///
/// Returns a [`VerifyError`] if:
/// - Required fields are missing or malformed
/// - The credential scope names another service than `expected_service`
/// - The payload has expired
/// - The access key is not found
/// - The signature does not match
pub fn verify_auth_payload(
    fields: &BTreeMap<String, String>,
    secrets: &dyn SecretKeyProvider,
    expected_service: &str,
    now: DateTime<Utc>,
) -> Result<VerifiedPayload, VerifyError> {
    let host = required(fields, "host")?;

    let algorithm = required(fields, "x-amz-algorithm")?;
    if algorithm != SIGNING_ALGORITHM {
        return Err(VerifyError::UnsupportedAlgorithm(algorithm.to_owned()));
    }

    // AKID/date/region/service/aws4_request
    let credential = required(fields, "x-amz-credential")?;
    let cred_parts: Vec<&str> = credential.splitn(5, '/').collect();
    if cred_parts.len() != 5 || cred_parts[4] != SCOPE_TERMINATOR {
        return Err(VerifyError::InvalidCredential);
    }
    let (access_key_id, date, region, service) =
        (cred_parts[0], cred_parts[1], cred_parts[2], cred_parts[3]);

    if service != expected_service {
        return Err(VerifyError::ServiceMismatch {
            expected: expected_service.to_owned(),
            actual: service.to_owned(),
        });
    }

    let timestamp = required(fields, "x-amz-date")?;
    let signed_at = NaiveDateTime::parse_from_str(timestamp, AMZ_DATE_FORMAT)
        .map_err(|_| VerifyError::InvalidField("x-amz-date"))?
        .and_utc();
    let expires = required(fields, "x-amz-expires")?
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs >= 0)
        .ok_or(VerifyError::InvalidField("x-amz-expires"))?;
    let expires_at = Duration::try_seconds(expires)
        .and_then(|validity| signed_at.checked_add_signed(validity))
        .ok_or(VerifyError::InvalidField("x-amz-expires"))?;

    debug!(
        access_key_id,
        region,
        service,
        host,
        expires,
        "verifying IAM authentication payload"
    );

    if now > expires_at {
        return Err(VerifyError::Expired);
    }

    let secret_key = secrets.get_secret_key(access_key_id)?;

    let mut query = Vec::with_capacity(QUERY_FIELDS.len());
    for (field, name) in QUERY_FIELDS {
        match fields.get(*field) {
            Some(value) => query.push((*name, value.as_str())),
            None if OPTIONAL_FIELDS.contains(field) => {}
            None => return Err(VerifyError::MissingField((*field).to_owned())),
        }
    }

    let signed_headers: Vec<&str> = required(fields, "x-amz-signedheaders")?
        .split(';')
        .collect();
    let header_pairs = signed_headers
        .iter()
        .map(|name| required(fields, name).map(|value| (*name, value)))
        .collect::<Result<Vec<_>, _>>()?;

    let canonical_request = build_canonical_request(
        "GET",
        "/",
        &query,
        &header_pairs,
        &signed_headers,
        EMPTY_PAYLOAD_HASH,
    );

    debug!(canonical_request, "built payload canonical request");

    let expected_signature =
        sign_canonical_request(&canonical_request, &secret_key, timestamp, date, region, service);
    let provided_signature = required(fields, "x-amz-signature")?;

    if provided_signature
        .as_bytes()
        .ct_eq(expected_signature.as_bytes())
        .into()
    {
        debug!(access_key_id, "payload verification succeeded");
        Ok(VerifiedPayload {
            access_key_id: access_key_id.to_owned(),
            region: region.to_owned(),
            service: service.to_owned(),
            host: host.to_owned(),
            signed_at,
            expires_at,
        })
    } else {
        debug!(access_key_id, "payload signature mismatch");
        Err(VerifyError::SignatureDoesNotMatch)
    }
}

fn required<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Result<&'a str, VerifyError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| VerifyError::MissingField(name.to_owned()))
}
