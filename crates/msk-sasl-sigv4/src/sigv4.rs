//! AWS Signature Version 4 primitives.
//!
//! Both presigning and verification go through the same steps once the
//! canonical request is built:
//!
//! 1. Hash the canonical request with SHA-256.
//! 2. Build the string to sign from the timestamp, credential scope, and
//!    canonical request hash.
//! 3. Derive the signing key using an HMAC-SHA256 chain over the credential
//!    scope components.
//! 4. HMAC the string to sign with the signing key.

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};

/// Algorithm identifier carried in `X-Amz-Algorithm`.
pub const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hex SHA-256 of the empty string, used when the signed request has no body.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Terminator of every SigV4 credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// `strftime` format of `X-Amz-Date`.
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// `strftime` format of the date component of the credential scope.
pub const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

type HmacSha256 = Hmac<Sha256>;

/// Format a signing time as an `X-Amz-Date` value (`YYYYMMDDTHHMMSSZ`).
#[must_use]
pub fn format_amz_date(time: DateTime<Utc>) -> String {
    time.format(AMZ_DATE_FORMAT).to_string()
}

/// Build the credential scope `date/region/service/aws4_request`.
///
/// # Examples
///
/// ```
/// use msk_sasl_sigv4::sigv4::credential_scope;
///
/// assert_eq!(
///     credential_scope("20130524", "us-east-1", "s3"),
///     "20130524/us-east-1/s3/aws4_request"
/// );
/// ```
#[must_use]
pub fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{date}/{region}/{service}/{SCOPE_TERMINATOR}")
}

/// Join the algorithm, timestamp, scope and canonical request hash into the
/// newline-separated string that gets signed.
///
/// # Examples
///
/// ```
/// use msk_sasl_sigv4::sigv4::build_string_to_sign;
///
/// let sts = build_string_to_sign("20240301T120000Z", "20240301/eu-west-1/kafka-cluster/aws4_request", "ab12");
/// assert_eq!(sts.lines().count(), 4);
/// assert_eq!(sts.lines().last(), Some("ab12"));
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    [SIGNING_ALGORITHM, timestamp, credential_scope, canonical_request_hash].join("\n")
}

/// Derive the per-day signing key: `AWS4<secret>` is HMAC-chained through
/// the date, region, service and scope terminator.
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let seed = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    [region, service, SCOPE_TERMINATOR]
        .iter()
        .fold(seed, |key, part| hmac_sha256(&key, part.as_bytes()))
}

/// Hex HMAC-SHA256 of `string_to_sign` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Hash a canonical request and sign it for the given scope in one go.
#[must_use]
pub fn sign_canonical_request(
    canonical_request: &str,
    secret_key: &str,
    timestamp: &str,
    date: &str,
    region: &str,
    service: &str,
) -> String {
    let canonical_hash = hash_payload(canonical_request.as_bytes());
    let scope = credential_scope(date, region, service);
    let string_to_sign = build_string_to_sign(timestamp, &scope, &canonical_hash);
    let signing_key = derive_signing_key(secret_key, date, region, service);
    compute_signature(&signing_key, &string_to_sign)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Lowercase hex SHA-256 of `payload`.
///
/// # Examples
///
/// ```
/// use msk_sasl_sigv4::sigv4::{EMPTY_PAYLOAD_HASH, hash_payload};
///
/// assert_eq!(hash_payload(b""), EMPTY_PAYLOAD_HASH);
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
