//! Presigned URL generation for AWS Signature Version 4.
//!
//! A presigned request carries its authentication in query parameters rather
//! than in an `Authorization` header. Presigning adds:
//!
//! - `X-Amz-Algorithm` - Always `AWS4-HMAC-SHA256`
//! - `X-Amz-Credential` - `AKID/date/region/service/aws4_request`
//! - `X-Amz-Date` - ISO 8601 basic format timestamp (`YYYYMMDDTHHMMSSZ`)
//! - `X-Amz-SignedHeaders` - Always `host`
//! - `X-Amz-Security-Token` - Only for temporary credentials
//! - `X-Amz-Signature` - The hex-encoded signature, appended last
//!
//! Any query parameters already on the request (such as `Action` and
//! `X-Amz-Expires`) are part of the signed canonical query.

use std::fmt;

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, Method, Uri};
use tracing::debug;

use crate::canonical::{build_canonical_query_string, build_canonical_request, build_canonical_uri};
use crate::credentials::Credentials;
use crate::error::SignError;
use crate::sigv4::{
    SCOPE_DATE_FORMAT, SIGNING_ALGORITHM, credential_scope, format_amz_date,
    sign_canonical_request,
};

/// The only header included in presigned signatures.
const SIGNED_HEADERS: &str = "host";

/// A request description to be presigned.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    /// HTTP method of the request.
    pub method: Method,
    /// Absolute URI including scheme, authority and any pre-existing query.
    pub uri: Uri,
}

impl SignableRequest {
    /// Create a request with an explicit method.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri }
    }

    /// Create a `GET` request.
    #[must_use]
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }
}

/// The result of presigning: the signed URL and the headers that were signed.
#[derive(Debug, Clone)]
pub struct PresignedRequest {
    /// The URL with every `X-Amz-*` parameter, signature last.
    pub url: String,
    /// Headers covered by the signature (always `host`).
    pub signed_headers: HeaderMap,
}

/// Capability that turns a request description into a presigned URL.
///
/// The handshake treats this as a black box: it hands over the request,
/// credentials, payload hash, service, region and signing time, and consumes
/// the URL and signed headers.
#[async_trait::async_trait]
pub trait Presigner: Send + Sync + fmt::Debug {
    /// Presign `request` for `service` in `region` at `signing_time`.
    ///
    /// # Errors
    ///
    /// Returns a [`SignError`] if the request has no host, the scope is
    /// incomplete, or the resulting URL is malformed.
    async fn presign(
        &self,
        request: &SignableRequest,
        credentials: &Credentials,
        payload_hash: &str,
        service: &str,
        region: &str,
        signing_time: DateTime<Utc>,
    ) -> Result<PresignedRequest, SignError>;
}

/// The AWS Signature Version 4 presigner.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigV4Presigner;

impl SigV4Presigner {
    /// Create a new presigner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Presigner for SigV4Presigner {
    async fn presign(
        &self,
        request: &SignableRequest,
        credentials: &Credentials,
        payload_hash: &str,
        service: &str,
        region: &str,
        signing_time: DateTime<Utc>,
    ) -> Result<PresignedRequest, SignError> {
        if region.is_empty() {
            return Err(SignError::MissingScope("region"));
        }
        if service.is_empty() {
            return Err(SignError::MissingScope("service"));
        }

        let host = request
            .uri
            .authority()
            .map(http::uri::Authority::as_str)
            .filter(|h| !h.is_empty())
            .ok_or(SignError::MissingHost)?;

        let timestamp = format_amz_date(signing_time);
        let date = signing_time.format(SCOPE_DATE_FORMAT).to_string();
        let credential = format!(
            "{}/{}",
            credentials.access_key_id,
            credential_scope(&date, region, service)
        );

        let mut params: Vec<(String, String)> = request
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        params.push(("X-Amz-Algorithm".to_owned(), SIGNING_ALGORITHM.to_owned()));
        params.push(("X-Amz-Credential".to_owned(), credential));
        params.push(("X-Amz-Date".to_owned(), timestamp.clone()));
        params.push(("X-Amz-SignedHeaders".to_owned(), SIGNED_HEADERS.to_owned()));
        if let Some(token) = &credentials.session_token {
            params.push(("X-Amz-Security-Token".to_owned(), token.clone()));
        }

        let param_refs: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let canonical_request = build_canonical_request(
            request.method.as_str(),
            request.uri.path(),
            &param_refs,
            &[("host", host)],
            &[SIGNED_HEADERS],
            payload_hash,
        );

        debug!(
            access_key_id = %credentials.access_key_id,
            region,
            service,
            timestamp = %timestamp,
            "presigning request"
        );

        let signature = sign_canonical_request(
            &canonical_request,
            &credentials.secret_access_key,
            &timestamp,
            &date,
            region,
            service,
        );

        let scheme = request.uri.scheme_str().unwrap_or("https");
        let path = build_canonical_uri(request.uri.path());
        let query = build_canonical_query_string(&param_refs);
        let url = format!("{scheme}://{host}{path}?{query}&X-Amz-Signature={signature}");

        url.parse::<Uri>()
            .map_err(|e| SignError::MalformedUrl(e.to_string()))?;

        let mut signed_headers = HeaderMap::new();
        signed_headers.insert(
            http::header::HOST,
            HeaderValue::from_str(host).map_err(|e| SignError::MalformedUrl(e.to_string()))?,
        );

        Ok(PresignedRequest {
            url,
            signed_headers,
        })
    }
}
