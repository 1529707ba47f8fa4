//! Step-one authentication payload.
//!
//! The payload is a flat JSON object of lowercase keys: the fixed `version`,
//! `host` and `user-agent` fields, every header the presigner signed, and
//! every query parameter of the presigned URL. It is built fresh for each
//! handshake because the signature embeds the signing time.

use std::collections::BTreeMap;
use std::time::Duration;

use http::Uri;
use msk_sasl_sigv4::{CredentialsProvider, EMPTY_PAYLOAD_HASH, Presigner, SignError, SignableRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CONNECT_ACTION, PROTOCOL_VERSION, SIGN_SCHEME, SIGN_SERVICE};
use crate::clock::Clock;
use crate::context::SaslContext;
use crate::error::{SaslError, SaslResult};

const ACTION_QUERY_KEY: &str = "Action";
const EXPIRES_QUERY_KEY: &str = "X-Amz-Expires";

const VERSION_KEY: &str = "version";
const HOST_KEY: &str = "host";
const USER_AGENT_KEY: &str = "user-agent";

/// The canonical `AWS_MSK_IAM` authentication payload.
///
/// # Examples
///
/// ```
/// use msk_sasl::AuthPayload;
///
/// let payload = AuthPayload::from_json(r#"{"version":"2020_10_22","host":"b-1"}"#).unwrap();
/// assert_eq!(payload.get("host"), Some("b-1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthPayload(BTreeMap<String, String>);

impl AuthPayload {
    /// Look up a field by its lowercase name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> SaslResult<String> {
        serde_json::to_string(&self.0).map_err(SaslError::Encode)
    }

    /// Parse a payload from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Insert a field; the key is lowercased since brokers match keys
    /// case-sensitively in lowercase. Later inserts win.
    fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), value.into());
    }
}

/// Assembles and signs the payload for one handshake.
pub(crate) struct PayloadBuilder<'a> {
    pub(crate) region: &'a str,
    pub(crate) expiry: Duration,
    pub(crate) user_agent: &'a str,
    pub(crate) credentials: &'a dyn CredentialsProvider,
    pub(crate) presigner: &'a dyn Presigner,
    pub(crate) clock: &'a dyn Clock,
}

impl PayloadBuilder<'_> {
    /// Build the payload for the broker named in the context metadata.
    ///
    /// Credential and signing errors are returned as-is; cancellation and the
    /// context deadline apply to both calls.
    pub(crate) async fn build(&self, ctx: &SaslContext) -> SaslResult<AuthPayload> {
        let metadata = ctx.metadata().ok_or(SaslError::MissingMetadata)?;
        let request = self.connect_request(&metadata.host)?;

        let credentials = ctx.run(self.credentials.retrieve()).await?;
        let signing_time = self.clock.now();

        debug!(
            host = %metadata.host,
            port = ?metadata.port,
            region = self.region,
            access_key_id = %credentials.access_key_id,
            "signing connect request"
        );

        let presigned = ctx
            .run(self.presigner.presign(
                &request,
                &credentials,
                EMPTY_PAYLOAD_HASH,
                SIGN_SERVICE,
                self.region,
                signing_time,
            ))
            .await?;

        let url: Uri = presigned
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| SignError::MalformedUrl(e.to_string()))?;
        let signed_host = url
            .authority()
            .map(|a| a.as_str().to_owned())
            .ok_or_else(|| SignError::MalformedUrl("presigned URL has no host".to_owned()))?;

        let mut payload = AuthPayload::default();
        payload.insert(VERSION_KEY, PROTOCOL_VERSION);
        payload.insert(HOST_KEY, signed_host);
        payload.insert(USER_AGENT_KEY, self.user_agent);

        for name in presigned.signed_headers.keys() {
            if let Some(value) = presigned.signed_headers.get(name) {
                let value = value
                    .to_str()
                    .map_err(|e| SignError::InvalidHeader {
                        name: name.to_string(),
                        reason: e.to_string(),
                    })?;
                payload.insert(name.as_str(), value);
            }
        }
        for (key, value) in form_urlencoded::parse(url.query().unwrap_or_default().as_bytes()) {
            payload.insert(&key, value.into_owned());
        }

        Ok(payload)
    }

    /// The synthetic `GET kafka://<host>/?Action=...&X-Amz-Expires=...` request.
    fn connect_request(&self, host: &str) -> SaslResult<SignableRequest> {
        let invalid = |reason: String| SaslError::InvalidHost {
            host: host.to_owned(),
            reason,
        };

        if host.is_empty() {
            return Err(invalid("empty host".to_owned()));
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(ACTION_QUERY_KEY, CONNECT_ACTION)
            .append_pair(EXPIRES_QUERY_KEY, &self.expiry.as_secs().to_string())
            .finish();

        let uri = Uri::builder()
            .scheme(SIGN_SCHEME)
            .authority(host)
            .path_and_query(format!("/?{query}"))
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(SignableRequest::get(uri))
    }
}
