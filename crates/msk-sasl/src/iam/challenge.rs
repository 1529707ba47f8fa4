//! Validation of the broker's step-two response.

use serde::Deserialize;

use super::PROTOCOL_VERSION;
use crate::error::{SaslError, SaslResult};

/// The broker's answer to a successful authentication payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerChallenge {
    /// Protocol version; must equal the client's.
    pub version: String,
    /// Opaque broker-side request identifier.
    #[serde(rename = "request-id", default)]
    pub request_id: String,
}

/// Decode and check a server challenge. Unknown fields are ignored.
pub fn validate_server_challenge(challenge: &str) -> SaslResult<ServerChallenge> {
    let response: ServerChallenge =
        serde_json::from_str(challenge).map_err(|e| SaslError::FailedServerChallenge {
            reason: "unable to process msk challenge response".to_owned(),
            source: Some(e),
        })?;

    if response.version != PROTOCOL_VERSION {
        return Err(SaslError::failed_challenge(format!(
            "unknown version found in response: {:?}",
            response.version
        )));
    }

    Ok(response)
}
