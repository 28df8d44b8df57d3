//! OAuth client registrations.
//!
//! The protocol engine reads and writes clients in the snake_case metadata
//! shape of RFC 7591 ([`ClientMetadata`]). Storage keeps them in an internal
//! camelCase shape ([`ClientRecord`]) with scopes as a list. The two are
//! mapped on every read and write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AdapterResult;
use crate::record::Payload;

const DEFAULT_GRANT_TYPE: &str = "authorization_code";
const DEFAULT_RESPONSE_TYPE: &str = "code";
const DEFAULT_AUTH_METHOD: &str = "client_secret_basic";

fn default_grant_types() -> Vec<String> {
    vec![DEFAULT_GRANT_TYPE.to_string()]
}

fn default_response_types() -> Vec<String> {
    vec![DEFAULT_RESPONSE_TYPE.to_string()]
}

fn default_auth_method() -> String {
    DEFAULT_AUTH_METHOD.to_string()
}

// =============================================================================
// External Shape
// =============================================================================

/// Client metadata as the protocol engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default)]
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_logout_redirect_uris: Vec<String>,

    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,

    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,

    /// Space-delimited scope list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: String,

    /// Trusted first-party application (consent may be skipped).
    #[serde(default)]
    pub first_party: bool,

    /// Any further registered metadata, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientMetadata {
    /// Parses an engine payload, filling in `client_id` from the storage key
    /// when the payload omits it.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload is not a client object.
    pub fn from_payload(id: &str, payload: Payload) -> AdapterResult<Self> {
        let mut payload = payload;
        if let Value::Object(map) = &mut payload {
            map.entry("client_id")
                .or_insert_with(|| Value::String(id.to_string()));
        }
        Ok(serde_json::from_value(payload)?)
    }

    /// Serializes back into an engine payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if an extra metadata value cannot be
    /// represented as JSON.
    pub fn into_payload(self) -> AdapterResult<Payload> {
        Ok(serde_json::to_value(self)?)
    }
}

// =============================================================================
// Internal Shape
// =============================================================================

/// Client registration as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    /// The OAuth `client_id`, also the storage key.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scopes: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub first_party: bool,
    /// Registered metadata without a dedicated column.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl From<ClientMetadata> for ClientRecord {
    fn from(meta: ClientMetadata) -> Self {
        let scopes = meta
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            id: meta.client_id,
            client_secret: meta.client_secret,
            name: meta.client_name,
            redirect_uris: meta.redirect_uris,
            post_logout_redirect_uris: meta.post_logout_redirect_uris,
            grant_types: meta.grant_types,
            response_types: meta.response_types,
            scopes,
            token_endpoint_auth_method: meta.token_endpoint_auth_method,
            first_party: meta.first_party,
            metadata: meta.extra,
        }
    }
}

impl From<ClientRecord> for ClientMetadata {
    fn from(record: ClientRecord) -> Self {
        let scope = (!record.scopes.is_empty()).then(|| record.scopes.join(" "));

        Self {
            client_id: record.id,
            client_secret: record.client_secret,
            client_name: record.name,
            redirect_uris: record.redirect_uris,
            post_logout_redirect_uris: record.post_logout_redirect_uris,
            grant_types: record.grant_types,
            response_types: record.response_types,
            scope,
            token_endpoint_auth_method: record.token_endpoint_auth_method,
            first_party: record.first_party,
            extra: record.metadata,
        }
    }
}
