//! Generic token rows and the typed metadata projected out of engine payloads.

use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::model::ModelName;

/// Opaque protocol payload, owned and interpreted only by the engine.
pub type Payload = Value;

// =============================================================================
// Token Record
// =============================================================================

/// A persisted token-like record.
///
/// Covers authorization codes, access/refresh tokens, device codes, grants,
/// interactions and sessions. Only `data` is handed back to the engine; the
/// remaining columns exist for indexing and lifecycle checks.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    /// Engine-issued key.
    pub id: String,
    /// Opaque payload.
    pub data: Payload,
    /// Absolute expiry. `None` never expires.
    pub expires_at: Option<OffsetDateTime>,
    /// Set once a one-time credential has been spent.
    pub consumed_at: Option<OffsetDateTime>,
    /// Subject the record belongs to.
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    /// Groups records for cascading revocation.
    pub grant_id: Option<String>,
    /// Device-flow user code (device codes only).
    pub user_code: Option<String>,
}

impl TokenRecord {
    /// Returns `true` if the record has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns `true` if the record has been consumed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// A record is live while it is neither expired nor consumed.
    #[must_use]
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        !self.is_expired(now) && !self.is_consumed()
    }
}

// =============================================================================
// Metadata Projection
// =============================================================================

/// Indexed columns projected from an engine payload.
///
/// Fields that are missing or not strings project to `None`; projection never
/// fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMetadata {
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    pub grant_id: Option<String>,
    pub user_code: Option<String>,
    /// Engine-level session identifier (sessions only).
    pub uid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadFields {
    #[serde(default, deserialize_with = "lenient_string")]
    account_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    client_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    grant_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    user_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    uid: Option<String>,
    #[serde(default)]
    session: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFields {
    #[serde(default, deserialize_with = "lenient_string")]
    account_id: Option<String>,
}

/// Accepts any JSON value and keeps it only if it is a non-empty string.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

impl RecordMetadata {
    /// Projects the indexed columns for `model` out of `payload`.
    #[must_use]
    pub fn project(model: ModelName, payload: &Payload) -> Self {
        let fields = if payload.is_object() {
            PayloadFields::deserialize(payload).unwrap_or_default()
        } else {
            PayloadFields::default()
        };

        // Interactions nest the subject inside the session they belong to.
        let account_id = fields.account_id.or_else(|| {
            (model == ModelName::Interaction)
                .then_some(fields.session)
                .flatten()
                .and_then(|session| SessionFields::deserialize(&session).ok())
                .and_then(|session| session.account_id)
        });

        Self {
            account_id,
            client_id: fields.client_id,
            grant_id: fields.grant_id,
            user_code: (model == ModelName::DeviceCode)
                .then_some(fields.user_code)
                .flatten(),
            uid: (model == ModelName::Session).then_some(fields.uid).flatten(),
        }
    }
}
