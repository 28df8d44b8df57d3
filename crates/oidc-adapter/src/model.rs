//! Model-name to table resolution.
//!
//! The protocol engine asks for an adapter by model name. Several model names
//! share a physical table, and one model is never persisted. All of that is
//! decided in [`ModelName::binding`] so the aliasing can be audited in one
//! place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AdapterResult;
use crate::error::AdapterError;

// =============================================================================
// Model Name
// =============================================================================

/// Every model name the protocol engine may request an adapter for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelName {
    Session,
    AccessToken,
    AuthorizationCode,
    RefreshToken,
    DeviceCode,
    ClientCredentials,
    Client,
    InitialAccessToken,
    RegistrationAccessToken,
    Interaction,
    ReplayDetection,
    Grant,
}

impl ModelName {
    /// All known model names.
    pub const ALL: [ModelName; 12] = [
        Self::Session,
        Self::AccessToken,
        Self::AuthorizationCode,
        Self::RefreshToken,
        Self::DeviceCode,
        Self::ClientCredentials,
        Self::Client,
        Self::InitialAccessToken,
        Self::RegistrationAccessToken,
        Self::Interaction,
        Self::ReplayDetection,
        Self::Grant,
    ];

    /// Returns the engine's spelling of the model name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "Session",
            Self::AccessToken => "AccessToken",
            Self::AuthorizationCode => "AuthorizationCode",
            Self::RefreshToken => "RefreshToken",
            Self::DeviceCode => "DeviceCode",
            Self::ClientCredentials => "ClientCredentials",
            Self::Client => "Client",
            Self::InitialAccessToken => "InitialAccessToken",
            Self::RegistrationAccessToken => "RegistrationAccessToken",
            Self::Interaction => "Interaction",
            Self::ReplayDetection => "ReplayDetection",
            Self::Grant => "Grant",
        }
    }

    /// Resolves where records of this model live.
    #[must_use]
    pub fn binding(&self) -> TableBinding {
        match self {
            Self::Session => TableBinding::Tokens(TokenTable::Session),
            Self::AccessToken
            | Self::ClientCredentials
            | Self::InitialAccessToken
            | Self::RegistrationAccessToken => TableBinding::Tokens(TokenTable::AccessToken),
            Self::AuthorizationCode => TableBinding::Tokens(TokenTable::AuthorizationCode),
            Self::RefreshToken => TableBinding::Tokens(TokenTable::RefreshToken),
            Self::DeviceCode => TableBinding::Tokens(TokenTable::DeviceCode),
            Self::Interaction => TableBinding::Tokens(TokenTable::Interaction),
            Self::Grant => TableBinding::Tokens(TokenTable::Grant),
            Self::Client => TableBinding::Clients,
            Self::ReplayDetection => TableBinding::Ephemeral,
        }
    }

    /// Parses a model name, failing with a configuration error when the
    /// engine asks for a model this adapter does not know.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for unknown names.
    pub fn resolve(name: &str) -> AdapterResult<Self> {
        name.parse()
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| AdapterError::configuration(format!("unknown model name: {s}")))
    }
}

// =============================================================================
// Table Binding
// =============================================================================

/// Where a model's records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableBinding {
    /// Generic token rows (`id`, `data`, `expiresAt`, `consumedAt`, ...).
    Tokens(TokenTable),
    /// OAuth client registrations, stored in their own shape.
    Clients,
    /// Nothing is persisted; every operation is a no-op.
    Ephemeral,
}

/// Physical tables holding generic token rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenTable {
    AuthorizationCode,
    AccessToken,
    RefreshToken,
    DeviceCode,
    Interaction,
    Grant,
    Session,
}

impl TokenTable {
    /// All token tables.
    pub const ALL: [TokenTable; 7] = [
        Self::AuthorizationCode,
        Self::AccessToken,
        Self::RefreshToken,
        Self::DeviceCode,
        Self::Interaction,
        Self::Grant,
        Self::Session,
    ];

    /// Tables whose rows are deleted when their grant is revoked.
    pub const REVOCABLE: [TokenTable; 4] = [
        Self::AccessToken,
        Self::AuthorizationCode,
        Self::RefreshToken,
        Self::DeviceCode,
    ];

    /// Returns the SQL table name.
    #[must_use]
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_codes",
            Self::AccessToken => "access_tokens",
            Self::RefreshToken => "refresh_tokens",
            Self::DeviceCode => "device_codes",
            Self::Interaction => "interactions",
            Self::Grant => "grants",
            Self::Session => "sessions",
        }
    }

    /// Returns `true` if rows in this table carry a `user_code` column.
    #[must_use]
    pub fn has_user_code(&self) -> bool {
        matches!(self, Self::DeviceCode)
    }
}

impl fmt::Display for TokenTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}
