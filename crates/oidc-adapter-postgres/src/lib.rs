//! PostgreSQL storage backend for oidc-adapter
//!
//! Persists protocol records in one table per token table:
//!
//! - `authorization_codes`, `access_tokens`, `refresh_tokens`, `device_codes`
//! - `interactions`, `grants`, `sessions`
//! - `clients` for registrations
//!
//! Expiry is enforced by the adapter on read; rows are only physically
//! removed by `destroy`, grant revocation, or [`PostgresTokenStore::purge_expired`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use oidc_adapter::AdapterFactory;
//! use oidc_adapter_postgres::PostgresTokenStore;
//!
//! let store = PostgresTokenStore::connect("postgres://localhost/idp").await?;
//! store.ensure_schema().await?;
//!
//! let adapters = AdapterFactory::new(Arc::new(store));
//! let codes = adapters.adapter("AuthorizationCode")?;
//! ```

pub mod client;
pub mod migrations;
pub mod pool;
pub mod store;
pub mod token;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

use oidc_adapter::config::StorageConfig;
use oidc_adapter::model::TokenTable;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use client::ClientStorage;
pub use token::TokenTableStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Migration(_)
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Token Store
// =============================================================================

/// PostgreSQL [`oidc_adapter::TokenStore`].
///
/// Holds the connection pool and hands out per-table storage views.
#[derive(Debug, Clone)]
pub struct PostgresTokenStore {
    pool: Arc<PgPool>,
}

impl PostgresTokenStore {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = pool::PgPoolOptions::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Create new storage from the adapter's storage configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL is missing or the connection fails.
    pub async fn connect_with(config: &StorageConfig) -> StorageResult<Self> {
        let pool = pool::create_pool(config).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Creates missing tables and indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Operations on one token table.
    #[must_use]
    pub fn tokens(&self, table: TokenTable) -> TokenTableStorage<'_> {
        TokenTableStorage::new(&self.pool, table)
    }

    /// Client registration operations.
    #[must_use]
    pub fn clients(&self) -> ClientStorage<'_> {
        ClientStorage::new(&self.pool)
    }
}

// =============================================================================
// Tests
// =============================================================================
