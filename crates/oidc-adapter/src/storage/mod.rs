//! Storage backend trait for protocol records.
//!
//! [`TokenStore`] is the row-level contract the persistence adapter is built
//! on. It knows nothing about liveness, model aliasing or the external client
//! shape; those rules live in [`crate::adapter`].
//!
//! # Implementations
//!
//! - [`MemoryTokenStore`] - in-process store, used in tests
//! - `oidc-adapter-postgres` - PostgreSQL storage backend
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Make [`TokenStore::delete_by_grant_id`] atomic across all tables passed in
//! - Preserve `consumed_at` when a row is upserted again
//! - Treat deletes of missing rows as success

pub mod memory;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AdapterResult;
use crate::client::ClientRecord;
use crate::model::TokenTable;
use crate::record::TokenRecord;

pub use memory::MemoryTokenStore;

/// Row-level persistence for token tables and client registrations.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Inserts a row, or replaces data, expiry and metadata columns of an
    /// existing row with the same id. `consumed_at` of an existing row is kept.
    async fn upsert_token(&self, table: TokenTable, record: TokenRecord) -> AdapterResult<()>;

    /// Fetches a row by primary key regardless of expiry or consumption.
    async fn find_token(&self, table: TokenTable, id: &str) -> AdapterResult<Option<TokenRecord>>;

    /// Fetches a row by its device-flow user code.
    async fn find_token_by_user_code(
        &self,
        table: TokenTable,
        user_code: &str,
    ) -> AdapterResult<Option<TokenRecord>>;

    /// Fetches the session whose payload carries `uid`.
    async fn find_session_by_uid(&self, uid: &str) -> AdapterResult<Option<TokenRecord>>;

    /// Fetches all sessions belonging to `user_id`, latest expiry first.
    async fn find_sessions_by_user_id(&self, user_id: &str) -> AdapterResult<Vec<TokenRecord>>;

    /// Stamps `consumed_at` on a row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AdapterError::NotFound`] if the row does not exist.
    async fn consume_token(
        &self,
        table: TokenTable,
        id: &str,
        at: OffsetDateTime,
    ) -> AdapterResult<()>;

    /// Hard-deletes a row. Missing rows are not an error.
    async fn delete_token(&self, table: TokenTable, id: &str) -> AdapterResult<()>;

    /// Deletes every row carrying `grant_id` from each of `tables` as one
    /// atomic unit. Returns the number of rows deleted.
    async fn delete_by_grant_id(&self, tables: &[TokenTable], grant_id: &str)
    -> AdapterResult<u64>;

    /// Inserts or replaces a client registration.
    async fn upsert_client(&self, client: ClientRecord) -> AdapterResult<()>;

    /// Fetches a client registration.
    async fn find_client(&self, id: &str) -> AdapterResult<Option<ClientRecord>>;

    /// Deletes a client registration. Missing rows are not an error.
    async fn delete_client(&self, id: &str) -> AdapterResult<()>;

    /// Deletes rows in every token table that expired before `now`.
    ///
    /// Never called by the adapter itself; expiry is enforced on read. This
    /// exists for scheduled housekeeping.
    async fn purge_expired(&self, now: OffsetDateTime) -> AdapterResult<u64>;
}
