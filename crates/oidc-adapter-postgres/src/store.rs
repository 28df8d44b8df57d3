//! [`TokenStore`] implementation over the lifetime-based storage views.

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use oidc_adapter::client::ClientRecord;
use oidc_adapter::model::TokenTable;
use oidc_adapter::record::TokenRecord;
use oidc_adapter::storage::TokenStore;
use oidc_adapter::{AdapterError, AdapterResult};

use crate::{PostgresTokenStore, StorageError, token};

fn adapter_error(e: StorageError) -> AdapterError {
    match e {
        StorageError::NotFound(message) => AdapterError::not_found(message),
        other => AdapterError::storage(other.to_string()),
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    async fn upsert_token(&self, table: TokenTable, record: TokenRecord) -> AdapterResult<()> {
        self.tokens(table)
            .upsert(&record)
            .await
            .map_err(adapter_error)
    }

    async fn find_token(&self, table: TokenTable, id: &str) -> AdapterResult<Option<TokenRecord>> {
        self.tokens(table).find(id).await.map_err(adapter_error)
    }

    async fn find_token_by_user_code(
        &self,
        table: TokenTable,
        user_code: &str,
    ) -> AdapterResult<Option<TokenRecord>> {
        self.tokens(table)
            .find_by_user_code(user_code)
            .await
            .map_err(adapter_error)
    }

    async fn find_session_by_uid(&self, uid: &str) -> AdapterResult<Option<TokenRecord>> {
        self.tokens(TokenTable::Session)
            .find_by_uid(uid)
            .await
            .map_err(adapter_error)
    }

    async fn find_sessions_by_user_id(&self, user_id: &str) -> AdapterResult<Vec<TokenRecord>> {
        self.tokens(TokenTable::Session)
            .find_by_user_id(user_id)
            .await
            .map_err(adapter_error)
    }

    async fn consume_token(
        &self,
        table: TokenTable,
        id: &str,
        at: OffsetDateTime,
    ) -> AdapterResult<()> {
        self.tokens(table)
            .consume(id, at)
            .await
            .map_err(adapter_error)
    }

    async fn delete_token(&self, table: TokenTable, id: &str) -> AdapterResult<()> {
        self.tokens(table).delete(id).await.map_err(adapter_error)
    }

    async fn delete_by_grant_id(
        &self,
        tables: &[TokenTable],
        grant_id: &str,
    ) -> AdapterResult<u64> {
        token::delete_by_grant_id(self.pool(), tables, grant_id)
            .await
            .map_err(adapter_error)
    }

    async fn upsert_client(&self, client: ClientRecord) -> AdapterResult<()> {
        self.clients().upsert(&client).await.map_err(adapter_error)
    }

    async fn find_client(&self, id: &str) -> AdapterResult<Option<ClientRecord>> {
        self.clients().find(id).await.map_err(adapter_error)
    }

    async fn delete_client(&self, id: &str) -> AdapterResult<()> {
        self.clients().delete(id).await.map_err(adapter_error)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AdapterResult<u64> {
        let mut purged = 0;
        for table in TokenTable::ALL {
            let deleted = self
                .tokens(table)
                .purge_expired(now)
                .await
                .map_err(adapter_error)?;
            debug!(table = %table, deleted, "Purged expired rows");
            purged += deleted;
        }
        Ok(purged)
    }
}
