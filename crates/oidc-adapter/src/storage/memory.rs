//! In-memory storage backend.
//!
//! All tables sit behind a single lock so that multi-table operations such as
//! grant revocation are atomic with respect to every other call.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::TokenStore;
use crate::AdapterResult;
use crate::client::ClientRecord;
use crate::error::AdapterError;
use crate::model::TokenTable;
use crate::record::TokenRecord;

#[derive(Debug, Default)]
struct Tables {
    tokens: HashMap<TokenTable, HashMap<String, TokenRecord>>,
    clients: HashMap<String, ClientRecord>,
}

/// Sort key putting rows without expiry above every timestamp.
fn expiry_rank(row: &TokenRecord) -> (bool, Option<OffsetDateTime>) {
    (row.expires_at.is_none(), row.expires_at)
}

impl Tables {
    fn table(&self, table: TokenTable) -> impl Iterator<Item = &TokenRecord> {
        self.tokens.get(&table).into_iter().flat_map(HashMap::values)
    }
}

/// In-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tables: RwLock<Tables>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows in `table`, live or not.
    pub async fn row_count(&self, table: TokenTable) -> usize {
        self.tables.read().await.table(table).count()
    }

    /// Returns `true` if `table` physically holds a row with `id`.
    pub async fn contains(&self, table: TokenTable, id: &str) -> bool {
        self.tables
            .read()
            .await
            .tokens
            .get(&table)
            .is_some_and(|rows| rows.contains_key(id))
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn upsert_token(&self, table: TokenTable, record: TokenRecord) -> AdapterResult<()> {
        let mut tables = self.tables.write().await;
        let rows = tables.tokens.entry(table).or_default();
        let consumed_at = rows.get(&record.id).and_then(|existing| existing.consumed_at);
        let record = TokenRecord {
            consumed_at,
            ..record
        };
        rows.insert(record.id.clone(), record);
        Ok(())
    }

    async fn find_token(&self, table: TokenTable, id: &str) -> AdapterResult<Option<TokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(&table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn find_token_by_user_code(
        &self,
        table: TokenTable,
        user_code: &str,
    ) -> AdapterResult<Option<TokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .table(table)
            .find(|row| row.user_code.as_deref() == Some(user_code))
            .cloned())
    }

    async fn find_session_by_uid(&self, uid: &str) -> AdapterResult<Option<TokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .table(TokenTable::Session)
            .filter(|row| row.data.get("uid").and_then(|v| v.as_str()) == Some(uid))
            .max_by_key(|row| expiry_rank(row))
            .cloned())
    }

    async fn find_sessions_by_user_id(&self, user_id: &str) -> AdapterResult<Vec<TokenRecord>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<TokenRecord> = tables
            .table(TokenTable::Session)
            .filter(|row| row.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        sessions.sort_by_key(|row| std::cmp::Reverse(expiry_rank(row)));
        Ok(sessions)
    }

    async fn consume_token(
        &self,
        table: TokenTable,
        id: &str,
        at: OffsetDateTime,
    ) -> AdapterResult<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .tokens
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| AdapterError::not_found(format!("{table} {id}")))?;
        row.consumed_at = Some(at);
        Ok(())
    }

    async fn delete_token(&self, table: TokenTable, id: &str) -> AdapterResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.tokens.get_mut(&table) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn delete_by_grant_id(
        &self,
        tables: &[TokenTable],
        grant_id: &str,
    ) -> AdapterResult<u64> {
        let mut guard = self.tables.write().await;
        let mut deleted = 0u64;
        for table in tables {
            if let Some(rows) = guard.tokens.get_mut(table) {
                let before = rows.len();
                rows.retain(|_, row| row.grant_id.as_deref() != Some(grant_id));
                deleted += (before - rows.len()) as u64;
            }
        }
        Ok(deleted)
    }

    async fn upsert_client(&self, client: ClientRecord) -> AdapterResult<()> {
        let mut tables = self.tables.write().await;
        tables.clients.insert(client.id.clone(), client);
        Ok(())
    }

    async fn find_client(&self, id: &str) -> AdapterResult<Option<ClientRecord>> {
        Ok(self.tables.read().await.clients.get(id).cloned())
    }

    async fn delete_client(&self, id: &str) -> AdapterResult<()> {
        self.tables.write().await.clients.remove(id);
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AdapterResult<u64> {
        let mut tables = self.tables.write().await;
        let mut deleted = 0u64;
        for rows in tables.tokens.values_mut() {
            let before = rows.len();
            rows.retain(|_, row| !row.is_expired(now));
            deleted += (before - rows.len()) as u64;
        }
        Ok(deleted)
    }
}
