//! Token table storage for PostgreSQL.
//!
//! Every [`TokenTable`] is its own SQL table with the same column layout:
//! the opaque JSON payload plus the metadata columns projected out of it.
//! `device_codes` additionally carries `user_code`; for the other tables the
//! column is selected as `NULL`.

use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use oidc_adapter::model::TokenTable;
use oidc_adapter::record::TokenRecord;

use crate::{PgPool, StorageError, StorageResult};

/// Row tuple: id, data, expires_at, consumed_at, user_id, client_id,
/// grant_id, user_code.
type TokenTuple = (
    String,
    Value,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn record_from_tuple(row: TokenTuple) -> TokenRecord {
    let (id, data, expires_at, consumed_at, user_id, client_id, grant_id, user_code) = row;
    TokenRecord {
        id,
        data,
        expires_at,
        consumed_at,
        user_id,
        client_id,
        grant_id,
        user_code,
    }
}

fn select_columns(table: TokenTable) -> &'static str {
    if table.has_user_code() {
        "id, data, expires_at, consumed_at, user_id, client_id, grant_id, user_code"
    } else {
        "id, data, expires_at, consumed_at, user_id, client_id, grant_id, NULL::text AS user_code"
    }
}

// =============================================================================
// Token Table Storage
// =============================================================================

/// Operations on a single token table.
pub struct TokenTableStorage<'a> {
    pool: &'a PgPool,
    table: TokenTable,
}

impl<'a> TokenTableStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool, table: TokenTable) -> Self {
        Self { pool, table }
    }

    /// Inserts the row or replaces everything except `consumed_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, record: &TokenRecord) -> StorageResult<()> {
        let name = self.table.table_name();
        let sql = if self.table.has_user_code() {
            format!(
                r#"
                INSERT INTO {name} (id, data, expires_at, user_id, client_id, grant_id, user_code)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    data = EXCLUDED.data,
                    expires_at = EXCLUDED.expires_at,
                    user_id = EXCLUDED.user_id,
                    client_id = EXCLUDED.client_id,
                    grant_id = EXCLUDED.grant_id,
                    user_code = EXCLUDED.user_code
                "#
            )
        } else {
            format!(
                r#"
                INSERT INTO {name} (id, data, expires_at, user_id, client_id, grant_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    data = EXCLUDED.data,
                    expires_at = EXCLUDED.expires_at,
                    user_id = EXCLUDED.user_id,
                    client_id = EXCLUDED.client_id,
                    grant_id = EXCLUDED.grant_id
                "#
            )
        };

        let mut statement = query(&sql)
            .bind(&record.id)
            .bind(&record.data)
            .bind(record.expires_at)
            .bind(&record.user_id)
            .bind(&record.client_id)
            .bind(&record.grant_id);
        if self.table.has_user_code() {
            statement = statement.bind(&record.user_code);
        }
        statement.execute(self.pool).await?;

        Ok(())
    }

    /// Fetches a row by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, id: &str) -> StorageResult<Option<TokenRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            select_columns(self.table),
            self.table.table_name()
        );
        let row: Option<TokenTuple> = query_as(&sql).bind(id).fetch_optional(self.pool).await?;
        Ok(row.map(record_from_tuple))
    }

    /// Fetches a device code by its user code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` if the table has no user codes.
    pub async fn find_by_user_code(&self, user_code: &str) -> StorageResult<Option<TokenRecord>> {
        if !self.table.has_user_code() {
            return Err(StorageError::invalid_input(format!(
                "{} has no user_code column",
                self.table
            )));
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE user_code = $1 LIMIT 1",
            select_columns(self.table),
            self.table.table_name()
        );
        let row: Option<TokenTuple> = query_as(&sql)
            .bind(user_code)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(record_from_tuple))
    }

    /// Fetches the row whose payload carries `uid`. When several do, the one
    /// without expiry or with the latest expiry wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_uid(&self, uid: &str) -> StorageResult<Option<TokenRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE data->>'uid' = $1 \
             ORDER BY expires_at DESC NULLS FIRST LIMIT 1",
            select_columns(self.table),
            self.table.table_name()
        );
        let row: Option<TokenTuple> = query_as(&sql).bind(uid).fetch_optional(self.pool).await?;
        Ok(row.map(record_from_tuple))
    }

    /// Fetches every row of `user_id`, rows without expiry first, then
    /// latest expiry first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_user_id(&self, user_id: &str) -> StorageResult<Vec<TokenRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1 ORDER BY expires_at DESC NULLS FIRST",
            select_columns(self.table),
            self.table.table_name()
        );
        let rows: Vec<TokenTuple> = query_as(&sql).bind(user_id).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(record_from_tuple).collect())
    }

    /// Stamps `consumed_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no row has `id`.
    pub async fn consume(&self, id: &str, at: OffsetDateTime) -> StorageResult<()> {
        let sql = format!(
            "UPDATE {} SET consumed_at = $2 WHERE id = $1",
            self.table.table_name()
        );
        let result = query(&sql).bind(id).bind(at).execute(self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("{} row", self.table)));
        }
        Ok(())
    }

    /// Deletes a row. Missing rows are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table.table_name());
        query(&sql).bind(id).execute(self.pool).await?;
        Ok(())
    }

    /// Deletes rows whose expiry is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE expires_at IS NOT NULL AND expires_at <= $1",
            self.table.table_name()
        );
        let result = query(&sql).bind(now).execute(self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Deletes every row carrying `grant_id` from `tables` in one transaction.
///
/// # Errors
///
/// Returns an error if any delete fails; nothing is deleted in that case.
pub async fn delete_by_grant_id(
    pool: &PgPool,
    tables: &[TokenTable],
    grant_id: &str,
) -> StorageResult<u64> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0u64;

    for table in tables {
        let sql = format!("DELETE FROM {} WHERE grant_id = $1", table.table_name());
        let result = query(&sql).bind(grant_id).execute(&mut *tx).await?;
        deleted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_columns_pads_user_code() {
        assert!(select_columns(TokenTable::DeviceCode).ends_with("grant_id, user_code"));
        assert!(select_columns(TokenTable::Session).ends_with("NULL::text AS user_code"));
    }

    #[test]
    fn test_record_from_tuple() {
        let record = record_from_tuple((
            "at-1".to_string(),
            serde_json::json!({"grantId": "g1"}),
            None,
            None,
            Some("u1".to_string()),
            Some("app".to_string()),
            Some("g1".to_string()),
            None,
        ));
        assert_eq!(record.id, "at-1");
        assert_eq!(record.grant_id.as_deref(), Some("g1"));
        assert!(record.expires_at.is_none());
    }
}
