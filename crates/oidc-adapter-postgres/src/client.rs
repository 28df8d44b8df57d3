//! Client registration storage for PostgreSQL.
//!
//! List-valued registration fields are `TEXT[]` columns; metadata without a
//! dedicated column is kept in `metadata JSONB`.

use serde_json::{Map, Value};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use oidc_adapter::client::ClientRecord;

use crate::{PgPool, StorageResult};

type ClientTuple = (
    String,
    Option<String>,
    Option<String>,
    Vec<String>,
    Vec<String>,
    Vec<String>,
    Vec<String>,
    Vec<String>,
    String,
    bool,
    Value,
);

fn client_from_tuple(row: ClientTuple) -> ClientRecord {
    let (
        id,
        client_secret,
        name,
        redirect_uris,
        post_logout_redirect_uris,
        grant_types,
        response_types,
        scopes,
        token_endpoint_auth_method,
        first_party,
        metadata,
    ) = row;

    ClientRecord {
        id,
        client_secret,
        name,
        redirect_uris,
        post_logout_redirect_uris,
        grant_types,
        response_types,
        scopes,
        token_endpoint_auth_method,
        first_party,
        metadata: match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    }
}

// =============================================================================
// Client Storage
// =============================================================================

/// Client registration operations.
pub struct ClientStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> ClientStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, client: &ClientRecord) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO clients (
                id, client_secret, name, redirect_uris, post_logout_redirect_uris,
                grant_types, response_types, scopes, token_endpoint_auth_method,
                first_party, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                client_secret = EXCLUDED.client_secret,
                name = EXCLUDED.name,
                redirect_uris = EXCLUDED.redirect_uris,
                post_logout_redirect_uris = EXCLUDED.post_logout_redirect_uris,
                grant_types = EXCLUDED.grant_types,
                response_types = EXCLUDED.response_types,
                scopes = EXCLUDED.scopes,
                token_endpoint_auth_method = EXCLUDED.token_endpoint_auth_method,
                first_party = EXCLUDED.first_party,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            "#,
        )
        .bind(&client.id)
        .bind(&client.client_secret)
        .bind(&client.name)
        .bind(&client.redirect_uris)
        .bind(&client.post_logout_redirect_uris)
        .bind(&client.grant_types)
        .bind(&client.response_types)
        .bind(&client.scopes)
        .bind(&client.token_endpoint_auth_method)
        .bind(client.first_party)
        .bind(Value::Object(client.metadata.clone()))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Fetches a registration by client id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, id: &str) -> StorageResult<Option<ClientRecord>> {
        let row: Option<ClientTuple> = query_as(
            r#"
            SELECT id, client_secret, name, redirect_uris, post_logout_redirect_uris,
                   grant_types, response_types, scopes, token_endpoint_auth_method,
                   first_party, metadata
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(client_from_tuple))
    }

    /// Deletes a registration. Missing rows are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
