//! Connection pool construction.

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::Postgres;
use tracing::{debug, info, instrument};

use oidc_adapter::config::StorageConfig;

use crate::{PgPool, StorageError, StorageResult};

/// Type alias for PostgreSQL pool options.
pub type PgPoolOptions = PoolOptions<Postgres>;

/// Creates a pool from the adapter's storage configuration.
///
/// # Errors
///
/// Returns `StorageError::InvalidInput` if no database URL is configured and
/// a database error if the connection cannot be established.
#[instrument(skip(config))]
pub async fn create_pool(config: &StorageConfig) -> StorageResult<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| StorageError::invalid_input("storage.database_url is not set"))?;

    info!(
        url = %mask_password(url),
        max_connections = config.max_connections,
        acquire_timeout = ?config.acquire_timeout,
        "Creating PostgreSQL connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(url)
        .await?;

    debug!("PostgreSQL connection pool created");
    Ok(pool)
}

/// Masks the password in a database URL for logging.
fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://idp:hunter2@db:5432/idp"),
            "postgres://idp:****@db:5432/idp"
        );
        assert_eq!(
            mask_password("postgres://db:5432/idp"),
            "postgres://db:5432/idp"
        );
    }

    #[test]
    fn test_missing_url_is_invalid_input() {
        let err = tokio_test::block_on(create_pool(&StorageConfig::default())).unwrap_err();
        assert!(err.is_invalid_input());
    }
}
