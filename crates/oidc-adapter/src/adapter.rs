//! Per-model persistence adapter.
//!
//! The protocol engine obtains one [`Adapter`] per model name from an
//! [`AdapterFactory`] and drives the record lifecycle through it:
//!
//! - `upsert` when it issues a code, token, grant, session or interaction
//! - `find*` when it needs a record back
//! - `consume` when a one-time credential is spent
//! - `destroy` / `revoke_by_grant_id` when records must go
//!
//! # Failure Semantics
//!
//! Read operations never fail because of storage: a missing, expired or
//! consumed row and a storage error all read as `None`. Write operations
//! propagate every error so the engine knows the write did not happen.

use std::sync::Arc;

use async_trait::async_trait;
use time::Duration;
use tracing::{debug, error, info, warn};

use crate::AdapterResult;
use crate::client::{ClientMetadata, ClientRecord};
use crate::clock::{Clock, SystemClock};
use crate::error::AdapterError;
use crate::model::{ModelName, TableBinding, TokenTable};
use crate::record::{Payload, RecordMetadata, TokenRecord};
use crate::storage::TokenStore;
use crate::subject::SubjectResolver;

// =============================================================================
// Adapter Contract
// =============================================================================

/// Storage contract consumed by the protocol engine.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The model this adapter serves.
    fn model(&self) -> ModelName;

    /// Stores `payload` under `id`.
    ///
    /// `expires_in` is a lifetime in seconds; `None` or `Some(0)` means the
    /// record never expires.
    async fn upsert(&self, id: &str, payload: Payload, expires_in: Option<u64>)
    -> AdapterResult<()>;

    /// Returns the payload stored under `id` if the record is live.
    async fn find(&self, id: &str) -> Option<Payload>;

    /// Returns the live device code carrying `user_code`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnsupportedOperation`] on any model other than
    /// `DeviceCode`.
    async fn find_by_user_code(&self, user_code: &str) -> AdapterResult<Option<Payload>>;

    /// Looks a record up by the engine-level uid.
    ///
    /// For sessions the uid lives inside the payload. An expired session
    /// found this way is destroyed before reporting not-found. For every other
    /// model this is [`Adapter::find`].
    async fn find_by_uid(&self, uid: &str) -> Option<Payload>;

    /// Returns the live session of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnsupportedOperation`] on any model other than
    /// `Session`.
    async fn find_session_by_user_id(&self, user_id: &str) -> AdapterResult<Option<Payload>>;

    /// Marks the record as spent. The row is kept.
    async fn consume(&self, id: &str) -> AdapterResult<()>;

    /// Deletes the record.
    async fn destroy(&self, id: &str) -> AdapterResult<()>;

    /// Deletes every access token, authorization code, refresh token and
    /// device code issued under `grant_id`, all or nothing.
    async fn revoke_by_grant_id(&self, grant_id: &str) -> AdapterResult<()>;
}

// =============================================================================
// Factory
// =============================================================================

/// Produces adapters bound to a shared store.
#[derive(Clone)]
pub struct AdapterFactory {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    subjects: Option<Arc<dyn SubjectResolver>>,
}

impl AdapterFactory {
    /// Creates a factory over `store` using the system clock and no ambient
    /// subject resolution.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            subjects: None,
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Installs the resolver consulted when a payload names no subject.
    #[must_use]
    pub fn with_subject_resolver(mut self, resolver: Arc<dyn SubjectResolver>) -> Self {
        self.subjects = Some(resolver);
        self
    }

    /// Creates the adapter for `model_name`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for unknown model names.
    pub fn adapter(&self, model_name: &str) -> AdapterResult<ModelAdapter> {
        let model = ModelName::resolve(model_name)?;
        Ok(self.for_model(model))
    }

    /// Creates the adapter for an already-resolved model.
    #[must_use]
    pub fn for_model(&self, model: ModelName) -> ModelAdapter {
        ModelAdapter {
            model,
            binding: model.binding(),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            subjects: self.subjects.clone(),
        }
    }

    /// Removes expired rows from every token table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn purge_expired(&self) -> AdapterResult<u64> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        info!(purged, "Purged expired protocol records");
        Ok(purged)
    }
}

impl std::fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("subjects", &self.subjects.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Model Adapter
// =============================================================================

/// [`Adapter`] implementation for a single model.
#[derive(Clone)]
pub struct ModelAdapter {
    model: ModelName,
    binding: TableBinding,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    subjects: Option<Arc<dyn SubjectResolver>>,
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model", &self.model)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl ModelAdapter {
    /// Where this adapter's records live.
    #[must_use]
    pub fn binding(&self) -> TableBinding {
        self.binding
    }

    /// Asks the ambient resolver for a subject. Failures are logged and
    /// treated as "no subject" so the write still goes through.
    async fn ambient_subject(&self) -> Option<String> {
        let resolver = self.subjects.as_ref()?;
        match resolver.current_subject().await {
            Ok(subject) => subject,
            Err(e) => {
                warn!(
                    model = %self.model,
                    error = %e,
                    "Ambient subject resolution failed; storing without user id"
                );
                None
            }
        }
    }

    /// Turns a degradable read failure into "not found". Any other error is
    /// handed back to the caller.
    fn degrade<T>(
        &self,
        operation: &'static str,
        result: AdapterResult<Option<T>>,
    ) -> AdapterResult<Option<T>> {
        match result {
            Err(e) if e.is_read_degradable() => {
                warn!(
                    model = %self.model,
                    operation,
                    error = %e,
                    "Storage read failed; reporting not found"
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// [`Self::degrade`] for lookups that have no error channel.
    fn degrade_lookup<T>(
        &self,
        operation: &'static str,
        result: AdapterResult<Option<T>>,
    ) -> Option<T> {
        self.degrade(operation, result).unwrap_or_else(|e| {
            error!(
                model = %self.model,
                operation,
                error = %e,
                "Lookup failed with a non-storage error"
            );
            None
        })
    }

    /// Returns the payload of `record` if it is live.
    fn live_payload(&self, record: Option<TokenRecord>) -> Option<Payload> {
        let now = self.clock.now();
        record
            .filter(|record| record.is_live(now))
            .map(|record| record.data)
    }

    async fn upsert_client(&self, id: &str, payload: Payload) -> AdapterResult<()> {
        let mut record = ClientRecord::from(ClientMetadata::from_payload(id, payload)?);
        record.id = id.to_string();
        self.store.upsert_client(record).await
    }

    async fn find_client(&self, id: &str) -> AdapterResult<Option<Payload>> {
        match self.store.find_client(id).await? {
            Some(record) => Ok(Some(ClientMetadata::from(record).into_payload()?)),
            None => Ok(None),
        }
    }

    async fn upsert_token(
        &self,
        table: TokenTable,
        id: &str,
        payload: Payload,
        expires_in: Option<u64>,
    ) -> AdapterResult<()> {
        let meta = RecordMetadata::project(self.model, &payload);
        let user_id = match meta.account_id {
            Some(account_id) => Some(account_id),
            None => self.ambient_subject().await,
        };
        let expires_at = match expires_in.filter(|seconds| *seconds > 0) {
            Some(seconds) => Some(
                i64::try_from(seconds)
                    .ok()
                    .and_then(|seconds| self.clock.now().checked_add(Duration::seconds(seconds)))
                    .ok_or_else(|| {
                        AdapterError::internal(format!("lifetime of {seconds}s is out of range"))
                    })?,
            ),
            None => None,
        };

        let record = TokenRecord {
            id: id.to_string(),
            data: payload,
            expires_at,
            consumed_at: None,
            user_id,
            client_id: meta.client_id,
            grant_id: meta.grant_id,
            user_code: meta.user_code,
        };
        self.store.upsert_token(table, record).await
    }

    async fn find_session_by_uid(&self, uid: &str) -> Option<Payload> {
        let found = self.degrade_lookup(
            "find_by_uid",
            self.store.find_session_by_uid(uid).await,
        )?;

        if found.is_expired(self.clock.now()) {
            debug!(model = %self.model, "Session found by uid has expired; destroying");
            if let Err(e) = self.store.delete_token(TokenTable::Session, &found.id).await {
                warn!(model = %self.model, error = %e, "Failed to destroy expired session");
            }
            return None;
        }

        self.live_payload(Some(found))
    }
}

#[async_trait]
impl Adapter for ModelAdapter {
    fn model(&self) -> ModelName {
        self.model
    }

    async fn upsert(
        &self,
        id: &str,
        payload: Payload,
        expires_in: Option<u64>,
    ) -> AdapterResult<()> {
        debug!(model = %self.model, expires_in, "upsert");
        match self.binding {
            TableBinding::Ephemeral => Ok(()),
            TableBinding::Clients => self.upsert_client(id, payload).await,
            TableBinding::Tokens(table) => self.upsert_token(table, id, payload, expires_in).await,
        }
    }

    async fn find(&self, id: &str) -> Option<Payload> {
        debug!(model = %self.model, "find");
        match self.binding {
            TableBinding::Ephemeral => None,
            TableBinding::Clients => self.degrade_lookup("find", self.find_client(id).await),
            TableBinding::Tokens(table) => {
                let record = self.degrade_lookup("find", self.store.find_token(table, id).await);
                self.live_payload(record)
            }
        }
    }

    async fn find_by_user_code(&self, user_code: &str) -> AdapterResult<Option<Payload>> {
        if self.model != ModelName::DeviceCode {
            return Err(AdapterError::unsupported("findByUserCode", self.model));
        }

        debug!(model = %self.model, "find_by_user_code");
        let record = self.degrade(
            "find_by_user_code",
            self.store
                .find_token_by_user_code(TokenTable::DeviceCode, user_code)
                .await,
        )?;
        Ok(self.live_payload(record))
    }

    async fn find_by_uid(&self, uid: &str) -> Option<Payload> {
        if self.model == ModelName::Session {
            debug!(model = %self.model, "find_by_uid");
            self.find_session_by_uid(uid).await
        } else {
            self.find(uid).await
        }
    }

    async fn find_session_by_user_id(&self, user_id: &str) -> AdapterResult<Option<Payload>> {
        if self.model != ModelName::Session {
            return Err(AdapterError::unsupported("findSessionByUserId", self.model));
        }

        debug!(model = %self.model, "find_session_by_user_id");
        let sessions = self
            .degrade(
                "find_session_by_user_id",
                self.store.find_sessions_by_user_id(user_id).await.map(Some),
            )?
            .unwrap_or_default();

        let now = self.clock.now();
        Ok(sessions
            .into_iter()
            .find(|session| session.is_live(now))
            .map(|session| session.data))
    }

    async fn consume(&self, id: &str) -> AdapterResult<()> {
        debug!(model = %self.model, "consume");
        match self.binding {
            TableBinding::Ephemeral => Ok(()),
            TableBinding::Clients => Err(AdapterError::unsupported("consume", self.model)),
            TableBinding::Tokens(table) => {
                self.store
                    .consume_token(table, id, self.clock.now())
                    .await
            }
        }
    }

    async fn destroy(&self, id: &str) -> AdapterResult<()> {
        debug!(model = %self.model, "destroy");
        match self.binding {
            TableBinding::Ephemeral => Ok(()),
            TableBinding::Clients => self.store.delete_client(id).await,
            TableBinding::Tokens(table) => self.store.delete_token(table, id).await,
        }
    }

    async fn revoke_by_grant_id(&self, grant_id: &str) -> AdapterResult<()> {
        if self.model == ModelName::Grant || self.binding == TableBinding::Ephemeral {
            return Ok(());
        }

        let deleted = self
            .store
            .delete_by_grant_id(&TokenTable::REVOCABLE, grant_id)
            .await?;
        info!(model = %self.model, deleted, "Revoked records by grant");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryTokenStore;
    use crate::subject::FixedSubject;
    use serde_json::json;
    use time::OffsetDateTime;

    struct FailingSubject;

    #[async_trait]
    impl SubjectResolver for FailingSubject {
        async fn current_subject(&self) -> AdapterResult<Option<String>> {
            Err(AdapterError::internal("session provider unavailable"))
        }
    }

    /// Store whose every call fails, for exercising failure semantics.
    struct FailingStore {
        error: fn() -> AdapterError,
    }

    impl FailingStore {
        fn down() -> Arc<Self> {
            Arc::new(Self {
                error: || AdapterError::storage("down"),
            })
        }

        fn failing_with(error: fn() -> AdapterError) -> Arc<Self> {
            Arc::new(Self { error })
        }
    }

    #[async_trait]
    impl TokenStore for FailingStore {
        async fn upsert_token(&self, _: TokenTable, _: TokenRecord) -> AdapterResult<()> {
            Err((self.error)())
        }
        async fn find_token(&self, _: TokenTable, _: &str) -> AdapterResult<Option<TokenRecord>> {
            Err((self.error)())
        }
        async fn find_token_by_user_code(
            &self,
            _: TokenTable,
            _: &str,
        ) -> AdapterResult<Option<TokenRecord>> {
            Err((self.error)())
        }
        async fn find_session_by_uid(&self, _: &str) -> AdapterResult<Option<TokenRecord>> {
            Err((self.error)())
        }
        async fn find_sessions_by_user_id(&self, _: &str) -> AdapterResult<Vec<TokenRecord>> {
            Err((self.error)())
        }
        async fn consume_token(
            &self,
            _: TokenTable,
            _: &str,
            _: OffsetDateTime,
        ) -> AdapterResult<()> {
            Err((self.error)())
        }
        async fn delete_token(&self, _: TokenTable, _: &str) -> AdapterResult<()> {
            Err((self.error)())
        }
        async fn delete_by_grant_id(&self, _: &[TokenTable], _: &str) -> AdapterResult<u64> {
            Err((self.error)())
        }
        async fn upsert_client(&self, _: ClientRecord) -> AdapterResult<()> {
            Err((self.error)())
        }
        async fn find_client(&self, _: &str) -> AdapterResult<Option<ClientRecord>> {
            Err((self.error)())
        }
        async fn delete_client(&self, _: &str) -> AdapterResult<()> {
            Err((self.error)())
        }
        async fn purge_expired(&self, _: OffsetDateTime) -> AdapterResult<u64> {
            Err((self.error)())
        }
    }

    fn setup() -> (Arc<MemoryTokenStore>, Arc<ManualClock>, AdapterFactory) {
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let factory = AdapterFactory::new(store.clone()).with_clock(clock.clone());
        (store, clock, factory)
    }

    #[test]
    fn test_unknown_model_fails_at_resolution() {
        let (_, _, factory) = setup();
        let err = factory.adapter("BackchannelAuthenticationRequest").unwrap_err();
        assert!(err.is_programming_error());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let (store, clock, factory) = setup();
        let adapter = factory.adapter("Grant").unwrap();
        adapter
            .upsert("g1", json!({"accountId": "u1"}), Some(0))
            .await
            .unwrap();

        let row = store
            .find_token(TokenTable::Grant, "g1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.expires_at, None);

        clock.advance(Duration::days(365));
        assert!(adapter.find("g1").await.is_some());
    }

    #[tokio::test]
    async fn test_metadata_columns_projected() {
        let (store, _, factory) = setup();
        let adapter = factory.adapter("RefreshToken").unwrap();
        adapter
            .upsert(
                "rt",
                json!({"accountId": "u1", "clientId": "app", "grantId": "g1"}),
                Some(60),
            )
            .await
            .unwrap();

        let row = store
            .find_token(TokenTable::RefreshToken, "rt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id.as_deref(), Some("u1"));
        assert_eq!(row.client_id.as_deref(), Some("app"));
        assert_eq!(row.grant_id.as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn test_find_returns_only_data() {
        let (_, _, factory) = setup();
        let adapter = factory.adapter("AccessToken").unwrap();
        let payload = json!({"accountId": "u1", "scope": "openid"});
        adapter.upsert("at", payload.clone(), Some(60)).await.unwrap();
        assert_eq!(adapter.find("at").await, Some(payload));
    }

    #[tokio::test]
    async fn test_ambient_subject_used_when_payload_has_none() {
        let (store, _, factory) = setup();
        let factory = factory.with_subject_resolver(Arc::new(FixedSubject::new("ambient")));
        let adapter = factory.adapter("Interaction").unwrap();
        adapter.upsert("i1", json!({"prompt": {}}), Some(60)).await.unwrap();

        let row = store
            .find_token(TokenTable::Interaction, "i1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id.as_deref(), Some("ambient"));
    }

    #[tokio::test]
    async fn test_payload_subject_wins_over_ambient() {
        let (store, _, factory) = setup();
        let factory = factory.with_subject_resolver(Arc::new(FixedSubject::new("ambient")));
        let adapter = factory.adapter("Session").unwrap();
        adapter
            .upsert("s1", json!({"uid": "x", "accountId": "u1"}), Some(60))
            .await
            .unwrap();

        let row = store
            .find_token(TokenTable::Session, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_ambient_failure_does_not_abort_write() {
        let (store, _, factory) = setup();
        let factory = factory.with_subject_resolver(Arc::new(FailingSubject));
        let adapter = factory.adapter("AuthorizationCode").unwrap();
        adapter.upsert("c1", json!({}), Some(60)).await.unwrap();

        let row = store
            .find_token(TokenTable::AuthorizationCode, "c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id, None);
        assert!(adapter.find("c1").await.is_some());
    }

    #[tokio::test]
    async fn test_replay_detection_is_noop() {
        let (store, _, factory) = setup();
        let adapter = factory.adapter("ReplayDetection").unwrap();
        adapter.upsert("jti", json!({"iat": 1}), Some(60)).await.unwrap();
        assert_eq!(adapter.find("jti").await, None);
        assert_eq!(adapter.find_by_uid("jti").await, None);
        adapter.consume("jti").await.unwrap();
        adapter.destroy("jti").await.unwrap();
        adapter.revoke_by_grant_id("g").await.unwrap();
        for table in TokenTable::ALL {
            assert_eq!(store.row_count(table).await, 0);
        }
    }

    #[tokio::test]
    async fn test_find_by_user_code_rejected_on_other_models() {
        let (_, _, factory) = setup();
        for name in ["AccessToken", "Session", "Client", "ReplayDetection"] {
            let err = factory
                .adapter(name)
                .unwrap()
                .find_by_user_code("ABCD")
                .await
                .unwrap_err();
            assert!(matches!(err, AdapterError::UnsupportedOperation { .. }), "{name}");
        }
    }

    #[tokio::test]
    async fn test_find_session_by_user_id_rejected_on_other_models() {
        let (_, _, factory) = setup();
        let err = factory
            .adapter("Grant")
            .unwrap()
            .find_session_by_user_id("u1")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_consume_on_client_is_unsupported() {
        let (_, _, factory) = setup();
        let err = factory.adapter("Client").unwrap().consume("app").await.unwrap_err();
        assert!(err.is_programming_error());
    }

    #[tokio::test]
    async fn test_consume_missing_row_propagates() {
        let (_, _, factory) = setup();
        let err = factory
            .adapter("AuthorizationCode")
            .unwrap()
            .consume("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reads_degrade_on_storage_failure() {
        let factory = AdapterFactory::new(FailingStore::down());

        let adapter = factory.adapter("AccessToken").unwrap();
        assert_eq!(adapter.find("x").await, None);

        let adapter = factory.adapter("Client").unwrap();
        assert_eq!(adapter.find("x").await, None);

        let adapter = factory.adapter("DeviceCode").unwrap();
        assert_eq!(adapter.find_by_user_code("ABCD").await.unwrap(), None);

        let adapter = factory.adapter("Session").unwrap();
        assert_eq!(adapter.find_by_uid("x").await, None);
        assert_eq!(adapter.find_session_by_user_id("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reads_propagate_non_storage_failures() {
        let factory = AdapterFactory::new(FailingStore::failing_with(|| {
            AdapterError::configuration("sessions table is not mapped")
        }));

        let adapter = factory.adapter("DeviceCode").unwrap();
        let err = adapter.find_by_user_code("ABCD").await.unwrap_err();
        assert!(matches!(err, AdapterError::Configuration { .. }));

        let adapter = factory.adapter("Session").unwrap();
        assert!(adapter.find_session_by_user_id("u1").await.is_err());
        // `find_by_uid` has no error channel.
        assert_eq!(adapter.find_by_uid("x").await, None);
    }

    #[tokio::test]
    async fn test_writes_propagate_storage_failure() {
        let factory = AdapterFactory::new(FailingStore::down());
        let adapter = factory.adapter("RefreshToken").unwrap();

        assert!(adapter.upsert("x", json!({}), Some(60)).await.is_err());
        assert!(adapter.consume("x").await.is_err());
        assert!(adapter.destroy("x").await.is_err());
        assert!(adapter.revoke_by_grant_id("g").await.is_err());

        let client = factory.adapter("Client").unwrap();
        assert!(client.upsert("app", json!({}), None).await.is_err());
        assert!(client.destroy("app").await.is_err());
    }

    #[tokio::test]
    async fn test_grant_adapter_never_touches_store_on_revoke() {
        let factory = AdapterFactory::new(FailingStore::down());
        factory
            .adapter("Grant")
            .unwrap()
            .revoke_by_grant_id("g")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired_uses_factory_clock() {
        let (store, clock, factory) = setup();
        let adapter = factory.adapter("AccessToken").unwrap();
        adapter.upsert("short", json!({}), Some(10)).await.unwrap();
        adapter.upsert("long", json!({}), Some(1000)).await.unwrap();

        clock.advance(Duration::seconds(11));
        assert_eq!(factory.purge_expired().await.unwrap(), 1);
        assert!(!store.contains(TokenTable::AccessToken, "short").await);
        assert!(store.contains(TokenTable::AccessToken, "long").await);
    }
}
