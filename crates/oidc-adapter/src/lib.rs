//! # oidc-adapter
//!
//! Persistence adapter and HTTP bridge for an embedded OpenID Connect
//! protocol engine.
//!
//! This crate provides:
//! - One adapter per protocol model (authorization codes, tokens, sessions,
//!   grants, interactions, clients, ...) over a pluggable [`TokenStore`]
//! - Expiry and consumption enforced on every read
//! - Atomic grant revocation across every token table
//! - A bridge that lets a Node-style `(req, res)` engine callback serve
//!   fetch-style axum requests
//!
//! ## Modules
//!
//! - [`adapter`] - Per-model persistence adapters and their factory
//! - [`model`] - Model names and the tables they map to
//! - [`record`] - Stored rows and payload metadata projection
//! - [`client`] - Client registration mapping
//! - [`storage`] - Storage backend trait and the in-memory backend
//! - [`subject`] - Ambient subject resolution
//! - [`clock`] - Time source
//! - [`http`] - Request/response bridge for the engine
//! - [`config`] - Configuration and loading
//! - [`observability`] - Log output driven by [`config::LoggingConfig`]

pub mod adapter;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod observability;
pub mod record;
pub mod storage;
pub mod subject;

pub use adapter::{Adapter, AdapterFactory, ModelAdapter};
pub use client::{ClientMetadata, ClientRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AdapterConfig, ConfigError, StorageBackend};
pub use error::{AdapterError, ErrorCategory};
pub use http::{
    BridgeError, BridgeState, CollectedResponse, InteractionContext, InteractionContextFactory,
    NodeCallback, NodeRequest, RedirectPolicy, RequestBody, RequestBridge, ResponseCollector,
    ResponseCompletion, bridge_handler,
};
pub use model::{ModelName, TableBinding, TokenTable};
pub use record::{Payload, RecordMetadata, TokenRecord};
pub use storage::{MemoryTokenStore, TokenStore};
pub use subject::{FixedSubject, SubjectResolver};

/// Type alias for adapter results.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use oidc_adapter::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AdapterResult;
    pub use crate::adapter::{Adapter, AdapterFactory};
    pub use crate::config::{AdapterConfig, ConfigError};
    pub use crate::error::{AdapterError, ErrorCategory};
    pub use crate::http::{
        InteractionContextFactory, NodeCallback, NodeRequest, RedirectPolicy, ResponseCollector,
    };
    pub use crate::model::{ModelName, TokenTable};
    pub use crate::record::Payload;
    pub use crate::storage::{MemoryTokenStore, TokenStore};
    pub use crate::subject::SubjectResolver;
}
