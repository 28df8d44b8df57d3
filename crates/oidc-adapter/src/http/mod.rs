//! Bridge between fetch-style HTTP and the Node-style callback the protocol
//! engine expects.
//!
//! - [`request`] - converts buffered requests into [`NodeRequest`]
//! - [`response`] - collects what the engine writes into a [`CollectedResponse`]
//! - [`dispatch`] - runs an engine callback for an axum request
//! - [`interaction`] - synthesizes requests for server-side interaction lookups

pub mod dispatch;
pub mod interaction;
pub mod request;
pub mod response;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub use dispatch::{BridgeState, NodeCallback, bridge_handler, dispatch};
pub use interaction::{InteractionContext, InteractionContextFactory};
pub use request::{NodeRequest, RequestBody, RequestBridge, SocketInfo};
pub use response::{
    CollectedResponse, HeaderField, RedirectPolicy, ResponseCollector, ResponseCompletion,
};

/// Errors raised while bridging a request through the engine.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The engine dropped the response without ending it.
    #[error("Response was dropped before it was ended")]
    ResponseAbandoned,

    /// The request body could not be buffered.
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// The request body is larger than the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// A synthetic request could not be constructed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ResponseAbandoned | Self::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let description = match &self {
            Self::Body(_) | Self::PayloadTooLarge { .. } => self.to_string(),
            // Internal details stay in the logs.
            _ => "The server encountered an unexpected error".to_string(),
        };
        let body = json!({
            "error": if status.is_client_error() { "invalid_request" } else { "server_error" },
            "error_description": description,
        });
        (status, Json(body)).into_response()
    }
}
