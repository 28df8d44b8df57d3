//! Runs the engine callback for axum requests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::any,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use super::{
    BridgeError, CollectedResponse, NodeRequest, RedirectPolicy, RequestBridge, ResponseCollector,
};
use crate::config::AdapterConfig;

/// A Node-style `(req, res)` request handler.
///
/// Implementations must eventually call [`ResponseCollector::end`], either
/// before returning or from a task that owns the collector.
#[async_trait]
pub trait NodeCallback: Send + Sync {
    async fn handle(&self, req: NodeRequest, res: ResponseCollector);
}

/// Converts `request`, runs `engine` and waits for the response.
///
/// # Errors
///
/// Returns [`BridgeError::Body`] if the body cannot be read and
/// [`BridgeError::ResponseAbandoned`] if the engine never ends the response.
pub async fn dispatch(
    engine: &dyn NodeCallback,
    requests: &RequestBridge,
    policy: RedirectPolicy,
    request: Request,
) -> Result<CollectedResponse, BridgeError> {
    let req = requests.convert_axum(request).await?;
    let path = req.url.split('?').next().unwrap_or_default();
    debug!(method = %req.method, path = %path, "Dispatching to engine");

    let (res, completion) = ResponseCollector::new(policy);
    engine.handle(req, res).await;
    completion.wait().await
}

/// Shared state for [`bridge_handler`].
#[derive(Clone)]
pub struct BridgeState {
    engine: Arc<dyn NodeCallback>,
    requests: Arc<RequestBridge>,
    policy: RedirectPolicy,
    mount_path: String,
}

impl BridgeState {
    #[must_use]
    pub fn new(engine: Arc<dyn NodeCallback>, config: &AdapterConfig) -> Self {
        Self {
            engine,
            requests: Arc::new(RequestBridge::from_config(&config.provider, &config.bridge)),
            policy: config.bridge.redirect_policy,
            mount_path: config.provider.mount_path.trim_end_matches('/').to_string(),
        }
    }

    /// Routes the mount path and everything below it to the engine.
    pub fn into_router(self) -> Router {
        let mount = if self.mount_path.is_empty() {
            "/".to_string()
        } else {
            self.mount_path.clone()
        };
        let nested = format!("{}/{{*rest}}", self.mount_path);
        Router::new()
            .route(&mount, any(bridge_handler))
            .route(&nested, any(bridge_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("requests", &self.requests)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Axum handler forwarding to the engine.
pub async fn bridge_handler(State(state): State<BridgeState>, request: Request) -> Response {
    match dispatch(state.engine.as_ref(), &state.requests, state.policy, request).await {
        Ok(collected) => collected.into_response(),
        Err(e) => {
            error!(error = %e, "Engine request failed");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestBody;
    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};

    struct EchoEngine;

    #[async_trait]
    impl NodeCallback for EchoEngine {
        async fn handle(&self, req: NodeRequest, mut res: ResponseCollector) {
            if req.url.starts_with("/auth") {
                res.set_header("Location", "/oauth/consent/abc");
                res.end();
                return;
            }
            let grant_type = req
                .body
                .as_ref()
                .and_then(|b| b.field("grant_type"))
                .unwrap_or("none")
                .to_string();
            res.set_header("Content-Type", "text/plain");
            res.end_with(format!(
                "{} {} {} {}",
                req.method, req.url, req.socket.remote_address, grant_type
            ));
        }
    }

    struct SilentEngine;

    #[async_trait]
    impl NodeCallback for SilentEngine {
        async fn handle(&self, _req: NodeRequest, _res: ResponseCollector) {}
    }

    fn state(engine: Arc<dyn NodeCallback>) -> BridgeState {
        BridgeState::new(engine, &AdapterConfig::default())
    }

    #[tokio::test]
    async fn test_dispatch_passes_parsed_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/oauth/token?x=1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", "198.51.100.2")
            .body(Body::from("grant_type=client_credentials"))
            .unwrap();

        let collected = dispatch(
            &EchoEngine,
            &RequestBridge::new("/oauth"),
            RedirectPolicy::default(),
            request,
        )
        .await
        .unwrap();
        assert_eq!(collected.status, 200);
        assert_eq!(
            collected.body_text(),
            "POST /token?x=1 198.51.100.2 client_credentials"
        );
    }

    #[tokio::test]
    async fn test_handler_upgrades_redirect() {
        let request = Request::builder()
            .uri("/oauth/auth?client_id=app")
            .body(Body::empty())
            .unwrap();
        let response = bridge_handler(State(state(Arc::new(EchoEngine))), request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/oauth/consent/abc"
        );
    }

    #[tokio::test]
    async fn test_abandoned_response_is_server_error() {
        let request = Request::builder().uri("/oauth/me").body(Body::empty()).unwrap();
        let response = bridge_handler(State(state(Arc::new(SilentEngine))), request).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_before_engine() {
        let mut config = AdapterConfig::default();
        config.bridge.max_body_bytes = 16;
        let state = BridgeState::new(Arc::new(EchoEngine), &config);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/oauth/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("grant_type=client_credentials&scope=openid"))
            .unwrap();
        let response = bridge_handler(State(state), request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_request_body_field_lookup() {
        let body = RequestBody::Text("plain".into());
        assert_eq!(body.field("grant_type"), None);
    }
}
