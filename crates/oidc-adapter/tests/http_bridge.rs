//! Bridge router driven by a small engine backed by the persistence adapters.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use oidc_adapter::prelude::*;
use oidc_adapter::{BridgeState, RequestBody};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Answers just enough of the protocol to exercise the bridge.
struct MiniEngine {
    adapters: AdapterFactory,
}

#[async_trait]
impl NodeCallback for MiniEngine {
    async fn handle(&self, req: NodeRequest, mut res: ResponseCollector) {
        let path = req.url.split('?').next().unwrap_or_default().to_string();
        let post = req.method == Method::POST;
        match path.as_str() {
            "/auth" if req.method == Method::GET => {
                // Engine style redirect: Location without touching the status.
                res.set_header("Location", "/oauth/consent/uid-1");
                res.end();
            }
            "/token" if post => {
                let code = req
                    .body
                    .as_ref()
                    .and_then(|body| body.field("code"))
                    .unwrap_or_default()
                    .to_string();
                let codes = self.adapters.for_model(ModelName::AuthorizationCode);
                let Some(grant) = codes.find(&code).await else {
                    res.write_head(400).set_header("Content-Type", "application/json");
                    res.end_with(r#"{"error":"invalid_grant"}"#);
                    return;
                };
                codes.consume(&code).await.unwrap();
                res.set_header("Content-Type", "application/json");
                res.set_header("Cache-Control", "no-store");
                res.end_with(
                    json!({"access_token": "at", "account": grant["accountId"]}).to_string(),
                );
            }
            "/reg" if post => {
                let echoed = match &req.body {
                    Some(RequestBody::Json(value)) => value.clone(),
                    _ => Value::Null,
                };
                res.write_head(201)
                    .set_header("Location", "/oauth/reg/app")
                    .set_header("Content-Type", "application/json");
                res.end_with(echoed.to_string());
            }
            _ => {
                res.write_head(404);
                res.end();
            }
        }
    }
}

fn router() -> (axum::Router, AdapterFactory) {
    let adapters = AdapterFactory::new(Arc::new(MemoryTokenStore::new()));
    let engine = Arc::new(MiniEngine {
        adapters: adapters.clone(),
    });
    let router = BridgeState::new(engine, &AdapterConfig::default()).into_router();
    (router, adapters)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn location_on_200_becomes_redirect() {
    let (router, _) = router();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/oauth/auth?client_id=app&response_type=code")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/oauth/consent/uid-1"
    );
}

#[tokio::test]
async fn explicit_201_with_location_is_kept() {
    let (router, _) = router();
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/oauth/reg")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"a":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({"a": 1}));
}

#[tokio::test]
async fn token_exchange_consumes_the_code() {
    let (router, adapters) = router();
    adapters
        .for_model(ModelName::AuthorizationCode)
        .upsert("code-1", json!({"accountId": "u1", "grantId": "g1"}), Some(600))
        .await
        .unwrap();

    let exchange = || {
        Request::builder()
            .method(Method::POST)
            .uri("/oauth/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("grant_type=authorization_code&code=code-1"))
            .unwrap()
    };

    let response = router.clone().oneshot(exchange()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    assert_eq!(body_json(response).await["account"], "u1");

    // Replay of a consumed code.
    let response = router.oneshot(exchange()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paths_outside_the_mount_are_not_routed() {
    let (router, _) = router();
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn interaction_context_round_trips_through_engine() {
    let (_, adapters) = router();
    let engine = MiniEngine { adapters };
    let factory = InteractionContextFactory::from_config(&AdapterConfig::default()).unwrap();
    let cookie = cookie::Cookie::new("_interaction", "uid-1");

    let ctx = factory.for_uid("uid-1", [&cookie]).unwrap();
    assert_eq!(ctx.request.url, "/consent/uid-1");
    assert_eq!(ctx.request.header("host"), Some("localhost:3000"));

    engine.handle(ctx.request, ctx.response).await;
    let collected = ctx.completion.wait().await.unwrap();
    assert_eq!(collected.status, 404);
}
