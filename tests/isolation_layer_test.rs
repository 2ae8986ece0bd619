mod common;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tower::{Layer, ServiceExt, service_fn};

use common::{FakePresence, base_policy, resolver_for};
use isolation_router::services::client_manager::{ClientError, IsolatedChannelManager};
use isolation_router::services::presence::PresenceError;
use isolation_router::services::router::{IsolationLayer, RouterError};

// 回显请求 URI 的下游服务
async fn echo_uri(req: http::Request<()>) -> Result<String, Infallible> {
    Ok(req.uri().to_string())
}

#[tokio::test]
async fn test_layer_rewrites_request_uri() {
    let presence = FakePresence::with_instances(&["svc-orders", "svc-orders-10002"]);
    let resolver = Arc::new(resolver_for(base_policy(), "10.0.0.2", presence));
    let service = IsolationLayer::new(resolver).layer(service_fn(echo_uri));

    let request = http::Request::builder()
        .uri("http://svc-orders.internal/api/x?id=7")
        .body(())
        .unwrap();
    let seen = service.oneshot(request).await.unwrap();
    assert_eq!(seen, "http://svc-orders-10002.internal/api/x?id=7");
}

#[tokio::test]
async fn test_layer_passes_shared_route_through() {
    let presence = FakePresence::with_instances(&["svc-orders"]);
    let resolver = Arc::new(resolver_for(base_policy(), "10.0.0.2", presence));
    let service = IsolationLayer::new(resolver).layer(service_fn(echo_uri));

    let request = http::Request::builder()
        .uri("http://svc-orders.internal/api/x")
        .body(())
        .unwrap();
    assert_eq!(
        service.oneshot(request).await.unwrap(),
        "http://svc-orders.internal/api/x"
    );
}

#[tokio::test]
async fn test_layer_fails_closed_on_registry_error() {
    let presence = FakePresence::failing(PresenceError::Directory("down".to_string()));
    let resolver = Arc::new(resolver_for(base_policy(), "10.0.0.2", presence));
    let service = IsolationLayer::new(resolver).layer(service_fn(echo_uri));

    let request = http::Request::builder()
        .uri("http://svc-orders.internal/api/x")
        .body(())
        .unwrap();
    let error = service.oneshot(request).await.unwrap_err();
    let route_error = error.downcast_ref::<RouterError>().unwrap();
    assert!(matches!(route_error, RouterError::PresenceUnavailable(_)));
}

#[tokio::test]
async fn test_channel_manager_caches_by_resolved_target() {
    let presence = FakePresence::with_instances(&["svc-orders", "svc-orders-10002"]);
    let resolver = Arc::new(resolver_for(base_policy(), "10.0.0.2", presence.clone()));
    let manager = IsolatedChannelManager::new(resolver, Duration::from_secs(1));

    manager.channel_for("http://svc-orders:50051/").await.unwrap();
    manager.channel_for("http://svc-orders:50051/").await.unwrap();
    manager.channel_for("http://payments:50051/").await.unwrap();

    assert_eq!(
        manager.cached_targets().await,
        vec!["http://payments:50051/", "http://svc-orders-10002:50051/"]
    );
    assert_eq!(presence.calls(), 2);

    assert!(manager.remove_channel("http://payments:50051/").await);
    assert!(!manager.remove_channel("http://payments:50051/").await);
    manager.clear_all().await;
    assert!(manager.cached_targets().await.is_empty());
}

#[tokio::test]
async fn test_channel_manager_creates_nothing_when_unresolved() {
    let presence = FakePresence::with_instances(&[]);
    let resolver = Arc::new(resolver_for(base_policy(), "10.0.0.2", presence));
    let manager = IsolatedChannelManager::new(resolver, Duration::from_secs(1));

    let result = manager.channel_for("http://svc-orders:50051/").await;
    assert!(matches!(
        result,
        Err(ClientError::Route(RouterError::DestinationUnresolved { .. }))
    ));
    assert!(manager.cached_targets().await.is_empty());
}
