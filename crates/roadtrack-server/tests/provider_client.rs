//! Routing client behavior against a stub provider.
//!
//! Each test binds a throwaway HTTP server on an ephemeral port and points
//! the client at it, so retry classification and repair strategies are
//! exercised over a real transport.

use axum::extract::RawQuery;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use roadtrack_core::models::Coordinate;
use roadtrack_server::config::Config;
use roadtrack_server::provider::{RoutingClient, RoutingError};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const START: Coordinate = Coordinate { lat: 37.7749, lon: -122.4194 };
const END: Coordinate = Coordinate { lat: 37.7849, lon: -122.4094 };

async fn spawn_stub(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> RoutingClient {
    let mut config = Config::from_env();
    config.provider_url = format!("http://{}", addr);
    config.provider_api_key = Some("test-key".to_string());
    RoutingClient::new(&config)
}

fn ok_payload() -> serde_json::Value {
    json!({
        "paths": [{
            "distance": 1523.4,
            "time": 210000,
            "points": {
                "type": "LineString",
                "coordinates": [[-122.4194, 37.7749], [-122.4094, 37.7849]]
            },
            "instructions": [
                {"text": "Head northeast", "distance": 1523.4, "time": 210000, "sign": 0}
            ]
        }]
    })
}

#[tokio::test]
async fn success_is_parsed_and_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/route",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(ok_payload())
            }
        }),
    );
    let client = client_for(spawn_stub(app).await);

    let route = client.fetch_route(START, END, true).await.unwrap();
    assert_eq!(route.distance_m, 1523.4);
    assert_eq!(route.duration_ms, 210_000);
    assert_eq!(route.polyline.len(), 2);
    assert_eq!(route.instructions.len(), 1);

    // Same endpoints within the TTL: served from cache, no second call.
    client.fetch_route(START, END, true).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthorized_is_terminal_after_one_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/route",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::UNAUTHORIZED, "bad key")
            }
        }),
    );
    let client = client_for(spawn_stub(app).await);

    let err = client.fetch_route(START, END, true).await.unwrap_err();
    assert!(matches!(err, RoutingError::Unauthorized(401)), "got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "401 must not be retried");
}

#[tokio::test]
async fn transient_errors_retry_until_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/route",
        get(move || {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response()
                } else {
                    Json(ok_payload()).into_response()
                }
            }
        }),
    );
    let client = client_for(spawn_stub(app).await);

    let route = client.fetch_route(START, END, true).await.unwrap();
    assert_eq!(route.polyline.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limit_honors_retry_after() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/route",
        get(move || {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [("retry-after", "1")],
                        "slow down",
                    )
                        .into_response()
                } else {
                    Json(ok_payload()).into_response()
                }
            }
        }),
    );
    let client = client_for(spawn_stub(app).await);

    let started = Instant::now();
    let route = client.fetch_route(START, END, true).await.unwrap();
    assert_eq!(route.polyline.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(
        started.elapsed().as_millis() >= 1_000,
        "provider retry-after must dominate the shorter backoff"
    );
}

#[tokio::test]
async fn exhaustion_applies_repair_strategies_in_order() {
    let queries: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = queries.clone();
    let app = Router::new().route(
        "/route",
        get(move |RawQuery(query): RawQuery| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(query.unwrap_or_default());
                // Success status but no usable route: retryable every time.
                Json(json!({"paths": []}))
            }
        }),
    );
    let client = client_for(spawn_stub(app).await);

    let err = client.fetch_route(START, END, true).await.unwrap_err();
    assert!(matches!(err, RoutingError::NoRoute), "got {err:?}");

    let queries = queries.lock().unwrap();
    assert_eq!(queries.len(), 5, "budget is exactly five attempts");

    // Attempt 0: baseline lat,lon order, CH enabled.
    assert!(queries[0].contains("point=37.7749%2C-122.4194"));
    assert!(!queries[0].contains("ch.disable"));
    assert!(queries[0].contains("key=test-key"));
    // Attempt 1: axis swap.
    assert!(queries[1].contains("point=-122.4194%2C37.7749"));
    assert!(!queries[1].contains("ch.disable"));
    // Attempt 2: CH bypass, baseline order.
    assert!(queries[2].contains("point=37.7749%2C-122.4194"));
    assert!(queries[2].contains("ch.disable=true"));
    // Attempt 3: swap and CH bypass combined.
    assert!(queries[3].contains("point=-122.4194%2C37.7749"));
    assert!(queries[3].contains("ch.disable=true"));
    // Attempt 4: CH bypass plus a northward origin nudge.
    assert!(queries[4].contains("ch.disable=true"));
    assert!(queries[4].contains("point=37.7753"), "origin should be nudged: {}", queries[4]);
}
