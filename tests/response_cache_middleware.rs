use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, Uri, header},
    response::Response,
    routing::get,
};
use sander::cache::{CacheConfig, CacheKey, CachePopulator, CacheState, HttpResponseCache};
use sander::http::{cached, fail, success, success_uncached};
use serde_json::{Value, json};
use tower::ServiceExt;

const SENTINEL: &str = "/sentinel";
const BODY_LIMIT: usize = 1024;
// `{"code":0,"msg":"ok","data":""}` around a string payload.
const ENVELOPE_LEN: usize = 31;
const UNCACHEABLE: [&str; 4] = [
    "/topics/latest",
    "/topics/missing",
    "/topics/broken",
    "/topics/huge",
];

struct Harness {
    app: Router,
    cache: Arc<HttpResponseCache>,
    calls: Arc<AtomicUsize>,
}

fn counted<F>(
    calls: &Arc<AtomicUsize>,
    respond: F,
) -> impl Fn() -> std::future::Ready<Response> + Clone + use<F>
where
    F: Fn() -> Response + Clone,
{
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(respond())
    }
}

fn harness(config: CacheConfig) -> Harness {
    let cache = Arc::new(HttpResponseCache::from_config(&config));
    let (populator, _handle) = CachePopulator::spawn(Arc::clone(&cache), &config);
    let calls = Arc::new(AtomicUsize::new(0));

    let routes = Router::new()
        .route(
            "/topics",
            get(counted(&calls, || success(json!({"topics": ["rust", "go"]}))))
                .post(counted(&calls, || success(json!({"created": true})))),
        )
        .route(
            "/topics/latest",
            get(counted(&calls, || success_uncached(json!({"topics": ["fresh"]})))),
        )
        .route(
            "/topics/missing",
            get(counted(&calls, || fail(1, "topic not found"))),
        )
        .route(
            "/topics/broken",
            get(counted(&calls, || {
                let mut response = success(json!({"partial": true}));
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response
            })),
        )
        .route(
            "/topics/huge",
            get(counted(&calls, || success("x".repeat(4096)))),
        )
        .route(
            "/topics/at-limit",
            get(counted(&calls, || success("y".repeat(BODY_LIMIT - ENVELOPE_LEN)))),
        )
        .route(
            "/topics/over-limit",
            get(counted(&calls, || success("z".repeat(BODY_LIMIT - ENVELOPE_LEN + 1)))),
        )
        .route(SENTINEL, get(|| async { success("sentinel") }));

    let state = CacheState {
        config,
        cache: Arc::clone(&cache),
        populator,
    };

    Harness {
        app: cached(routes, state),
        cache,
        calls,
    }
}

fn config() -> CacheConfig {
    CacheConfig {
        capacity: 8,
        // One worker keeps population in submission order.
        populate_workers: 1,
        body_limit_bytes: BODY_LIMIT,
        ..Default::default()
    }
}

fn key(uri: &str) -> CacheKey {
    let uri: Uri = uri.parse().expect("valid uri");
    CacheKey::from_request(&Method::GET, &uri)
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

async fn get_uri(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds");
    send(app, request).await
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    serde_json::from_slice(&bytes).expect("body should be json")
}

async fn wait_for(cache: &HttpResponseCache, key: &CacheKey) {
    for _ in 0..200 {
        if cache.contains(key) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{key} was never cached");
}

/// Populate the sentinel and wait for it; earlier submissions have landed by then.
async fn settle(harness: &Harness) {
    let response = get_uri(&harness.app, SENTINEL).await;
    assert_eq!(response.status(), StatusCode::OK);
    wait_for(&harness.cache, &key(SENTINEL)).await;
}

#[tokio::test]
async fn second_get_is_served_from_cache() {
    let harness = harness(config());

    let first = get_uri(&harness.app, "/topics").await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_json(first).await;
    wait_for(&harness.cache, &key("/topics")).await;

    let second = get_uri(&harness.app, "/topics").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        second.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"application/json"[..])
    );
    assert_eq!(body_json(second).await, first_body);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_order_shares_one_entry() {
    let harness = harness(config());

    get_uri(&harness.app, "/topics?page=2&tab=hot").await;
    wait_for(&harness.cache, &key("/topics?tab=hot&page=2")).await;
    get_uri(&harness.app, "/topics?tab=hot&page=2").await;

    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    assert!(!harness.cache.contains(&key("/topics")));
}

#[tokio::test]
async fn unmarked_and_failed_responses_are_not_cached() {
    let harness = harness(config());

    for uri in UNCACHEABLE {
        get_uri(&harness.app, uri).await;
    }
    settle(&harness).await;

    assert_eq!(harness.cache.keys_by_recency(), vec![key(SENTINEL)]);

    for uri in UNCACHEABLE {
        get_uri(&harness.app, uri).await;
    }
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2 * UNCACHEABLE.len());
}

#[tokio::test]
async fn oversized_body_is_still_served() {
    let harness = harness(config());

    let response = get_uri(&harness.app, "/topics/huge").await;
    let body = body_json(response).await;

    assert_eq!(body["data"].as_str().map(str::len), Some(4096));
}

async fn body_len(response: Response) -> usize {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect")
        .len()
}

#[tokio::test]
async fn body_exactly_at_limit_is_cached() {
    let harness = harness(config());

    let first = get_uri(&harness.app, "/topics/at-limit").await;
    assert_eq!(body_len(first).await, BODY_LIMIT);
    wait_for(&harness.cache, &key("/topics/at-limit")).await;

    let second = get_uri(&harness.app, "/topics/at-limit").await;
    assert_eq!(body_len(second).await, BODY_LIMIT);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn body_one_byte_over_limit_is_not_cached() {
    let harness = harness(config());

    let response = get_uri(&harness.app, "/topics/over-limit").await;
    assert_eq!(body_len(response).await, BODY_LIMIT + 1);
    settle(&harness).await;

    assert!(!harness.cache.contains(&key("/topics/over-limit")));
    get_uri(&harness.app, "/topics/over-limit").await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_get_requests_pass_through() {
    let harness = harness(config());

    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/topics")
            .body(Body::empty())
            .expect("request builds");
        let response = send(&harness.app, request).await;
        assert_eq!(body_json(response).await["data"], json!({"created": true}));
    }
    settle(&harness).await;

    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.cache.len(), 1);
}

#[tokio::test]
async fn no_cache_header_skips_lookup_and_store() {
    let harness = harness(config());

    for _ in 0..2 {
        let request = Request::builder()
            .uri("/topics")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::empty())
            .expect("request builds");
        send(&harness.app, request).await;
    }
    settle(&harness).await;

    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
    assert!(!harness.cache.contains(&key("/topics")));
}

#[tokio::test]
async fn disabled_cache_always_runs_handler() {
    let harness = harness(CacheConfig {
        enabled: false,
        ..config()
    });

    for _ in 0..3 {
        get_uri(&harness.app, "/topics").await;
    }

    assert_eq!(harness.calls.load(Ordering::SeqCst), 3);
    assert!(harness.cache.is_empty());
}
