//! Response cache middleware.
//!
//! Serves cached GET responses and hands cacheable misses to the background
//! populator. Whether a response is cacheable is decided by the handler: only
//! responses carrying the [`Cacheable`] extension are stored.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{CacheConfig, CacheKey, CachePopulator, HttpResponseCache};

/// Response extension marking a JSON body as safe to share between identical requests.
#[derive(Debug, Clone, Copy)]
pub struct Cacheable;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub cache: Arc<HttpResponseCache>,
    pub populator: CachePopulator<CacheKey>,
}

/// Middleware for response caching.
///
/// Hits are answered from the cache without running the handler. Misses run
/// the handler and, for `200 OK` responses marked [`Cacheable`], queue the body
/// for compression and insertion after the response is built.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    if bypasses_cache(request.headers()) {
        debug!(cache = "response", outcome = "bypass", "client asked to skip cache");
        return next.run(request).await;
    }

    let key = CacheKey::from_request(request.method(), request.uri());

    if let Some(body) = state.cache.get_and_uncompress(&key) {
        debug!(
            cache = "response",
            outcome = "hit",
            key = %key,
            key_fp = key.fingerprint(),
            "serving cached response"
        );
        return build_response(body);
    }

    debug!(
        cache = "response",
        outcome = "miss",
        key = %key,
        key_fp = key.fingerprint(),
        "cache miss, executing handler"
    );

    let response = next.run(request).await;

    if response.status() != StatusCode::OK || response.extensions().get::<Cacheable>().is_none() {
        return response;
    }

    let (parts, body) = response.into_parts();

    let within_limit = body
        .size_hint()
        .upper()
        .is_some_and(|len| len <= state.config.body_limit_bytes as u64);
    if !within_limit {
        debug!(
            cache = "response",
            limit = state.config.body_limit_bytes,
            "response body too large or unsized, not caching"
        );
        return Response::from_parts(parts, body);
    }

    let bytes = match axum::body::to_bytes(body, state.config.body_limit_bytes).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(cache = "response", error = %error, "failed to collect response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    state.populator.submit(key, bytes.clone());

    Response::from_parts(parts, Body::from(bytes))
}

/// Honour `Cache-Control: no-cache` and `no-store` on the request.
fn bypasses_cache(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|directive| {
            directive.eq_ignore_ascii_case("no-cache") || directive.eq_ignore_ascii_case("no-store")
        })
}

/// Build a response from a cached JSON body.
fn build_response(body: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
