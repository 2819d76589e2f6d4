//! HTTP glue around the response cache.

use axum::{
    Router,
    extract::State,
    middleware,
    response::Response,
    routing::get,
};
use serde::Serialize;

use crate::cache::{CacheState, response_cache_layer};

mod respond;

pub use respond::{async_response, fail, success, success_uncached};

#[derive(Debug, Serialize)]
struct CacheStats {
    enabled: bool,
    len: usize,
    capacity: usize,
}

/// Wrap `routes` with the response cache middleware.
pub fn cached(routes: Router, state: CacheState) -> Router {
    routes.layer(middleware::from_fn_with_state(state, response_cache_layer))
}

/// Router served by the `sander` binary.
pub fn build_router(state: CacheState) -> Router {
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/cache/stats", get(cache_stats))
        .with_state(state.clone());

    cached(routes, state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn cache_stats(State(state): State<CacheState>) -> Response {
    success_uncached(CacheStats {
        enabled: state.config.enabled,
        len: state.cache.len(),
        capacity: state.cache.capacity(),
    })
}
