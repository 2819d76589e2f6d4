//! JSON envelope responses shared by API handlers.
//!
//! Every API answer is `200 OK` with `{"code": .., "msg": .., "data": ..}`;
//! `code == 0` means success. Only [`success`] marks the response cacheable.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use serde::Serialize;
use tracing::error;

use crate::cache::Cacheable;

#[derive(Debug, Serialize)]
struct SuccessBody<T> {
    code: i32,
    msg: &'static str,
    data: T,
}

#[derive(Debug, Serialize)]
struct FailBody {
    code: i32,
    msg: String,
}

/// Successful envelope that the response cache may store and replay.
pub fn success<T: Serialize>(data: T) -> Response {
    let mut response = success_uncached(data);
    if response.status().is_success() {
        response.extensions_mut().insert(Cacheable);
    }
    response
}

/// Successful envelope that must not be cached, e.g. right after the user posted content.
pub fn success_uncached<T: Serialize>(data: T) -> Response {
    Json(SuccessBody {
        code: 0,
        msg: "ok",
        data,
    })
    .into_response()
}

/// Failure envelope. Never cached.
pub fn fail(code: i32, msg: impl Into<String>) -> Response {
    let msg = msg.into();
    error!(code, msg = %msg, "operate fail");
    Json(FailBody { code, msg }).into_response()
}

/// Run `task` in the background and answer immediately with an empty success.
///
/// A panic inside the task is logged and otherwise ignored.
pub fn async_response<F, Fut>(task: F) -> Response
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = task();
    tokio::spawn(async move {
        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
            error!("async response task panicked");
        }
    });

    success_uncached(())
}
