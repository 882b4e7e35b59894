//! Test helpers for controller tests.
//!
//! These tests build a controller tree, turn it into an `axum::Router` and
//! drive it with `oneshot()`: no sockets, no server. Middleware and handlers
//! record what ran into a shared [`Log`] so the tests can assert on order.
//!
//! ## Test Organization
//!
//! - `ordering`: scope ranking, tie-breaks, inline middleware
//! - `caching`: hit/miss accounting and invalidation
//! - `dispatch`: end-to-end requests, request extensions, errors
//! - `tree`: mounting, ancestor precedence
//! - `registration`: argument validation and inspection
//! - `logging`: emitted tracing events

use crate::{Middleware, Next, from_fn};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

#[cfg(test)]
pub(crate) mod caching;

// ============================================================================
// Recording helpers
// ============================================================================

/// Labels of the middleware and handlers that ran, in order.
pub(crate) type Log = Arc<Mutex<Vec<&'static str>>>;

pub(crate) fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

/// Middleware that records `label` and continues.
pub(crate) fn recorder(log: &Log, label: &'static str) -> Middleware {
    let log = log.clone();
    from_fn(move |req: axum::extract::Request, next: Next| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(label);
            next.run(req).await
        }
    })
}

type LabelFuture = Pin<Box<dyn Future<Output = &'static str> + Send>>;

/// Action handler that records `label` and returns it as the body.
pub(crate) fn handler(
    log: &Log,
    label: &'static str,
) -> impl Fn() -> LabelFuture + Clone + Send + Sync + 'static + use<> {
    let log = log.clone();
    move || -> LabelFuture {
        let log = log.clone();
        Box::pin(async move {
            log.lock().unwrap().push(label);
            label
        })
    }
}

// ============================================================================
// Request Helpers
// ============================================================================

pub(crate) fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub(crate) async fn send(app: &Router, method: &str, uri: &str) -> Response {
    app.clone().oneshot(request(method, uri)).await.unwrap()
}

pub(crate) async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Sends a GET and asserts it succeeded.
pub(crate) async fn get_ok(app: &Router, uri: &str) -> String {
    let response = send(app, "GET", uri).await;
    let status = response.status();
    let body = body_string(response).await;
    assert_eq!(status, StatusCode::OK, "GET {uri} failed: {body}");
    body
}
