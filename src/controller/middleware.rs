//! Scoped middleware: the callable, the chain it runs in, and the registry
//! that remembers which groups each one was registered under.

use super::ControllerId;
use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Boxed response future returned by middleware and by the action stage.
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Terminal stage run after the last middleware of a chain.
pub(crate) type Endpoint = Arc<dyn Fn(Request) -> BoxResponseFuture + Send + Sync + 'static>;

type MiddlewareFn = dyn Fn(Request, Next) -> BoxResponseFuture + Send + Sync + 'static;

static NEXT_MIDDLEWARE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a middleware, stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MiddlewareId(u64);

impl MiddlewareId {
    fn next() -> Self {
        MiddlewareId(NEXT_MIDDLEWARE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mw#{}", self.0)
    }
}

/// A request-processing function run before an action's handler.
///
/// Build one with [`from_fn`]. Cloning is cheap and keeps the same
/// [`MiddlewareId`].
#[derive(Clone)]
pub struct Middleware {
    id: MiddlewareId,
    handler: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn id(&self) -> MiddlewareId {
        self.id
    }

    pub(crate) fn call(&self, req: Request, next: Next) -> BoxResponseFuture {
        (self.handler)(req, next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").field("id", &self.id).finish()
    }
}

/// Wraps an async function into a [`Middleware`].
///
/// The function receives the request and the rest of the chain, exactly like
/// `axum::middleware::from_fn`, and may short-circuit by returning without
/// calling [`Next::run`].
///
/// ```rust
/// use axum::{extract::Request, response::Response};
/// use axum_scopes::{Next, from_fn};
///
/// async fn log_path(req: Request, next: Next) -> Response {
///     tracing::info!(path = %req.uri().path(), "request");
///     next.run(req).await
/// }
///
/// let middleware = from_fn(log_path);
/// ```
pub fn from_fn<F, Fut, Out>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    Out: IntoResponse + 'static,
{
    let handler = move |req: Request, next: Next| -> BoxResponseFuture {
        let fut = f(req, next);
        Box::pin(async move { fut.await.into_response() })
    };
    Middleware {
        id: MiddlewareId::next(),
        handler: Arc::new(handler),
    }
}

/// A resolved, ordered list of middleware.
#[derive(Debug, Clone, Default)]
pub struct Chain(Vec<Middleware>);

impl Chain {
    pub(crate) fn new(middleware: Vec<Middleware>) -> Self {
        Chain(middleware)
    }

    pub fn ids(&self) -> Vec<MiddlewareId> {
        self.0.iter().map(Middleware::id).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Middleware> {
        self.0.get(index)
    }
}

/// The remainder of a chain, handed to each middleware.
pub struct Next {
    chain: Arc<Chain>,
    position: usize,
    endpoint: Endpoint,
}

impl Next {
    pub(crate) fn new(chain: Arc<Chain>, endpoint: Endpoint) -> Self {
        Self {
            chain,
            position: 0,
            endpoint,
        }
    }

    /// Runs the next middleware, or the action once the chain is exhausted.
    pub async fn run(mut self, req: Request) -> Response {
        match self.chain.get(self.position).cloned() {
            Some(middleware) => {
                self.position += 1;
                middleware.call(req, self).await
            }
            None => (self.endpoint)(req).await,
        }
    }

    /// Number of middleware still to run before the action.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.position)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// A middleware together with the scope it was registered under.
#[derive(Debug, Clone)]
pub(crate) struct MiddlewareEntry {
    pub middleware: Middleware,
    /// Never empty; immutable once registered.
    pub scope: Arc<[String]>,
    pub controller: ControllerId,
    /// Registered inline by `define`, scoped to the action name.
    pub anonymous: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MiddlewareRegistry {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareRegistry {
    pub fn push(&mut self, entry: MiddlewareEntry) {
        self.entries.push(entry);
    }

    /// Removes the anonymous middleware whose primary group is `action`.
    /// Returns how many were removed.
    pub fn remove_anonymous(&mut self, action: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !entry.anonymous || entry.scope.first().map(String::as_str) != Some(action)
        });
        before - self.entries.len()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &MiddlewareEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::sync::Mutex;

    fn entry(middleware: &Middleware, groups: &[&str], anonymous: bool) -> MiddlewareEntry {
        MiddlewareEntry {
            middleware: middleware.clone(),
            scope: groups.iter().map(|g| g.to_string()).collect(),
            controller: ControllerId::generate(),
            anonymous,
        }
    }

    fn recorder(log: Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Middleware {
        from_fn(move |req: Request, next: Next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label);
                next.run(req).await
            }
        })
    }

    fn endpoint(log: Arc<Mutex<Vec<&'static str>>>) -> Endpoint {
        Arc::new(move |_req: Request| -> BoxResponseFuture {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push("handler");
                "done".into_response()
            })
        })
    }

    #[test]
    fn test_middleware_ids_are_unique_and_stable() {
        let a = from_fn(|req: Request, next: Next| next.run(req));
        let b = from_fn(|req: Request, next: Next| next.run(req));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[tokio::test]
    async fn test_next_runs_chain_in_order_then_endpoint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new(vec![
            recorder(log.clone(), "first"),
            recorder(log.clone(), "second"),
        ]);

        let next = Next::new(Arc::new(chain), endpoint(log.clone()));
        assert_eq!(next.remaining(), 2);

        let response = next.run(Request::new(Body::empty())).await;
        assert_eq!(response.status(), 200);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "handler"]);
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let deny = from_fn(|_req: Request, _next: Next| async {
            (axum::http::StatusCode::FORBIDDEN, "denied")
        });
        let chain = Chain::new(vec![deny, recorder(log.clone(), "after")]);

        let response = Next::new(Arc::new(chain), endpoint(log.clone()))
            .run(Request::new(Body::empty()))
            .await;

        assert_eq!(response.status(), 403);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_anonymous_only_touches_named_action() {
        let m1 = from_fn(|req: Request, next: Next| next.run(req));
        let m2 = from_fn(|req: Request, next: Next| next.run(req));
        let m3 = from_fn(|req: Request, next: Next| next.run(req));
        let m4 = from_fn(|req: Request, next: Next| next.run(req));

        let mut registry = MiddlewareRegistry::default();
        registry.push(entry(&m1, &["show"], true));
        registry.push(entry(&m2, &["show"], false));
        registry.push(entry(&m3, &["index"], true));
        registry.push(entry(&m4, &["show"], true));

        assert_eq!(registry.remove_anonymous("show"), 2);
        let left: Vec<MiddlewareId> = registry.iter().map(|e| e.middleware.id()).collect();
        assert_eq!(left, vec![m2.id(), m3.id()]);
        assert_eq!(registry.iter().count(), 2);
    }
}
