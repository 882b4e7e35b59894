//! Per-request dispatch and the axum router built from a controller tree.

use super::{
    Controller,
    cache::ChainKey,
    middleware::{BoxResponseFuture, Chain, Endpoint, MiddlewareEntry, Next},
    scope::{Scope, order_chain},
};
use crate::{Error, utils::read};
use axum::{
    Router,
    extract::Request,
    response::{IntoResponse, Response},
    routing::on,
};
use http::Method;
use std::sync::{Arc, atomic::Ordering};
use tower::ServiceExt;

impl Controller {
    /// Builds an axum router serving every route of this controller and of
    /// its mounted sub-controllers.
    ///
    /// Routes declared after this call are not part of the returned router;
    /// declaring one logs a warning.
    pub fn router(&self) -> Router {
        self.inner.router_built.store(true, Ordering::Relaxed);
        let mut router = Router::new();

        for route in read(&self.inner.routes).iter() {
            let controller = self.clone();
            let method = route.method.clone();
            let path: Arc<str> = Arc::from(route.path.as_str());
            let handler = move |req: Request| {
                let controller = controller.clone();
                let method = method.clone();
                let path = path.clone();
                async move { controller.dispatch(method, path, req).await }
            };
            router = router.route(&route.path, on(route.filter, handler));
        }

        for mount in read(&self.inner.children).iter() {
            let child = mount.controller.router();
            router = if mount.path == "/" {
                router.merge(child)
            } else {
                router.nest(&mount.path, child)
            };
        }

        router
    }

    /// Merges this controller's routes into an existing application router.
    pub fn attach<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.merge(self.router().with_state::<S>(()))
    }

    /// Runs the scoped chain and then the action bound to `(method, path)`.
    async fn dispatch(self, method: Method, path: Arc<str>, mut req: Request) -> Response {
        let (slot, action) = match read(&self.inner.routes).find(&method, &path) {
            Some(route) => (Some(route.slot.clone()), Some(route.action.clone())),
            None => (None, None),
        };

        let info = action.as_deref().and_then(|name| self.action_info(name));
        let scope = match &info {
            Some(info) => Scope::for_action(&info.name, &info.groups),
            None => Scope::base(),
        };

        let key = ChainKey::new(&*path, scope);
        let (chain, hit) = self
            .inner
            .cache
            .get_or_resolve(key, |scope| self.resolve(scope));
        tracing::debug!(
            controller = %self.inner.id,
            method = %method,
            path = %path,
            action = action.as_deref().unwrap_or_default(),
            hit,
            "Chain lookup"
        );
        if self.inner.log_chains {
            let ids: Vec<String> = chain.ids().iter().map(ToString::to_string).collect();
            tracing::debug!(path = %path, chain = ?ids, "Resolved chain");
        }

        let chain = match slot {
            Some(slot) => {
                if slot.splice(&chain) {
                    tracing::debug!(path = %path, len = chain.len(), "Spliced chain into route");
                }
                slot.current()
            }
            None => chain,
        };

        if let Some(info) = info {
            req.extensions_mut().insert(info);
        }
        req.extensions_mut().insert(self.clone());

        let endpoint = self.action_stage(method, action);
        Next::new(chain, endpoint).run(req).await
    }

    /// Collects the middleware of this controller and its ancestors, root
    /// first, and orders it for `scope`.
    pub(crate) fn resolve(&self, scope: &Scope) -> Chain {
        let candidates: Vec<MiddlewareEntry> = self
            .lineage()
            .iter()
            .flat_map(|controller| {
                read(&controller.inner.middleware)
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        order_chain(candidates, scope)
    }

    /// The stage run after the chain: looks the action up at call time.
    fn action_stage(&self, method: Method, action: Option<String>) -> Endpoint {
        let controller = self.clone();
        Arc::new(move |req: Request| -> BoxResponseFuture {
            let controller = controller.clone();
            let method = method.clone();
            let action = action.clone();
            Box::pin(async move { controller.invoke(&method, action.as_deref(), req).await })
        })
    }

    async fn invoke(&self, method: &Method, action: Option<&str>, req: Request) -> Response {
        let Some(name) = action else {
            return Error::internal(format!("no route registered for {method} request"))
                .into_response();
        };

        let handler = read(&self.inner.actions)
            .get(name)
            .map(|action| action.handler.clone());
        match handler {
            Some(handler) => match handler.oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            None => Error::unhandled_action(method, name).into_response(),
        }
    }
}
