//! Controllers: named actions, scoped middleware and the routes between them.
//!
//! A [`Controller`] collects three things during setup:
//!
//! - **middleware**, each registered under one or more groups
//! - **actions**, each a handler plus the ordered list of groups it belongs to
//! - **routes**, each binding an HTTP method and path to an action name
//!
//! When a request hits a route, the controller derives the action's scope
//! (`all`, then its groups, then its own name), collects every middleware of
//! this controller and its ancestors registered under one of those groups,
//! orders them from least to most specific, and runs them before the action.
//! The resolved chain is cached per route path and scope.
//!
//! ```rust
//! use axum::{extract::Request, response::Response};
//! use axum_scopes::{Arg, Controller, Next, from_fn};
//!
//! async fn authenticate(req: Request, next: Next) -> Response {
//!     next.run(req).await
//! }
//!
//! # fn main() -> axum_scopes::Result<()> {
//! let users = Controller::new();
//! users
//!     .middleware([Arg::group("auth"), Arg::middleware(from_fn(authenticate))])?
//!     .define("show", ["auth"], || async { "user" })?
//!     .get("/users/{id}", "show")?;
//! # Ok(())
//! # }
//! ```

mod action;
mod args;
mod cache;
mod dispatch;
mod middleware;
mod route;
mod scope;

#[cfg(test)]
mod tests;

pub use action::ActionInfo;
pub use args::Arg;
pub use cache::CacheStats;
pub use middleware::{BoxResponseFuture, Chain, Middleware, MiddlewareId, Next, from_fn};
pub use route::RouteInfo;
pub use scope::{ALL_GROUP, Scope};

use {
    crate::{
        Config, Error, Result,
        utils::{next_anonymous_name, read, write},
    },
    action::{Action, ActionRegistry, ActionService, into_action_service},
    args::Partition,
    axum::handler::Handler,
    cache::ChainCache,
    middleware::{MiddlewareEntry, MiddlewareRegistry},
    route::{
        RouteTable, ServedRoute, canonical_method, join_paths, method_filter,
        normalize_mount_path, validate_path,
    },
    std::{
        fmt,
        sync::{
            Arc, OnceLock, RwLock, Weak,
            atomic::{AtomicBool, Ordering},
        },
    },
    uuid::Uuid,
};

/// Unique, immutable identity of a controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerId(Arc<str>);

impl ControllerId {
    pub(crate) fn generate() -> Self {
        ControllerId(Uuid::now_v7().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Mount {
    path: String,
    controller: Controller,
}

struct Inner {
    id: ControllerId,
    middleware: RwLock<MiddlewareRegistry>,
    actions: RwLock<ActionRegistry>,
    routes: RwLock<RouteTable>,
    cache: ChainCache,
    log_chains: bool,
    /// Set once, when this controller is mounted.
    parent: OnceLock<Weak<Inner>>,
    children: RwLock<Vec<Mount>>,
    /// Set by [`Controller::router`]; later routes and mounts are not served
    /// by routers already built.
    router_built: AtomicBool,
}

/// A composable routing unit.
///
/// `Controller` is a cheap handle: clones share the same registries. Build
/// the whole tree, then turn it into an axum router with
/// [`Controller::router`] or [`Controller::attach`].
///
/// ```rust
/// use axum::{extract::Request, response::Response};
/// use axum_scopes::{Arg, Controller, Next, from_fn};
///
/// async fn audit(req: Request, next: Next) -> Response {
///     next.run(req).await
/// }
///
/// # fn main() -> axum_scopes::Result<()> {
/// let controller = Controller::new();
/// controller
///     .middleware([Arg::group("admin"), Arg::middleware(from_fn(audit))])?
///     .define("dashboard", ["admin"], || async { "dashboard" })?
///     .get("/dashboard", "dashboard")?;
///
/// let app: axum::Router = controller.router();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(|p| p.id().clone()))
            .finish()
    }
}

impl Controller {
    /// Creates a controller with chain caching enabled.
    pub fn new() -> Self {
        Self::build(true, false)
    }

    /// Creates a controller using the `[controller]` and `[logging]` settings.
    pub fn with_config(config: &Config) -> Self {
        Self::build(config.controller.cache_chains, config.logging.log_chains)
    }

    fn build(cache_chains: bool, log_chains: bool) -> Self {
        let inner = Inner {
            id: ControllerId::generate(),
            middleware: RwLock::default(),
            actions: RwLock::default(),
            routes: RwLock::default(),
            cache: ChainCache::new(cache_chains),
            log_chains,
            parent: OnceLock::new(),
            children: RwLock::default(),
            router_built: AtomicBool::new(false),
        };
        Controller {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> &ControllerId {
        &self.inner.id
    }

    /// The controller this one is mounted on, if any.
    pub fn parent(&self) -> Option<Controller> {
        self.inner
            .parent
            .get()
            .and_then(Weak::upgrade)
            .map(|inner| Controller { inner })
    }

    /// True if both handles point at the same controller.
    pub fn ptr_eq(&self, other: &Controller) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// This controller and its ancestors, root first.
    pub(crate) fn lineage(&self) -> Vec<Controller> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent();
        while let Some(controller) = current {
            current = controller.parent();
            lineage.push(controller);
        }
        lineage.reverse();
        lineage
    }

    fn root(&self) -> Controller {
        let mut root = self.clone();
        while let Some(parent) = root.parent() {
            root = parent;
        }
        root
    }

    /// Path this controller's routes are served under, from the root.
    fn mount_prefix(&self) -> String {
        let mut prefix = "/".to_string();
        for pair in self.lineage().windows(2) {
            let (parent, child) = (&pair[0], &pair[1]);
            if let Some(mount) = read(&parent.inner.children)
                .iter()
                .find(|mount| mount.controller.ptr_eq(child))
            {
                prefix = join_paths(&prefix, &mount.path);
            }
        }
        prefix
    }

    /// Every route of this subtree, with paths prefixed by `prefix`.
    fn served_routes(&self, prefix: &str, out: &mut Vec<ServedRoute>) -> Result<()> {
        for route in read(&self.inner.routes).iter() {
            out.push(ServedRoute::new(
                route.method.clone(),
                prefix,
                &route.path,
                &self.inner.id,
            )?);
        }
        for mount in read(&self.inner.children).iter() {
            mount
                .controller
                .served_routes(&join_paths(prefix, &mount.path), out)?;
        }
        Ok(())
    }

    /// Fails if any of `incoming` cannot share a router with the routes
    /// already served by this controller's tree.
    fn ensure_no_clash(&self, incoming: &[ServedRoute]) -> Result<()> {
        let mut existing = Vec::new();
        self.root().served_routes("/", &mut existing)?;

        for route in incoming {
            if let Some(other) = existing.iter().find(|other| route.clashes_with(other)) {
                return Err(Error::invalid_input(format!(
                    "route {} {} clashes with {} {} declared on controller {}",
                    route.method,
                    route.path,
                    other.method,
                    other.path,
                    other.owner()
                )));
            }
        }
        Ok(())
    }

    fn warn_if_router_built(&self, what: &str) {
        if self.inner.router_built.load(Ordering::Relaxed) {
            tracing::warn!(
                controller = %self.inner.id,
                what,
                "Changed routing after its router was built; rebuild the router to serve it"
            );
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers middleware under the given groups, or mounts a sub-controller.
    ///
    /// Arguments are split by variant: every [`Arg::Group`] joins the scope
    /// and every [`Arg::Middleware`] is registered under that whole scope.
    /// Without any group the scope is `["all"]`. Cached chains whose scope
    /// shares a group with the new registration are purged here and in every
    /// descendant.
    ///
    /// A single [`Arg::Controller`], optionally preceded by one group used as
    /// the mount path, mounts that controller instead (see
    /// [`Controller::mount`]).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput) if
    /// no middleware is given, if a controller is mixed with middleware or
    /// with more than one group, or if a group name is empty.
    pub fn middleware<I>(&self, args: I) -> Result<&Self>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let Partition {
            groups,
            middleware,
            controllers,
        } = Partition::from_args(args)?;

        let mut controllers = controllers.into_iter();
        if let Some(child) = controllers.next() {
            if controllers.next().is_some() || !middleware.is_empty() || groups.len() > 1 {
                return Err(Error::invalid_input(
                    "a sub-controller must be passed alone, optionally after its mount path",
                ));
            }
            let path = groups.first().map(String::as_str).unwrap_or("/");
            return self.mount(path, &child);
        }

        if middleware.is_empty() {
            return Err(Error::invalid_input(
                "middleware() needs at least one middleware function",
            ));
        }

        let scope: Arc<[String]> = if groups.is_empty() {
            Arc::from([ALL_GROUP.to_string()])
        } else {
            groups.into()
        };
        self.register(scope, middleware, false);
        Ok(self)
    }

    /// Alias of [`Controller::middleware`].
    pub fn use_middleware<I>(&self, args: I) -> Result<&Self>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        self.middleware(args)
    }

    fn register(&self, scope: Arc<[String]>, middleware: Vec<Middleware>, anonymous: bool) {
        let count = middleware.len();
        {
            let mut registry = write(&self.inner.middleware);
            for middleware in middleware {
                registry.push(MiddlewareEntry {
                    middleware,
                    scope: scope.clone(),
                    controller: self.inner.id.clone(),
                    anonymous,
                });
            }
        }

        let purged = self.invalidate(&scope);
        tracing::debug!(
            controller = %self.inner.id,
            scope = ?scope,
            count,
            anonymous,
            purged,
            "Registered middleware"
        );
    }

    /// Purges cached chains intersecting `groups` here and in every descendant.
    fn invalidate(&self, groups: &[String]) -> usize {
        let mut purged = self.inner.cache.invalidate(groups);
        for mount in read(&self.inner.children).iter() {
            purged += mount.controller.invalidate(groups);
        }
        purged
    }

    fn clear_cache_tree(&self) {
        self.inner.cache.clear();
        for mount in read(&self.inner.children).iter() {
            mount.controller.clear_cache_tree();
        }
    }

    /// Mounts `child` under `path`.
    ///
    /// The child keeps a weak link back to this controller, so its chains
    /// include this controller's middleware, which runs first. Any chain the
    /// child had cached before mounting is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput) if
    /// `path` is not a valid mount point, if `child` is this controller or
    /// one of its ancestors, if `child` is already mounted, or if one of its
    /// routes would land on a method and path the tree already serves.
    pub fn mount(&self, path: &str, child: &Controller) -> Result<&Self> {
        let path = normalize_mount_path(path)?;

        if self.ptr_eq(child) {
            return Err(Error::invalid_input(
                "a controller cannot be mounted on itself",
            ));
        }
        if self.lineage().iter().any(|ancestor| ancestor.ptr_eq(child)) {
            return Err(Error::invalid_input(format!(
                "mounting controller {} under {} would create a cycle",
                child.id(),
                self.id()
            )));
        }
        if child.inner.parent.get().is_some() {
            return Err(Error::invalid_input(format!(
                "controller {} is already mounted",
                child.id()
            )));
        }

        let mut incoming = Vec::new();
        child.served_routes(&join_paths(&self.mount_prefix(), &path), &mut incoming)?;
        self.ensure_no_clash(&incoming)?;

        child
            .inner
            .parent
            .set(Arc::downgrade(&self.inner))
            .map_err(|_| {
                Error::invalid_input(format!("controller {} is already mounted", child.id()))
            })?;

        self.warn_if_router_built("mount");
        child.clear_cache_tree();
        tracing::debug!(
            controller = %self.inner.id,
            child = %child.id(),
            path = %path,
            "Mounted sub-controller"
        );
        write(&self.inner.children).push(Mount {
            path,
            controller: child.clone(),
        });
        Ok(self)
    }

    /// Defines (or redefines) the action `name`.
    ///
    /// Groups are stored in the order given and shape the action's scope.
    /// Middleware passed among the groups is registered inline under a group
    /// equal to the action name, so it runs after every group middleware.
    /// Redefining an action removes the inline middleware of its previous
    /// definition first.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput) if
    /// `name` or a group is empty, or if a controller is passed as a group.
    pub fn define<I, H, T>(&self, name: &str, groups: I, handler: H) -> Result<&Self>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
        H: Handler<T, ()>,
        T: 'static,
    {
        if name.is_empty() {
            return Err(Error::invalid_input("action names must not be empty"));
        }
        let Partition {
            groups, middleware, ..
        } = Partition::from_args(groups)?.without_controllers("define")?;

        self.install_action(name, groups, middleware, into_action_service(handler));
        Ok(self)
    }

    /// Defines an action without groups.
    pub fn define_handler<H, T>(&self, name: &str, handler: H) -> Result<&Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.define(name, std::iter::empty::<Arg>(), handler)
    }

    fn install_action(
        &self,
        name: &str,
        groups: Vec<String>,
        inline: Vec<Middleware>,
        handler: ActionService,
    ) {
        let previous = write(&self.inner.actions).insert(
            name.to_string(),
            Action {
                groups: groups.clone(),
                handler,
            },
        );

        if let Some(previous) = &previous {
            if previous.groups != groups {
                let stale = self
                    .inner
                    .cache
                    .remove_scope(&Scope::for_action(name, &previous.groups));
                tracing::debug!(
                    controller = %self.inner.id,
                    action = %name,
                    stale,
                    "Dropped chains of previous scope"
                );
            }
            let removed = write(&self.inner.middleware).remove_anonymous(name);
            if removed > 0 {
                let purged = self.invalidate(&[name.to_string()]);
                tracing::debug!(
                    controller = %self.inner.id,
                    action = %name,
                    removed,
                    purged,
                    "Removed inline middleware of previous definition"
                );
            }
        }

        if !inline.is_empty() {
            self.register(Arc::from([name.to_string()]), inline, true);
        }

        tracing::debug!(
            controller = %self.inner.id,
            action = %name,
            groups = ?groups,
            redefined = previous.is_some(),
            "Defined action"
        );
    }

    /// Binds `method` and `path` to the action `action`.
    ///
    /// The method is matched case-insensitively. The action does not need to
    /// exist yet; it is looked up on every request, and a request reaching a
    /// route whose action was never defined gets an
    /// [`ErrorKind::UnhandledAction`](crate::ErrorKind::UnhandledAction)
    /// response. Declaring the same method and path twice rebinds it.
    ///
    /// Routes are turned into axum routes by [`Controller::router`], so
    /// declare them all before building the router.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput)
    /// for an unknown method, a malformed path (including `:id` style
    /// captures), or a method and path that another route of the tree
    /// already serves.
    pub fn route(&self, method: &str, path: &str, action: &str) -> Result<&Self> {
        let method = canonical_method(method)?;
        let filter = method_filter(&method)?;
        validate_path(path)?;
        let served = ServedRoute::new(method.clone(), &self.mount_prefix(), path, &self.inner.id)?;
        self.ensure_no_clash(std::slice::from_ref(&served))?;
        self.warn_if_router_built("route");

        let added = write(&self.inner.routes).insert(
            method.clone(),
            filter,
            path.to_string(),
            action.to_string(),
        );
        tracing::debug!(
            controller = %self.inner.id,
            method = %method,
            path = %path,
            action = %action,
            added,
            "Declared route"
        );
        Ok(self)
    }

    pub fn get(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("GET", path, action)
    }

    pub fn post(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("POST", path, action)
    }

    pub fn put(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("PUT", path, action)
    }

    pub fn delete(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("DELETE", path, action)
    }

    pub fn patch(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("PATCH", path, action)
    }

    pub fn head(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("HEAD", path, action)
    }

    pub fn options(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("OPTIONS", path, action)
    }

    pub fn trace(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("TRACE", path, action)
    }

    pub fn connect(&self, path: &str, action: &str) -> Result<&Self> {
        self.route("CONNECT", path, action)
    }

    /// Defines an action under a generated name and routes to it.
    ///
    /// Groups keep their position. Each inline middleware gets a fresh
    /// generated group inserted at its position in the argument list, so
    ///
    /// ```text
    /// direct("get", "/x", ["g1", m1, "g2", m2], handler)
    /// ```
    ///
    /// runs `g1` middleware, `m1`, `g2` middleware, `m2`, then `handler`.
    ///
    /// # Errors
    ///
    /// Fails before registering anything if the method or path is invalid,
    /// if the route clashes with one the tree already serves, if a group is
    /// empty, or if a controller is passed.
    pub fn direct<I, H, T>(&self, method: &str, path: &str, args: I, handler: H) -> Result<&Self>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
        H: Handler<T, ()>,
        T: 'static,
    {
        let canonical = canonical_method(method)?;
        method_filter(&canonical)?;
        validate_path(path)?;
        let served = ServedRoute::new(canonical, &self.mount_prefix(), path, &self.inner.id)?;
        self.ensure_no_clash(std::slice::from_ref(&served))?;

        let mut groups = Vec::new();
        let mut inline = Vec::new();
        for arg in args {
            match arg.into() {
                Arg::Group(group) if group.is_empty() => {
                    return Err(Error::invalid_input("group names must not be empty"));
                }
                Arg::Group(group) => groups.push(group),
                Arg::Middleware(middleware) => {
                    let group = next_anonymous_name();
                    groups.push(group.clone());
                    inline.push((group, middleware));
                }
                Arg::Controller(_) => {
                    return Err(Error::invalid_input(
                        "a controller cannot be passed to direct",
                    ));
                }
            }
        }

        for (group, middleware) in inline {
            self.register(Arc::from([group]), vec![middleware], true);
        }

        let name = next_anonymous_name();
        self.install_action(&name, groups, Vec::new(), into_action_service(handler));
        self.route(method, path, &name)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// The stored definition of `name`.
    pub fn action_info(&self, name: &str) -> Option<ActionInfo> {
        read(&self.inner.actions).get(name).map(|action| ActionInfo {
            name: name.to_string(),
            groups: action.groups.clone(),
            controller: self.inner.id.clone(),
        })
    }

    /// Routes declared on this controller, in declaration order.
    pub fn routes(&self) -> Vec<RouteInfo> {
        read(&self.inner.routes).iter().map(RouteInfo::from).collect()
    }

    /// The middleware an action would run, in order.
    ///
    /// Resolves without touching the cache. An undefined action is resolved
    /// as if it had no groups.
    pub fn chain_for(&self, name: &str) -> Vec<MiddlewareId> {
        let groups = read(&self.inner.actions)
            .get(name)
            .map(|action| action.groups.clone())
            .unwrap_or_default();
        self.resolve(&Scope::for_action(name, &groups)).ids()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }
}
