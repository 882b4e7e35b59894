//! Declared routes and the per-route slot holding the spliced chain.

use super::{ControllerId, middleware::Chain};
use crate::{Error, Result};
use arc_swap::ArcSwap;
use axum::routing::MethodFilter;
use http::Method;
use std::sync::Arc;

/// Parses `method` case-insensitively into its canonical form.
pub(crate) fn canonical_method(method: &str) -> Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    let method = Method::from_bytes(upper.as_bytes())?;
    Ok(method)
}

pub(crate) fn method_filter(method: &Method) -> Result<MethodFilter> {
    MethodFilter::try_from(method.clone())
        .map_err(|_| Error::invalid_input(format!("unsupported HTTP method: {method}")))
}

pub(crate) fn validate_path(path: &str) -> Result<()> {
    route_shape(path).map(|_| ())
}

/// Checks `path` against the route syntax the router accepts and returns it
/// with capture names erased, so `/users/{id}` and `/users/{name}` have the
/// same shape.
pub(crate) fn route_shape(path: &str) -> Result<String> {
    let invalid = |reason: &str| Error::invalid_input(format!("route path '{path}' {reason}"));

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(invalid("uses ':' or '*' captures; write '{name}' or '{*name}'"));
    }

    let mut shape = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                shape.push_str("{{");
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                shape.push_str("}}");
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(invalid("has an unclosed '{'")),
                        Some(c) => name.push(c),
                    }
                }
                match name.strip_prefix('*') {
                    Some("") => return Err(invalid("has an empty capture")),
                    Some(_) if chars.peek().is_some() => {
                        return Err(invalid("has a wildcard capture before its end"));
                    }
                    Some(_) => shape.push_str("{*}"),
                    None if name.is_empty() => return Err(invalid("has an empty capture")),
                    None => shape.push_str("{}"),
                }
            }
            '}' => return Err(invalid("has an unmatched '}'")),
            c => shape.push(c),
        }
    }
    Ok(shape)
}

/// Prefixes `path` with the mount point `prefix` the way nesting does.
pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    match (prefix, path) {
        ("/", path) => path.to_string(),
        (prefix, "/") => prefix.to_string(),
        (prefix, path) => format!("{prefix}{path}"),
    }
}

/// Normalizes a mount point: must start with `/`, trailing slashes dropped.
/// The root is returned as `/`.
pub(crate) fn normalize_mount_path(path: &str) -> Result<String> {
    if route_shape(path)?.contains("{*}") {
        return Err(Error::invalid_input(format!(
            "mount path '{path}' must not contain a wildcard capture"
        )));
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}

/// The live chain of one route.
///
/// Holds only the computed scope chain; the interceptor and the action stage
/// are fixed parts of the route handler. Replacing the chain swaps the whole
/// slot at once.
#[derive(Debug, Default)]
pub(crate) struct RouteSlot {
    chain: ArcSwap<Chain>,
}

impl RouteSlot {
    pub fn current(&self) -> Arc<Chain> {
        self.chain.load_full()
    }

    /// Installs `chain` unless it is already the live one.
    /// Returns true if the slot changed.
    pub fn splice(&self, chain: &Arc<Chain>) -> bool {
        if Arc::ptr_eq(&self.chain.load(), chain) {
            return false;
        }
        self.chain.store(chain.clone());
        true
    }
}

#[derive(Debug)]
pub(crate) struct Route {
    pub method: Method,
    pub filter: MethodFilter,
    pub path: String,
    pub action: String,
    pub slot: Arc<RouteSlot>,
}

/// Public view of a declared route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
    pub action: String,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            method: route.method.clone(),
            path: route.path.clone(),
            action: route.action.clone(),
        }
    }
}

/// A route as the tree serves it: full path from the root plus the
/// controller and local path it was declared with.
#[derive(Debug)]
pub(crate) struct ServedRoute {
    pub method: Method,
    pub path: String,
    shape: String,
    local: String,
    owner: ControllerId,
}

impl ServedRoute {
    pub fn new(method: Method, prefix: &str, local: &str, owner: &ControllerId) -> Result<Self> {
        let path = join_paths(prefix, local);
        Ok(Self {
            method,
            shape: route_shape(&path)?,
            path,
            local: local.to_string(),
            owner: owner.clone(),
        })
    }

    pub fn owner(&self) -> &ControllerId {
        &self.owner
    }

    /// True if both routes cannot live in one router. Redeclaring a route on
    /// its own controller rebinds it and is not a clash.
    pub fn clashes_with(&self, other: &ServedRoute) -> bool {
        if self.owner == other.owner && self.method == other.method && self.local == other.local {
            return false;
        }
        self.shape == other.shape && (self.method == other.method || self.path != other.path)
    }
}

#[derive(Debug, Default)]
pub(crate) struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Adds a route, or points an existing `(method, path)` at a new action.
    /// Returns true if the route is new.
    pub fn insert(&mut self, method: Method, filter: MethodFilter, path: String, action: String) -> bool {
        if let Some(existing) = self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            existing.action = action;
            return false;
        }

        self.routes.push(Route {
            method,
            filter,
            path,
            action,
            slot: Arc::default(),
        });
        true
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| &r.method == method && r.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_canonical_method_is_case_insensitive() {
        assert_eq!(canonical_method("get").unwrap(), Method::GET);
        assert_eq!(canonical_method("Post").unwrap(), Method::POST);
        assert_eq!(canonical_method(" DELETE ").unwrap(), Method::DELETE);
    }

    #[test]
    fn test_canonical_method_rejects_garbage() {
        let err = canonical_method("not a method").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(canonical_method("").is_err());
    }

    #[test]
    fn test_method_filter_rejects_extension_methods() {
        let custom = canonical_method("purge").unwrap();
        assert!(method_filter(&custom).is_err());
        assert!(method_filter(&Method::PATCH).is_ok());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/users/{id}").is_ok());
        assert!(validate_path("/files/{*rest}").is_ok());
        assert!(validate_path("/literal/{{braces}}").is_ok());
        assert!(validate_path("/").is_ok());
        assert!(validate_path("users").is_err());
    }

    #[test]
    fn test_validate_path_rejects_unroutable_syntax() {
        for path in [
            "/user/:id",
            "/files/*rest",
            "/users/{id",
            "/users/id}",
            "/users/{}",
            "/users/{*}",
            "/users/{a{b}}",
            "/files/{*rest}/more",
        ] {
            let err = validate_path(path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{path}");
        }
    }

    #[test]
    fn test_route_shape_erases_capture_names() {
        assert_eq!(route_shape("/users/{id}").unwrap(), "/users/{}");
        assert_eq!(
            route_shape("/users/{id}").unwrap(),
            route_shape("/users/{name}").unwrap()
        );
        assert_eq!(route_shape("/files/{*rest}").unwrap(), "/files/{*}");
    }

    #[test]
    fn test_join_paths_follows_nesting() {
        assert_eq!(join_paths("/", "/x"), "/x");
        assert_eq!(join_paths("/sub", "/"), "/sub");
        assert_eq!(join_paths("/sub", "/x"), "/sub/x");
        assert_eq!(join_paths("/", "/"), "/");
    }

    #[test]
    fn test_served_route_clashes() {
        let a = ControllerId::generate();
        let b = ControllerId::generate();
        let route = |method: Method, prefix: &str, local: &str, owner: &ControllerId| {
            ServedRoute::new(method, prefix, local, owner).unwrap()
        };

        let parent = route(Method::GET, "/", "/sub", &a);
        assert!(route(Method::GET, "/sub", "/", &b).clashes_with(&parent));
        assert!(!route(Method::POST, "/sub", "/", &b).clashes_with(&parent));
        assert!(!route(Method::GET, "/", "/sub", &a).clashes_with(&parent));

        let by_id = route(Method::GET, "/", "/u/{id}", &a);
        assert!(route(Method::POST, "/", "/u/{name}", &a).clashes_with(&by_id));
        assert!(!route(Method::POST, "/", "/u/{id}", &b).clashes_with(&by_id));
        assert!(!route(Method::GET, "/", "/u/me", &b).clashes_with(&by_id));
    }

    #[test]
    fn test_normalize_mount_path_rejects_wildcards() {
        assert!(normalize_mount_path("/files/{*rest}").is_err());
        assert_eq!(normalize_mount_path("/t/{tenant}/").unwrap(), "/t/{tenant}");
    }

    #[test]
    fn test_normalize_mount_path() {
        assert_eq!(normalize_mount_path("/").unwrap(), "/");
        assert_eq!(normalize_mount_path("/sub/").unwrap(), "/sub");
        assert_eq!(normalize_mount_path("/a/b").unwrap(), "/a/b");
        assert!(normalize_mount_path("sub").is_err());
    }

    #[test]
    fn test_route_table_replaces_same_method_and_path() {
        let mut table = RouteTable::default();
        assert!(table.insert(Method::GET, MethodFilter::GET, "/a".into(), "first".into()));
        assert!(table.insert(Method::POST, MethodFilter::POST, "/a".into(), "create".into()));
        assert!(!table.insert(Method::GET, MethodFilter::GET, "/a".into(), "second".into()));

        assert_eq!(table.iter().count(), 2);
        assert_eq!(table.find(&Method::GET, "/a").unwrap().action, "second");
        assert_eq!(table.find(&Method::POST, "/a").unwrap().action, "create");
        assert!(table.find(&Method::GET, "/b").is_none());
    }

    #[test]
    fn test_slot_splice_replaces_once() {
        let slot = RouteSlot::default();
        assert!(slot.current().is_empty());

        let chain = Arc::new(Chain::default());
        assert!(slot.splice(&chain));
        assert!(!slot.splice(&chain));
        assert!(Arc::ptr_eq(&slot.current(), &chain));

        let other = Arc::new(Chain::default());
        assert!(slot.splice(&other));
        assert!(Arc::ptr_eq(&slot.current(), &other));
    }
}
