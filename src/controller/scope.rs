//! Scopes and chain ordering.
//!
//! A [`Scope`] is the ordered list of groups that apply to one dispatch:
//! `"all"`, then the action's declared groups, then the action name. Earlier
//! entries have lower precedence. Middleware is ordered by the position of
//! the first of its own groups found in the scope; ties keep candidate order,
//! which is ancestor-first and then registration order.

use super::middleware::{Chain, MiddlewareEntry};
use std::fmt;

/// The group every dispatch belongs to and the default group for middleware
/// registered without one.
pub const ALL_GROUP: &str = "all";

/// Ordered list of group names relevant to one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope(Vec<String>);

impl Scope {
    /// The scope used when no action is known: just `["all"]`.
    pub fn base() -> Self {
        Scope(vec![ALL_GROUP.to_string()])
    }

    /// `["all", ...groups, name]`.
    pub fn for_action(name: &str, groups: &[String]) -> Self {
        let mut scope = Vec::with_capacity(groups.len() + 2);
        scope.push(ALL_GROUP.to_string());
        scope.extend(groups.iter().cloned());
        scope.push(name.to_string());
        Scope(scope)
    }

    pub fn groups(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, group: &str) -> bool {
        self.0.iter().any(|g| g == group)
    }

    /// Position of `group` in this scope, lowest precedence first.
    pub fn position(&self, group: &str) -> Option<usize> {
        self.0.iter().position(|g| g == group)
    }

    /// True if any of `groups` appears in this scope.
    pub fn intersects<S: AsRef<str>>(&self, groups: &[S]) -> bool {
        groups.iter().any(|g| self.contains(g.as_ref()))
    }

    /// Sort key of a middleware registered under `middleware_scope`: the
    /// position of the first of its groups that this scope contains.
    pub fn rank<S: AsRef<str>>(&self, middleware_scope: &[S]) -> Option<usize> {
        middleware_scope
            .iter()
            .find_map(|group| self.position(group.as_ref()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Orders `candidates` (already in ancestor-first, registration order) for
/// `scope`, dropping those that do not belong to it.
pub(crate) fn order_chain(candidates: Vec<MiddlewareEntry>, scope: &Scope) -> Chain {
    let mut ranked: Vec<(usize, MiddlewareEntry)> = candidates
        .into_iter()
        .filter_map(|entry| {
            let rank = scope.rank(&entry.scope[..])?;
            tracing::trace!(
                middleware = %entry.middleware.id(),
                controller = %entry.controller,
                rank,
                "Matched middleware"
            );
            Some((rank, entry))
        })
        .collect();

    // sort_by_key is stable
    ranked.sort_by_key(|(rank, _)| *rank);

    Chain::new(ranked.into_iter().map(|(_, entry)| entry.middleware).collect())
}
