//! Named actions: a handler plus the groups it belongs to.

use super::ControllerId;
use axum::{extract::Request, handler::Handler, response::Response};
use std::{collections::HashMap, convert::Infallible};
use tower::util::BoxCloneSyncService;

/// Type-erased action handler.
pub(crate) type ActionService = BoxCloneSyncService<Request, Response, Infallible>;

/// Erases any axum handler so it can be stored next to handlers of other types.
pub(crate) fn into_action_service<H, T>(handler: H) -> ActionService
where
    H: Handler<T, ()>,
    T: 'static,
{
    BoxCloneSyncService::new(handler.with_state(()))
}

#[derive(Clone)]
pub(crate) struct Action {
    /// Group names only, in declaration order.
    pub groups: Vec<String>,
    pub handler: ActionService,
}

/// What the dispatcher knows about the action serving the current request.
///
/// Inserted into the request extensions before the chain runs, so both
/// middleware and handlers can read it with `Extension<ActionInfo>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
    pub name: String,
    pub groups: Vec<String>,
    pub controller: ControllerId,
}

#[derive(Default)]
pub(crate) struct ActionRegistry {
    actions: HashMap<String, Action>,
}

impl ActionRegistry {
    /// Inserts or overwrites `name`. Returns the previous definition.
    pub fn insert(&mut self, name: String, action: Action) -> Option<Action> {
        self.actions.insert(name, action)
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }
}
