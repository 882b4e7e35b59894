//! Tagged arguments accepted by `middleware`, `define` and `direct`.

use super::{Controller, middleware::Middleware};
use crate::{Error, Result};

/// One registration argument.
///
/// Arguments are partitioned by variant, never by position, except that the
/// relative order of groups and of middleware is preserved.
#[derive(Debug, Clone)]
pub enum Arg {
    Group(String),
    Middleware(Middleware),
    Controller(Controller),
}

impl Arg {
    pub fn group(name: impl Into<String>) -> Self {
        Arg::Group(name.into())
    }

    pub fn middleware(middleware: Middleware) -> Self {
        Arg::Middleware(middleware)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Group(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Group(value)
    }
}

impl From<Middleware> for Arg {
    fn from(value: Middleware) -> Self {
        Arg::Middleware(value)
    }
}

impl From<Controller> for Arg {
    fn from(value: Controller) -> Self {
        Arg::Controller(value)
    }
}

impl From<&Controller> for Arg {
    fn from(value: &Controller) -> Self {
        Arg::Controller(value.clone())
    }
}

/// Arguments split by kind.
#[derive(Debug, Default)]
pub(crate) struct Partition {
    pub groups: Vec<String>,
    pub middleware: Vec<Middleware>,
    pub controllers: Vec<Controller>,
}

impl Partition {
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let mut partition = Partition::default();
        for arg in args {
            match arg.into() {
                Arg::Group(name) if name.is_empty() => {
                    return Err(Error::invalid_input("group names must not be empty"));
                }
                Arg::Group(name) => partition.groups.push(name),
                Arg::Middleware(middleware) => partition.middleware.push(middleware),
                Arg::Controller(controller) => partition.controllers.push(controller),
            }
        }
        Ok(partition)
    }

    /// Fails if any argument was a controller.
    pub fn without_controllers(self, context: &str) -> Result<Self> {
        if !self.controllers.is_empty() {
            return Err(Error::invalid_input(format!(
                "a controller cannot be passed to {context}"
            )));
        }
        Ok(self)
    }
}
