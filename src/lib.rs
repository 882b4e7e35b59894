//! # axum-scopes
//!
//! Controllers for Axum that attach middleware to named *groups* of actions
//! instead of to individual routes.
//!
//! Routes point at named actions. Each action belongs to an ordered list of
//! groups, and middleware is registered against groups. When a request
//! arrives, the controller works out which middleware applies to the action,
//! orders it from the most general to the most specific, caches the result
//! and runs it in front of the action's handler.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{extract::Request, response::Response};
//! use axum_scopes::{Arg, Config, Controller, Next, Result, from_fn};
//!
//! async fn log_request(req: Request, next: Next) -> Response {
//!     tracing::info!(path = %req.uri().path(), "request");
//!     next.run(req).await
//! }
//!
//! async fn require_admin(req: Request, next: Next) -> Response {
//!     next.run(req).await
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default();
//!     config.setup_tracing();
//!
//!     let app = Controller::with_config(&config);
//!     app.middleware([from_fn(log_request)])?
//!         .middleware([Arg::group("admin"), Arg::middleware(from_fn(require_admin))])?
//!         .define("dashboard", ["admin"], || async { "dashboard" })?
//!         .define_handler("home", || async { "home" })?
//!         .get("/", "home")?
//!         .get("/admin", "dashboard")?;
//!
//!     app.serve(&config).await
//! }
//! ```
//!
//! A request to `/admin` runs `log_request` (group `all`), then
//! `require_admin` (group `admin`), then the `dashboard` handler. A request to
//! `/` only runs `log_request`.
//!
//! # Ordering
//!
//! The scope of an action is `["all", ...groups, name]`. Middleware runs in
//! the order of the first of its groups found in that scope, so global
//! middleware comes first and middleware registered under the action's own
//! name comes last. Middleware with the same position runs in registration
//! order, with the middleware of parent controllers ahead of their children.
//!
//! # Sub-controllers
//!
//! ```rust
//! use axum_scopes::{Arg, Controller};
//!
//! # fn main() -> axum_scopes::Result<()> {
//! let api = Controller::new();
//! let users = Controller::new();
//! users.define_handler("list", || async { "[]" })?.get("/", "list")?;
//!
//! api.middleware([Arg::group("/users"), Arg::from(&users)])?;
//! assert_eq!(users.parent().map(|p| p.id().clone()), Some(api.id().clone()));
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```rust
//! use axum_scopes::Config;
//!
//! let config: Config = r#"
//!     [http]
//!     bind_port = 8080
//!
//!     [logging]
//!     log_chains = true
//!
//!     [controller]
//!     cache_chains = true
//! "#.parse().unwrap();
//!
//! assert_eq!(config.http.bind_port, 8080);
//! ```
//!
//! # Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`controller`] | Controllers, scoped middleware and dispatch ([`Controller`]) |
//! | [`config`] | Configuration loading and validation ([`Config`]) |
//! | [`error`] | Error types and handling ([`Error`]) |
pub mod config;
pub mod controller;
pub mod error;
mod serve;
mod utils;

pub use config::*;
pub use controller::*;
pub use error::*;
pub use utils::*;

pub type Result<T> = std::result::Result<T, Error>;
