//! # thistle
//!
//! A pattern-routed micro web framework with a hierarchical state store.
//!
//! ## The pieces
//!
//! - **Routes** read `VERB /template/@token [ajax]`. Templates are tried in
//!   descending order, so literal segments beat `@tokens` and longer
//!   templates beat their prefixes.
//! - **The hive** is a per-request tree of values addressed by keys such as
//!   `POST.user.name`. Configuration, request variables, the session and
//!   the dictionary all live there.
//! - **Handlers** are plain functions, or `Type->member` / `Type::member`
//!   descriptors resolved against registered classes, wrapped in their
//!   `beforeroute` / `afterroute` hooks.
//! - **Responses** are streamed: a head, then the buffered output in
//!   chunks, paced when a route sets a bandwidth limit.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use thistle::{App, Context, Server, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), thistle::Error> {
//!     let app = App::new()
//!         .route("GET /", home)?
//!         .route("GET @user: /users/@id", user)?
//!         .shared();
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! fn home(cx: &mut Context, _: &[Value]) {
//!     cx.write("hello");
//! }
//!
//! fn user(cx: &mut Context, _: &[Value]) -> String {
//!     format!("user {}", cx.param("id").unwrap_or("?"))
//! }
//! ```

mod app;
mod config;
mod context;
mod dispatcher;
mod error;
mod handler;
mod invoker;
mod method;
mod mock;
mod mutex;
mod report;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod hive;

pub use app::App;
pub use config::{Config, Jar};
pub use context::Context;
pub use error::Error;
pub use handler::{Handler, IntoOutcome, Outcome, Target};
pub use hive::{Hive, Value};
pub use invoker::{Class, ClassBuilder, ROUTE_HOOKS};
pub use method::Method;
pub use mock::{MockRequest, MockResponse};
pub use mutex::{FileLock, LockGuard, LockPolicy};
pub use report::ErrorReport;
pub use request::Request;
pub use response::{Captured, ContentType, Probe, Transport};
pub use router::{RequestType, Route, RouteTable};
pub use server::Server;
pub use status::Status;
