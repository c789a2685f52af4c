//! The application: routes, handler registry and startup configuration.
//!
//! Registration happens once, before the application is shared. After
//! [`App::shared`] (or wrapping it in an `Arc` yourself) it is read-only,
//! and every request gets its own [`Context`].

use std::io::Write;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::config::Config;
use crate::context::Context;
use crate::dispatcher;
use crate::error::Error;
use crate::handler::{FnHandler, Handler, IntoOutcome, Target};
use crate::hive::{MemorySession, SessionStore, Value};
use crate::invoker::{Class, Invoker};
use crate::method::Method;
use crate::mock::{MockRequest, MockResponse};
use crate::report;
use crate::request::Request;
use crate::response::Transport;
use crate::router::RouteTable;

type SessionFactory = Arc<dyn Fn() -> Box<dyn SessionStore> + Send + Sync>;

/// Redirects followed by [`App::emulate`].
const MAX_HOPS: usize = 10;

pub struct App {
    pub(crate) routes: RouteTable,
    pub(crate) invoker: Invoker,
    pub(crate) config: Config,
    pub(crate) defaults: IndexMap<String, Value>,
    pub(crate) sessions: SessionFactory,
    pub(crate) on_error: Option<Target>,
    pub(crate) on_unload: Option<Target>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        let config = Config::default();
        let session = MemorySession::new();
        Self {
            routes: RouteTable::new(),
            invoker: Invoker::default(),
            defaults: config.hive_defaults(),
            config,
            sessions: Arc::new(move || Box::new(session.clone()) as Box<dyn SessionStore>),
            on_error: None,
            on_unload: None,
        }
    }

    /// An application configured by `config`, with its `[routes]` table
    /// already registered.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let mut app = Self { defaults: config.hive_defaults(), config, ..Self::new() };
        for (pattern, descriptor) in app.config.routes.clone() {
            app.routes.insert(&pattern, Target::Named(descriptor), 0, 0)?;
        }
        Ok(app)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Registers `handler` for a pattern such as `GET|POST /users/@id`.
    pub fn route(self, pattern: &str, handler: impl Handler) -> Result<Self, Error> {
        self.route_with(pattern, handler, 0, 0)
    }

    /// Like [`route`](App::route), cacheable for `ttl` seconds and sent at
    /// no more than `kbps` kilobytes per second (`0` disables either).
    pub fn route_with(mut self, pattern: &str, handler: impl Handler, ttl: u64, kbps: u64) -> Result<Self, Error> {
        self.routes.insert(pattern, handler.into_target(), ttl, kbps)?;
        Ok(self)
    }

    /// Registers one handler under several patterns.
    pub fn route_many(mut self, patterns: &[&str], handler: impl Handler) -> Result<Self, Error> {
        let target = handler.into_target();
        for pattern in patterns {
            self.routes.insert(pattern, target.clone(), 0, 0)?;
        }
        Ok(self)
    }

    /// Routes every verb `class` has a member for (`get`, `post`, ...) on
    /// `url` to `Class->verb`. A class name holding an `@token` is resolved
    /// per request, so every verb is routed.
    pub fn map(mut self, url: &str, class: &str) -> Result<Self, Error> {
        let members: Option<Vec<String>> = if class.contains('@') {
            None
        } else {
            let found = self
                .invoker
                .class(class)
                .ok_or_else(|| Error::UnknownClass(class.to_owned()))?;
            Some(found.members().map(str::to_owned).collect())
        };
        for verb in Method::ALL {
            let member = verb.as_str().to_ascii_lowercase();
            if members.as_ref().is_none_or(|m| m.contains(&member)) {
                let pattern = format!("{verb} {url}");
                self.routes.insert(&pattern, Target::Named(format!("{class}->{member}")), 0, 0)?;
            }
        }
        Ok(self)
    }

    pub fn class(mut self, class: impl Into<Class>) -> Self {
        self.invoker.add_class(class.into());
        self
    }

    /// Registers a function callable by name from routes and hooks.
    pub fn function<F, R>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Context, &[Value]) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.invoker.add_function(name, Arc::new(FnHandler(f)));
        self
    }

    /// Handler run when a request fails; see [`ErrorReport`](crate::ErrorReport).
    pub fn on_error(mut self, handler: impl Handler) -> Self {
        self.on_error = Some(handler.into_target());
        self
    }

    /// Handler run after every request, once the response is out.
    pub fn on_unload(mut self, handler: impl Handler) -> Self {
        self.on_unload = Some(handler.into_target());
        self
    }

    /// Session backend factory, called once per request.
    pub fn sessions<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SessionStore> + Send + Sync + 'static,
    {
        self.sessions = Arc::new(factory);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Serves `request` through `transport`.
    pub async fn handle<T: Transport>(self: &Arc<Self>, request: Request, transport: &mut T) {
        let mut cx = self.context(request, transport);
        self.dispatch(&mut cx, transport).await;
    }

    pub(crate) fn context<T: Transport>(self: &Arc<Self>, request: Request, transport: &T) -> Context {
        Context::new(Arc::clone(self), request, transport.probe())
    }

    pub(crate) async fn dispatch<T: Transport>(&self, cx: &mut Context, transport: &mut T) {
        if let Err(e) = dispatcher::run(cx, transport).await {
            report::report(cx, &e, transport).await;
        }
        self.unload(cx);
    }

    /// Reports a request that failed before it could be routed, such as
    /// one with an unsupported verb. `request` stands in for the original.
    pub(crate) async fn reject<T: Transport>(self: &Arc<Self>, request: Request, err: &Error, transport: &mut T) {
        let mut cx = self.context(request, transport);
        report::report(&mut cx, err, transport).await;
        self.unload(&mut cx);
    }

    fn unload(&self, cx: &mut Context) {
        cx.hive.commit_session();
        if let Some(handler) = self.on_unload.clone() {
            if let Err(e) = cx.call(handler, &[], "") {
                error!("unload handler failed: {e}");
            }
        }
    }

    /// A synthetic request, e.g. `app.mock("GET @item(id=7) [ajax]")`.
    pub fn mock(self: &Arc<Self>, descriptor: &str) -> MockRequest {
        MockRequest::new(Arc::clone(self), descriptor)
    }

    /// Serves a command-line invocation: the first argument after the
    /// program name is requested with `GET` (default `/`), redirects are
    /// followed and the final body is written to stdout.
    pub async fn emulate(self: &Arc<Self>, args: impl IntoIterator<Item = String>) -> Result<MockResponse, Error> {
        let mut path = args.into_iter().nth(1).unwrap_or_else(|| "/".to_owned());
        let base = self.config.base.clone();
        let mut hops = 0;
        let response = loop {
            let response = self.mock(&format!("GET {path}")).send().await?;
            let location = response.header("Location").map(str::to_owned);
            match location {
                Some(location) if (300..400).contains(&response.status()) && hops < MAX_HOPS => {
                    debug!(location = %location, "following redirect");
                    hops += 1;
                    path = location.strip_prefix(base.as_str()).unwrap_or(&location).to_owned();
                }
                _ => break response,
            }
        };
        std::io::stdout().write_all(response.body())?;
        Ok(response)
    }
}
