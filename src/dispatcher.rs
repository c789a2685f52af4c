//! The request matching loop.
//!
//! `run` turns one request into one response:
//!
//! 1. refuse blacklisted clients
//! 2. walk templates most-specific first until one matches structurally
//!    *and* serves this request type and verb
//! 3. redirect `GET /path/` to `/path`
//! 4. capture tokens, write cache headers, answer 304 when possible
//! 5. read the body, invoke the handler between its hooks
//! 6. send the buffered output, throttled when the route asks for it
//!
//! A structural match on the wrong verb is remembered so that, if nothing
//! else matches, the client gets a 405 listing the verbs that would have.

use std::any::Any;
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{Outcome, Target};
use crate::hive::Value;
use crate::invoker::{Invoker, ROUTE_HOOKS};
use crate::method::Method;
use crate::response::Transport;
use crate::router::substitute;

/// Bytes per throttled chunk; a route's `kbps` is chunks per second.
const CHUNK: usize = 1024;

pub(crate) async fn run<T: Transport>(cx: &mut Context, transport: &mut T) -> Result<(), Error> {
    if blacklisted(cx).await {
        return Err(Error::Forbidden);
    }
    let app = std::sync::Arc::clone(cx.app());
    if app.routes.is_empty() {
        return Err(Error::NoRoutesRegistered);
    }

    let base = cx.hive.text("BASE");
    let uri = cx.request.uri().to_owned();
    let req = uri.strip_prefix(base.as_str()).filter(|_| !base.is_empty()).unwrap_or(&uri);
    let (path, query) = match req.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (req, None),
    };
    let caseless = cx.hive.flag("CASELESS");
    let verb = cx.request.verb();
    let mut allowed: Vec<Method> = Vec::new();

    for entry in app.routes.specific_first() {
        let re = entry.matcher(caseless)?;
        let Some(caps) = re.captures(req) else { continue };
        let Some(routes) = entry.variant(cx.request.is_ajax()) else { continue };
        let route = match routes.get(&verb) {
            Some(route) if verb != Method::Options => route,
            _ => {
                for method in routes.keys() {
                    if !allowed.contains(method) {
                        allowed.push(*method);
                    }
                }
                continue;
            }
        };

        if verb == Method::Get && path.len() > 1 && path.ends_with('/') && !entry.is_wildcard() {
            let target = format!(
                "{base}{}{}",
                path.strip_suffix('/').unwrap_or(path),
                query.map(|q| format!("?{q}")).unwrap_or_default()
            );
            let target = if target.is_empty() { "/".to_owned() } else { target };
            cx.redirect(&target, app.config.permanent);
            return send(cx, transport, Bytes::new(), 0).await;
        }

        let started = Instant::now();
        let (params, wildcards) = entry.extract(re, &caps);
        let handler = match &route.handler {
            Target::Named(descriptor) => {
                let descriptor = substitute(descriptor, &params);
                if let Some(class) = Invoker::descriptor_class(&descriptor) {
                    if app.invoker.class(class).is_none() {
                        debug!(class, "handler class not registered");
                        return Err(Error::NotFound);
                    }
                }
                Target::Named(descriptor)
            }
            func => func.clone(),
        };
        debug!(verb = %verb, pattern = entry.template(), "route matched");
        cx.request.params = params;
        cx.request.wildcards = wildcards;
        cx.request.pattern = Some(entry.template().to_owned());

        if cx.expire(route.ttl()) {
            cx.set_status(304);
            return send(cx, transport, Bytes::new(), 0).await;
        }
        if !cx.hive.flag("RAW") {
            cx.request.read_body().await?;
        }

        let args = [Value::from(cx.request.params.clone())];
        let outcome = invoke(cx, &handler, &args)?;
        let mut body = cx.take_output();
        if body.is_empty() {
            if let Outcome::Continue(Value::Str(s)) = outcome {
                body = s;
            }
        }
        cx.hive.set("RESPONSE", body.as_str())?;
        return send_paced(cx, transport, Bytes::from(body), route.kbps(), started).await;
    }

    if allowed.is_empty() {
        return Err(Error::NotFound);
    }
    let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(",");
    cx.header("Allow", allow);
    if verb != Method::Options {
        return Err(Error::MethodNotAllowed);
    }
    send(cx, transport, Bytes::new(), 0).await
}

/// Invokes a routed handler between its hooks. A panic is reported as a
/// fatal error instead of tearing down the connection task.
fn invoke(cx: &mut Context, handler: &Target, args: &[Value]) -> Result<Outcome, Error> {
    let app = std::sync::Arc::clone(cx.app());
    panic::catch_unwind(AssertUnwindSafe(|| app.invoker.call(cx, handler, args, ROUTE_HOOKS)))
        .unwrap_or_else(|payload| Err(Error::Fatal(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}

pub(crate) async fn send<T: Transport>(
    cx: &mut Context,
    transport: &mut T,
    body: Bytes,
    kbps: u64,
) -> Result<(), Error> {
    send_paced(cx, transport, body, kbps, Instant::now()).await
}

/// Sends the head, then the body unless `QUIET` is set. With `kbps > 0`
/// the n-th chunk of [`CHUNK`] bytes is not sent before `n / kbps` seconds
/// after `started`.
async fn send_paced<T: Transport>(
    cx: &mut Context,
    transport: &mut T,
    body: Bytes,
    kbps: u64,
    started: Instant,
) -> Result<(), Error> {
    let (status, headers) = cx.take_head();
    transport.head(status, headers).await?;
    if body.is_empty() || cx.hive.flag("QUIET") {
        return Ok(());
    }
    if kbps == 0 {
        if let Err(e) = transport.chunk(body).await {
            debug!("body not delivered: {e}");
        }
        return Ok(());
    }

    let mut sent = 0;
    let mut ctr = 0u64;
    while sent < body.len() {
        if cx.connection_aborted() {
            debug!(sent, total = body.len(), "client gone, transfer stopped");
            break;
        }
        ctr += 1;
        let due = Duration::from_secs_f64(ctr as f64 / kbps as f64);
        let elapsed = started.elapsed();
        if due > elapsed {
            sleep(due - elapsed).await;
        }
        let end = (sent + CHUNK).min(body.len());
        if let Err(e) = transport.chunk(body.slice(sent..end)).await {
            debug!("body not delivered: {e}");
            break;
        }
        sent = end;
    }
    Ok(())
}

/// Deny-listed addresses are refused outright. Otherwise, unless exempt,
/// an IPv4 client is looked up in every configured DNS blocklist.
async fn blacklisted(cx: &mut Context) -> bool {
    let ip = cx.request.ip().to_owned();
    let list = |cx: &mut Context, key: &str| {
        cx.hive.lookup(key).ok().flatten().map(Value::to_list).unwrap_or_default()
    };
    if list(cx, "DENY").contains(&ip) {
        warn!(ip = %ip, "denied client");
        return true;
    }
    let servers = list(cx, "DNSBL");
    if servers.is_empty() || list(cx, "EXEMPT").contains(&ip) {
        return false;
    }
    let Ok(IpAddr::V4(addr)) = ip.parse::<IpAddr>() else { return false };
    let [a, b, c, d] = addr.octets();
    let reversed = format!("{d}.{c}.{b}.{a}");
    for server in servers {
        let name = format!("{reversed}.{server}:80");
        if let Ok(mut found) = tokio::net::lookup_host(name).await {
            if found.next().is_some() {
                warn!(ip = %ip, server = %server, "client listed in DNS blocklist");
                return true;
            }
        }
    }
    false
}
