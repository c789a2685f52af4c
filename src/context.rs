//! Per-request state handed to every handler.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use tracing::debug;

use crate::app::App;
use crate::error::Error;
use crate::handler::{Handler, Outcome};
use crate::hive::{Hive, Value, horizon};
use crate::method::Method;
use crate::mutex::{FileLock, LockPolicy};
use crate::request::Request;
use crate::response::{ContentType, Probe};
use crate::router::{self, urldecode};

/// Everything a handler can see and change while serving one request.
///
/// The hive starts from the application defaults with `GET`, `POST`,
/// `COOKIE` and `REQUEST` filled from the request. Output written with
/// [`write`](Context::write) becomes the response body.
pub struct Context {
    pub hive: Hive,
    pub request: Request,
    status: u16,
    headers: Vec<(String, String)>,
    output: String,
    app: Arc<App>,
    probe: Probe,
}

impl Context {
    pub(crate) fn new(app: Arc<App>, mut request: Request, probe: Probe) -> Self {
        let mut hive = Hive::new(app.defaults.clone(), (app.sessions)());

        let get = request.query().map(form_pairs).unwrap_or_default();
        let post = match request.header("Content-Type") {
            Some(ct) if request.verb == Method::Post && ct.starts_with("application/x-www-form-urlencoded") => {
                form_pairs(&String::from_utf8_lossy(request.body()))
            }
            _ => IndexMap::new(),
        };
        if let Some(verb) = post.get("_method") {
            match Method::from_token(verb) {
                Ok(verb) => request.verb = verb,
                Err(e) => debug!("ignoring verb override: {e}"),
            }
        }
        let cookies: IndexMap<String, String> = request
            .header("Cookie")
            .map(|raw| {
                raw.split(';')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.trim().to_owned(), urldecode(v.trim())))
                    .collect()
            })
            .unwrap_or_default();
        let mut merged = get.clone();
        merged.extend(post.clone());

        // Bare namespace writes are not mirrored, so REQUEST is filled here.
        for (key, vars) in [("GET", get), ("POST", post), ("COOKIE", cookies), ("REQUEST", merged)] {
            if let Err(e) = hive.set(key, Value::from(vars)) {
                debug!(key, "request intake failed: {e}");
            }
        }
        // A configured language wins over the client's preference.
        if app.config.language.is_none() {
            let language = match request.header("Accept-Language") {
                Some(accepted) => accepted.to_owned(),
                None => hive.text("FALLBACK"),
            };
            if let Err(e) = hive.set("LANGUAGE", language) {
                debug!("language negotiation failed: {e}");
            }
        }

        Self {
            hive,
            request,
            status: 200,
            headers: Vec::new(),
            output: String::new(),
            app,
            probe,
        }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Appends to the response body.
    pub fn write(&mut self, s: impl AsRef<str>) {
        self.output.push_str(s.as_ref());
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub(crate) fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    /// Sets a response header, replacing any previous value.
    pub fn header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_owned(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn response_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_type(&mut self, ct: ContentType) {
        self.header("Content-Type", ct.as_str());
    }

    /// Status and headers to send, session cookies included.
    pub(crate) fn take_head(&mut self) -> (u16, Vec<(String, String)>) {
        let mut headers = std::mem::take(&mut self.headers);
        headers.extend(self.hive.take_cookies().into_iter().map(|c| ("Set-Cookie".to_owned(), c)));
        (self.status, headers)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// Fills `@tokens` (or expands `@alias(args)`) from the current params.
    pub fn build(&self, url: &str) -> String {
        self.app.routes.build(url, &self.request.params)
    }

    /// [`build`](Context::build) over every string in a list or map.
    pub fn build_value(&self, val: &Value) -> Value {
        self.app.routes.build_value(val, &self.request.params)
    }

    /// Merges `key=value[,key=value...]` into the current params.
    pub fn parse(&mut self, s: &str) {
        router::parse(s, &mut self.request.params);
    }

    /// Redirects to `url` (a path, a template or `@alias(args)`) and stops
    /// the handler chain. Paths are resolved against `BASE`.
    pub fn reroute(&mut self, url: &str, permanent: bool) -> Result<Outcome, Error> {
        let mut target = self.build(url);
        if target.starts_with('/') {
            target = format!("{}{target}", self.hive.text("BASE"));
        }
        self.redirect(&target, permanent);
        Ok(Outcome::Abort)
    }

    pub(crate) fn redirect(&mut self, location: &str, permanent: bool) {
        debug!(location, permanent, "redirecting");
        self.header("Location", location);
        self.set_status(if permanent { 301 } else { 302 });
    }

    /// Invokes `handler` with the comma-separated `hooks` its class defines.
    pub fn call(&mut self, handler: impl Handler, args: &[Value], hooks: &str) -> Result<Outcome, Error> {
        let app = Arc::clone(&self.app);
        app.invoker.call(self, &handler.into_target(), args, hooks)
    }

    /// Calls every handler with the same arguments and collects the results.
    pub fn chain<H: Handler>(
        &mut self,
        handlers: impl IntoIterator<Item = H>,
        args: &[Value],
    ) -> Result<Vec<Outcome>, Error> {
        handlers.into_iter().map(|h| self.call(h, args, "")).collect()
    }

    /// Calls handlers in order, each receiving the previous result as its
    /// only argument. Stops at the first `Abort`.
    pub fn relay<H: Handler>(
        &mut self,
        handlers: impl IntoIterator<Item = H>,
        args: &[Value],
    ) -> Result<Outcome, Error> {
        let mut args = args.to_vec();
        let mut last = Outcome::Continue(Value::Null);
        for handler in handlers {
            last = self.call(handler, &args, "")?;
            match &last {
                Outcome::Abort => break,
                Outcome::Continue(v) => args = vec![v.clone()],
            }
        }
        Ok(last)
    }

    /// Runs `handler` while holding the lock file for `id`, so that no
    /// other request (in this or another process) runs under the same id
    /// at the same time. Returns `Abort` without running `handler` if the
    /// client disconnects while waiting.
    pub fn mutex(&mut self, id: &str, handler: impl Handler, args: &[Value]) -> Result<Outcome, Error> {
        let scope = format!("{}{}", self.hive.text("ROOT"), self.hive.text("BASE"));
        let lock = FileLock::new(self.hive.text("TEMP"), &scope, id);
        let policy = LockPolicy {
            stale_after: Duration::from_secs(self.app.config.max_execution_time),
            ..LockPolicy::default()
        };
        let probe = Arc::clone(&self.probe);
        let Some(_guard) = lock.acquire(&policy, || probe())? else {
            return Ok(Outcome::Abort);
        };
        self.call(handler, args, "")
    }

    pub fn connection_aborted(&self) -> bool {
        (self.probe)()
    }

    /// Writes the security and cache headers for a response cacheable for
    /// `secs` seconds (`0` disables caching). Returns `true` when the
    /// client's copy is still fresh and a 304 should be sent instead.
    pub(crate) fn expire(&mut self, secs: u64) -> bool {
        let xframe = self.hive.text("XFRAME");
        let package = self.hive.text("PACKAGE");
        self.header("X-Content-Type-Options", "nosniff");
        if !xframe.is_empty() {
            self.header("X-Frame-Options", xframe);
        }
        self.header("X-Powered-By", package);
        self.header("X-XSS-Protection", "1; mode=block");

        if secs == 0 {
            self.header("Cache-Control", "no-cache, no-store, must-revalidate");
            self.header("Pragma", "no-cache");
            return false;
        }

        let now = SystemTime::now();
        self.remove_header("Pragma");
        self.header("Expires", httpdate::fmt_http_date(horizon(now, secs)));
        self.header("Cache-Control", format!("max-age={secs}"));
        self.header("Last-Modified", httpdate::fmt_http_date(now));
        self.request
            .header("If-Modified-Since")
            .and_then(|since| httpdate::parse_http_date(since).ok())
            .is_some_and(|since| since.checked_add(Duration::from_secs(secs)).is_none_or(|fresh| fresh > now))
    }
}

/// Decodes an `application/x-www-form-urlencoded` string. A malformed
/// string decodes to nothing.
pub(crate) fn form_pairs(s: &str) -> IndexMap<String, String> {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(s) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            debug!("undecodable form data: {e}");
            IndexMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_decoding() {
        let pairs = form_pairs("a=1&b=two+words&c=%2Fx&flag");
        assert_eq!(pairs["b"], "two words");
        assert_eq!(pairs["c"], "/x");
        assert_eq!(pairs["flag"], "");
    }
}
