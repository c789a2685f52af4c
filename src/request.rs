//! The per-request context the dispatcher matches and mutates.

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use indexmap::IndexMap;

use crate::error::Error;
use crate::method::Method;

/// An inbound request, from a live connection or synthesised by a mock.
///
/// The dispatcher fills in [`params`](Request::params),
/// [`wildcards`](Request::wildcards) and [`pattern`](Request::pattern) once a
/// route matches.
pub struct Request {
    pub(crate) verb: Method,
    pub(crate) uri: String,
    pub(crate) ajax: bool,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) params: IndexMap<String, String>,
    pub(crate) wildcards: Vec<String>,
    pub(crate) pattern: Option<String>,
    pub(crate) body: Bytes,
    pub(crate) pending: Option<Incoming>,
    pub(crate) ip: String,
}

impl Request {
    /// A synchronous request for `uri` with no headers and an empty body.
    pub fn new(verb: Method, uri: impl Into<String>) -> Self {
        Self {
            verb,
            uri: uri.into(),
            ajax: false,
            headers: Vec::new(),
            params: IndexMap::new(),
            wildcards: Vec::new(),
            pattern: None,
            body: Bytes::new(),
            pending: None,
            ip: String::new(),
        }
    }

    /// Builds a request from wire parts.
    ///
    /// `X-HTTP-Method-Override` replaces the verb, `X-Requested-With:
    /// XMLHttpRequest` marks the request as AJAX and the caller address is
    /// taken from `Client-IP`, then `X-Forwarded-For`, then `peer`.
    pub fn from_parts(
        method: &str,
        uri: impl Into<String>,
        headers: Vec<(String, String)>,
        peer: Option<std::net::IpAddr>,
    ) -> Result<Self, Error> {
        let mut req = Self::new(Method::Get, uri);
        req.headers = headers;
        req.verb = match req.header("X-HTTP-Method-Override") {
            Some(verb) => Method::from_token(verb)?,
            None => method.parse()?,
        };
        req.ajax = req
            .header("X-Requested-With")
            .is_some_and(|v| v == "XMLHttpRequest");
        req.ip = req
            .header("Client-IP")
            .or_else(|| req.header("X-Forwarded-For"))
            .map(str::to_owned)
            .or_else(|| peer.map(|ip| ip.to_string()))
            .unwrap_or_default();
        Ok(req)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_ajax(mut self, ajax: bool) -> Self {
        self.ajax = ajax;
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_owned();
        self
    }

    /// Leaves the body on the connection until the dispatcher asks for it.
    pub(crate) fn with_pending(mut self, body: Incoming) -> Self {
        self.pending = Some(body);
        self
    }

    pub fn verb(&self) -> Method { self.verb }
    pub fn uri(&self) -> &str { &self.uri }
    pub fn is_ajax(&self) -> bool { self.ajax }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn ip(&self) -> &str { &self.ip }

    /// The URI without its query string.
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a captured route token.
    ///
    /// For a route `/users/@id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    /// Text matched by each `*` of a wildcard template, in order.
    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }

    /// The template of the route that matched, once dispatch has found one.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Collects a body still waiting on the connection.
    pub(crate) async fn read_body(&mut self) -> Result<(), Error> {
        if let Some(incoming) = self.pending.take() {
            let collected = incoming.collect().await.map_err(std::io::Error::other)?;
            self.body = collected.to_bytes();
        }
        Ok(())
    }
}
