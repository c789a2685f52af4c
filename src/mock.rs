//! Synthetic requests run through the full dispatch path.
//!
//! ```rust,ignore
//! let res = app.mock("POST @item(id=7) [ajax]")
//!     .arg("qty", "2")
//!     .header("Accept", "application/json")
//!     .send()
//!     .await?;
//! assert_eq!(res.status(), 200);
//! ```

use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use indexmap::IndexMap;
use regex::Regex;

use crate::app::App;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Captured;
use crate::router;

const FORM: &str = "application/x-www-form-urlencoded";

static DESCRIPTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*([|\w]+)[ \t]+(?:@(\w+)(?:\((.+?)\))?|([^ \t]+))(?:[ \t]+\[((?i:sync|ajax))\])?[ \t]*$",
    )
    .expect("static regex")
});

/// A request under construction. Nothing happens until [`send`](MockRequest::send).
pub struct MockRequest {
    app: Arc<App>,
    descriptor: String,
    args: IndexMap<String, String>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl MockRequest {
    pub(crate) fn new(app: Arc<App>, descriptor: &str) -> Self {
        Self {
            app,
            descriptor: descriptor.to_owned(),
            args: IndexMap::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A query argument: sent in the URL for `GET`/`HEAD`, as a form body
    /// otherwise.
    pub fn arg(mut self, name: &str, value: impl Into<String>) -> Self {
        self.args.insert(name.to_owned(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Raw body, replacing the form-encoded arguments for non-`GET` verbs.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Dispatches the request. Only a malformed descriptor is an `Err`;
    /// routing failures come back as error responses.
    pub async fn send(self) -> Result<MockResponse, Error> {
        let caps = DESCRIPTOR
            .captures(&self.descriptor)
            .ok_or_else(|| Error::InvalidPattern(self.descriptor.clone()))?;
        let verb = Method::from_token(&caps[1])?;
        let ajax = caps.get(5).is_some_and(|m| m.as_str().eq_ignore_ascii_case("ajax"));

        let url = match (caps.get(2), caps.get(4)) {
            (Some(alias), _) => {
                let template = self
                    .app
                    .routes
                    .alias(alias.as_str())
                    .ok_or_else(|| Error::UnknownAlias(alias.as_str().to_owned()))?;
                let mut params = IndexMap::new();
                if let Some(args) = caps.get(3) {
                    router::parse(args.as_str(), &mut params);
                }
                self.app.routes.build(template, &params)
            }
            (None, Some(path)) => path.as_str().to_owned(),
            (None, None) => return Err(Error::InvalidPattern(self.descriptor.clone())),
        };

        let (path, inline) = match url.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (url.clone(), None),
        };
        let encoded = serde_urlencoded::to_string(&self.args)
            .map_err(|e| Error::InvalidPattern(format!("{}: {e}", self.descriptor)))?;
        let query = [inline.unwrap_or_default(), encoded]
            .into_iter()
            .filter(|q| !q.is_empty())
            .collect::<Vec<_>>()
            .join("&");

        let mut uri = format!("{}{path}", self.app.config.base);
        let mut request = Request::new(verb, String::new()).with_ajax(ajax);
        request.headers = self.headers;
        if matches!(verb, Method::Get | Method::Head) {
            if !query.is_empty() {
                uri = format!("{uri}?{query}");
            }
        } else if let Some(body) = self.body {
            request.body = body;
        } else {
            if request.header("Content-Type").is_none() {
                request.headers.push(("Content-Type".to_owned(), FORM.to_owned()));
            }
            request.body = Bytes::from(query);
        }
        request.uri = uri;

        let mut transport = Captured::new();
        let mut cx = self.app.context(request, &transport);
        self.app.dispatch(&mut cx, &mut transport).await;

        Ok(MockResponse {
            status: transport.status,
            headers: transport.headers,
            body: transport.body.freeze(),
            chunks: transport.chunks,
        })
    }
}

/// What a mock request produced.
#[derive(Debug)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    chunks: usize,
}

impl MockResponse {
    pub fn status(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    /// Number of chunks the body was sent in.
    pub fn chunks(&self) -> usize { self.chunks }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Case-insensitive lookup of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated header such as `Set-Cookie`.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}
