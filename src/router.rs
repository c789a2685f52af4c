//! Route patterns, the route table and URL building.
//!
//! A pattern reads `VERB[|VERB...] TEMPLATE [ [sync|ajax] ]`, where the
//! template is a literal URL with `@token` placeholders and an optional `*`
//! tail, `@alias: TEMPLATE` (define an alias), or `@alias` (reuse one):
//!
//! ```text
//! GET /hello/@name
//! GET|POST @item: /item/@id
//! DELETE @item [ajax]
//! GET /files/*
//! ```
//!
//! Templates are kept in a `BTreeMap` and tried in *descending* key order,
//! which is the only specificity rule: `/users/me` is tried before
//! `/users/@id` because token markers sort below every printable character.

use std::collections::BTreeMap;
use std::sync::{LazyLock, OnceLock};

use indexmap::IndexMap;
use regex::{Captures, Regex};
use tracing::debug;

use crate::error::Error;
use crate::handler::Target;
use crate::hive::Value;
use crate::method::Method;

static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*([|\w]+)[ \t]+(?:@(\w+)[ \t]*:[ \t]*([^ \t]+)|@(\w+)|([^ \t]+))(?:[ \t]+\[((?i:sync|ajax))\])?[ \t]*$",
    )
    .expect("static regex")
});

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)\b").expect("static regex"));

static ALIAS_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@(\w+)(?:\((.+?)\))?$").expect("static regex"));

static PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)[ \t]*=[ \t]*(.+)").expect("static regex"));

/// Marks `@` in table keys so token templates sort below literal ones.
const TOKEN_MARK: &str = "\u{0}@";

// ── Request type ──────────────────────────────────────────────────────────────

/// Which kinds of request a route serves.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestType(u8);

impl RequestType {
    pub const SYNC: Self = Self(1);
    pub const AJAX: Self = Self(2);
    pub const BOTH: Self = Self(3);

    /// The exact type of a request.
    pub fn of(ajax: bool) -> Self {
        if ajax { Self::AJAX } else { Self::SYNC }
    }

    fn parse(suffix: Option<&str>) -> Self {
        match suffix.map(str::to_ascii_lowercase).as_deref() {
            Some("sync") => Self::SYNC,
            Some("ajax") => Self::AJAX,
            _ => Self::BOTH,
        }
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

/// One verb's registration on a template.
#[derive(Clone, Debug)]
pub struct Route {
    pub(crate) handler: Target,
    pub(crate) ttl: u64,
    pub(crate) kbps: u64,
}

impl Route {
    pub fn handler(&self) -> &Target { &self.handler }
    pub fn ttl(&self) -> u64 { self.ttl }
    pub fn kbps(&self) -> u64 { self.kbps }
}

/// Everything registered under one URL template.
pub struct Entry {
    template: String,
    variants: BTreeMap<RequestType, IndexMap<Method, Route>>,
    matchers: [OnceLock<Regex>; 2],
}

impl Entry {
    fn new(template: &str) -> Result<Self, Error> {
        let entry = Self {
            template: template.to_owned(),
            variants: BTreeMap::new(),
            matchers: [OnceLock::new(), OnceLock::new()],
        };
        let compiled = compile(template, false)
            .map_err(|e| Error::InvalidPattern(format!("{template}: {e}")))?;
        let _ = entry.matchers[0].set(compiled);
        Ok(entry)
    }

    /// The template as registered, `@` tokens included.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_wildcard(&self) -> bool {
        self.template.contains('*')
    }

    /// Anchored matcher for this template.
    pub(crate) fn matcher(&self, caseless: bool) -> Result<&Regex, Error> {
        let slot = &self.matchers[usize::from(caseless)];
        if let Some(re) = slot.get() {
            return Ok(re);
        }
        let compiled = compile(&self.template, caseless)
            .map_err(|e| Error::InvalidPattern(format!("{}: {e}", self.template)))?;
        Ok(slot.get_or_init(|| compiled))
    }

    /// The variant serving a request of this type: the exact type first,
    /// then routes registered for both.
    pub fn variant(&self, ajax: bool) -> Option<&IndexMap<Method, Route>> {
        self.variants
            .get(&RequestType::of(ajax))
            .or_else(|| self.variants.get(&RequestType::BOTH))
    }

    /// URL-decoded token values and wildcard tails of a structural match.
    pub(crate) fn extract(&self, re: &Regex, caps: &Captures<'_>) -> (IndexMap<String, String>, Vec<String>) {
        let mut params = IndexMap::new();
        let mut wildcards = Vec::new();
        for (i, name) in re.capture_names().enumerate().skip(1) {
            let Some(m) = caps.get(i) else { continue };
            let value = urldecode(m.as_str());
            match name {
                Some(name) => {
                    params.insert(name.to_owned(), value);
                }
                None => wildcards.push(value),
            }
        }
        (params, wildcards)
    }
}

/// Escapes literals, turns `@token` into a named group that stops at `/`
/// and `?`, `*` into a greedy group, and allows a trailing slash and a query.
fn compile(template: &str, caseless: bool) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(template).replace(r"\*", "(.*)");
    let body = TOKEN.replace_all(&escaped, "(?P<${1}>[^/?]+)");
    let flags = if caseless { "(?i)" } else { "" };
    Regex::new(&format!(r"{flags}^{body}/?(?:\?.*)?$"))
}

/// Percent-decodes `s`, treating `+` as a space. Invalid UTF-8 is kept raw.
pub(crate) fn urldecode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

// ── Route table ───────────────────────────────────────────────────────────────

/// Templates mapped to their per-request-type, per-verb routes, plus the
/// alias names defined along the way.
#[derive(Default)]
pub struct RouteTable {
    routes: BTreeMap<String, Entry>,
    aliases: IndexMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `target` for every verb in `pattern`.
    pub fn insert(&mut self, pattern: &str, target: Target, ttl: u64, kbps: u64) -> Result<(), Error> {
        let caps = PATTERN
            .captures(pattern)
            .ok_or_else(|| Error::InvalidPattern(pattern.to_owned()))?;

        let template = if let (Some(name), Some(template)) = (caps.get(2), caps.get(3)) {
            self.aliases.insert(name.as_str().to_owned(), template.as_str().to_owned());
            template.as_str().to_owned()
        } else if let Some(name) = caps.get(4) {
            self.aliases
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| Error::UnknownAlias(name.as_str().to_owned()))?
        } else {
            caps.get(5).map(|m| m.as_str().to_owned()).unwrap_or_default()
        };
        if template.is_empty() {
            return Err(Error::InvalidPattern(pattern.to_owned()));
        }

        let kind = RequestType::parse(caps.get(6).map(|m| m.as_str()));
        let verbs = caps[1]
            .split('|')
            .filter(|v| !v.is_empty())
            .map(Method::from_token)
            .collect::<Result<Vec<_>, _>>()?;

        let key = template.replace('@', TOKEN_MARK);
        if !self.routes.contains_key(&key) {
            self.routes.insert(key.clone(), Entry::new(&template)?);
        }
        let entry = self
            .routes
            .get_mut(&key)
            .ok_or_else(|| Error::InvalidPattern(pattern.to_owned()))?;
        for verb in verbs {
            debug!(verb = %verb, template = %template, "route registered");
            entry.variants.entry(kind).or_default().insert(
                verb,
                Route { handler: target.clone(), ttl, kbps },
            );
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Entries in matching order: descending by template key.
    pub fn specific_first(&self) -> impl Iterator<Item = &Entry> {
        self.routes.values().rev()
    }

    /// Registered templates in matching order.
    pub fn templates(&self) -> Vec<&str> {
        self.specific_first().map(Entry::template).collect()
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Replaces each `@token` in `url` with the matching entry of `params`,
    /// leaving unknown tokens untouched. A bare `@alias` (optionally with
    /// `(key=value,...)` arguments) expands to the alias template first.
    pub fn build(&self, url: &str, params: &IndexMap<String, String>) -> String {
        let mut scoped;
        let (url, params) = match ALIAS_REF.captures(url).and_then(|c| {
            let template = self.aliases.get(&c[1])?;
            Some((template, c.get(2).map(|m| m.as_str())))
        }) {
            Some((template, args)) => {
                scoped = params.clone();
                if let Some(args) = args {
                    parse(args, &mut scoped);
                }
                (template.as_str(), &scoped)
            }
            None => (url, params),
        };
        TOKEN_ANY
            .replace_all(url, |c: &Captures<'_>| {
                params.get(&c[1]).cloned().unwrap_or_else(|| c[0].to_owned())
            })
            .into_owned()
    }

    /// [`build`](RouteTable::build) applied to every string inside `val`.
    pub fn build_value(&self, val: &Value, params: &IndexMap<String, String>) -> Value {
        match val {
            Value::Str(url) => Value::Str(self.build(url, params)),
            Value::List(items) => Value::List(items.iter().map(|v| self.build_value(v, params)).collect()),
            Value::Map(map) => Value::Map(
                map.iter().map(|(k, v)| (k.clone(), self.build_value(v, params))).collect(),
            ),
            other => other.clone(),
        }
    }
}

static TOKEN_ANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").expect("static regex"));

/// Parses `key=value[,key=value...]` into `params`. Values are trimmed.
pub fn parse(s: &str, params: &mut IndexMap<String, String>) {
    for piece in s.split(',') {
        if let Some(c) = PAIR.captures(piece) {
            params.insert(c[1].to_owned(), c[2].trim().to_owned());
        }
    }
}

/// Replaces `@token`s in a handler descriptor with captured values.
pub(crate) fn substitute(descriptor: &str, params: &IndexMap<String, String>) -> String {
    TOKEN
        .replace_all(descriptor, |c: &Captures<'_>| {
            params.get(&c[1]).cloned().unwrap_or_else(|| c[0].to_owned())
        })
        .into_owned()
}
