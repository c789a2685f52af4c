//! The hive: a hierarchical, path-addressed state container.
//!
//! Every piece of configuration and request state the dispatcher reads lives
//! here, addressed by keys such as `POST.user.name`, `JAR.path` or
//! `obj->prop[0]` (see the grammar in `path`). Write access creates the
//! missing containers along the way; read access never does.
//!
//! A handful of top-level keys have side effects when written or cleared:
//!
//! - `GET.*`, `POST.*` and `COOKIE.*` are mirrored into `REQUEST.*`;
//!   cookie writes also emit a `Set-Cookie` header built from `JAR`.
//! - `LANGUAGE`, `FALLBACK` and `LOCALES` renegotiate the language sequence
//!   and reload the dictionary under `PREFIX`.
//! - `JAR.*` reconfigures the session cookie.
//! - `SESSION.*` is bracketed by the [`SessionStore`].

mod locale;
mod path;
mod session;
mod value;

use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::error::Error;
use path::{Path, Step};

pub use locale::{format, languages, lexicon};
pub use session::{MemorySession, SessionStore};
pub use value::{split, Value};

/// Top-level namespaces that start out as empty maps.
pub const GLOBALS: [&str; 6] = ["GET", "POST", "COOKIE", "REQUEST", "SESSION", "FILES"];

static MIRRORED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(GET|POST|COOKIE)\b(.+)").expect("static regex"));

static JAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^JAR\b").expect("static regex"));

/// Furthest a written HTTP date may lie in the future.
const MAX_HORIZON: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// `from` plus `secs` seconds, capped at ten years from now so the result
/// stays a valid HTTP date.
pub(crate) fn horizon(from: SystemTime, secs: u64) -> SystemTime {
    let cap = SystemTime::now() + MAX_HORIZON;
    from.checked_add(Duration::from_secs(secs)).map_or(cap, |at| at.min(cap))
}

/// Source operand of [`Hive::merge`].
pub enum Merge {
    Key(String),
    Value(Value),
}

impl From<&str> for Merge {
    fn from(key: &str) -> Self { Self::Key(key.to_owned()) }
}

impl From<Value> for Merge {
    fn from(val: Value) -> Self { Self::Value(val) }
}

/// The hierarchical key-value store.
pub struct Hive {
    vars: Value,
    init: IndexMap<String, Value>,
    session: Box<dyn SessionStore>,
    session_active: bool,
    session_id: Option<String>,
    cookies: Vec<String>,
    languages: Vec<String>,
    fallback: String,
}

impl Hive {
    /// Creates a hive whose startup defaults are `defaults` plus the empty
    /// request namespaces in [`GLOBALS`].
    pub fn new(mut defaults: IndexMap<String, Value>, session: Box<dyn SessionStore>) -> Self {
        for global in GLOBALS {
            defaults.entry(global.to_owned()).or_insert_with(Value::map);
        }
        let fallback = defaults
            .get("FALLBACK")
            .map(Value::to_text)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "en".to_owned());
        let languages = defaults
            .get("LANGUAGE")
            .map(|l| locale::languages(&l.to_text(), &fallback))
            .unwrap_or_else(|| vec![fallback.clone()]);
        Self {
            vars: Value::Map(defaults.clone()),
            init: defaults,
            session,
            session_active: false,
            session_id: None,
            cookies: Vec::new(),
            languages,
            fallback,
        }
    }

    /// Mutable handle to the value at `key`, creating every missing
    /// container on the way.
    pub fn ref_mut(&mut self, key: &str) -> Result<&mut Value, Error> {
        let path = Path::parse(key)?;
        self.session_scope(&path);
        let mut cur = self.vars.slot(&path.root);
        for step in &path.steps {
            cur = match step {
                Step::Key(k) => cur.slot(k),
                Step::Prop(p) => cur.coerce_object().entry(p.clone()).or_default(),
            };
        }
        Ok(cur)
    }

    /// Read-only traversal. `None` if any step is missing.
    pub fn lookup(&mut self, key: &str) -> Result<Option<&Value>, Error> {
        let path = Path::parse(key)?;
        self.session_scope(&path);
        let mut cur = match self.vars.child(&path.root) {
            Some(v) => v,
            None => return Ok(None),
        };
        for step in &path.steps {
            let next = match step {
                Step::Key(k) => cur.child(k),
                Step::Prop(p) => cur.prop(p),
            };
            match next {
                Some(v) => cur = v,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    pub fn exists(&mut self, key: &str) -> Result<bool, Error> {
        Ok(self.lookup(key)?.is_some_and(|v| !v.is_null()))
    }

    /// `true` if the key is unset or holds an empty value.
    pub fn devoid(&mut self, key: &str) -> Result<bool, Error> {
        Ok(self.lookup(key)?.is_none_or(Value::is_empty))
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.lookup(key)?.filter(|v| !v.is_null()).cloned())
    }

    /// Like [`get`](Self::get), but string values are treated as message
    /// templates and formatted with `args`.
    pub fn get_with(&mut self, key: &str, args: &[Value]) -> Result<Option<Value>, Error> {
        Ok(match self.get(key)? {
            Some(Value::Str(template)) => Some(Value::Str(locale::format(&template, args))),
            other => other,
        })
    }

    pub fn set(&mut self, key: &str, val: impl Into<Value>) -> Result<(), Error> {
        self.set_ttl(key, val, 0)
    }

    /// Binds `val` to `key`. For cookies, a non-zero `ttl` sets the expiry
    /// that many seconds from now.
    pub fn set_ttl(&mut self, key: &str, val: impl Into<Value>, ttl: u64) -> Result<(), Error> {
        let mut val = val.into();
        let path = Path::parse(key)?;

        if let Some(caps) = MIRRORED.captures(key) {
            self.set(&format!("REQUEST{}", &caps[2]), val.clone())?;
            if &caps[1] == "COOKIE" {
                if let Some(name) = path.steps.first() {
                    let expire = (ttl > 0).then(|| horizon(SystemTime::now(), ttl));
                    self.emit_cookie(name.name(), &val.to_text(), expire);
                }
            }
        } else {
            match key {
                "ENCODING" => debug!(encoding = %val, "character encoding changed"),
                "TZ" => debug!(tz = %val, "default timezone changed"),
                "FALLBACK" => {
                    self.fallback = val.to_text();
                    let current = self.text("LANGUAGE");
                    let negotiated = self.negotiate(&current);
                    self.write(&Path::parse("LANGUAGE")?, negotiated.into());
                    let locales = self.text("LOCALES");
                    self.reload_lexicon(&locales, ttl)?;
                }
                "LANGUAGE" => {
                    val = self.negotiate(&val.to_text()).into();
                    let locales = self.text("LOCALES");
                    self.reload_lexicon(&locales, ttl)?;
                }
                "LOCALES" => self.reload_lexicon(&val.to_text(), ttl)?,
                _ => {}
            }
        }

        self.session_scope(&path);
        self.write(&path, val);

        if JAR.is_match(key) {
            let jar = self.vars.child("JAR").cloned().unwrap_or_default();
            self.session.configure(&jar);
        }
        if path.root == "SESSION" {
            self.commit_session();
        }
        Ok(())
    }

    /// Removes `key`. A bare top-level key with a startup default is reset
    /// to that default instead.
    pub fn clear(&mut self, key: &str) -> Result<(), Error> {
        let path = Path::parse(key)?;

        if let Some(caps) = MIRRORED.captures(key) {
            self.clear(&format!("REQUEST{}", &caps[2]))?;
            if &caps[1] == "COOKIE" {
                if let Some(name) = path.steps.first() {
                    let expired = SystemTime::now() - Duration::from_secs(365 * 24 * 3600);
                    self.emit_cookie(name.name(), "", Some(expired));
                }
            }
        } else if path.root == "SESSION" {
            self.session_scope(&path);
            if path.is_bare() {
                if let Some(id) = self.session_id.take() {
                    self.session.destroy(&id);
                }
                let name = self.session.name().to_owned();
                if let Some(Value::Map(cookies)) = self.vars.child_mut("COOKIE") {
                    cookies.shift_remove(&name);
                }
                let pending = format!("{name}=");
                self.cookies.retain(|c| !c.starts_with(&pending));
                self.session_active = false;
                self.session_scope(&path);
            }
        }

        if path.is_bare() && self.init.contains_key(&path.root) {
            let default = self.init[&path.root].clone();
            self.write(&path, default);
        } else {
            self.remove(&path);
            if path.root == "SESSION" {
                self.commit_session();
            }
        }
        Ok(())
    }

    /// Applies [`set_ttl`](Self::set_ttl) to every entry, prefixing keys.
    pub fn mset<V: Into<Value>>(
        &mut self,
        vars: impl IntoIterator<Item = (String, V)>,
        prefix: &str,
        ttl: u64,
    ) -> Result<(), Error> {
        for (key, val) in vars {
            self.set_ttl(&format!("{prefix}{key}"), val, ttl)?;
        }
        Ok(())
    }

    /// Copies the value at `src` to `dst` and returns it.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<Value, Error> {
        let val = self.lookup(src)?.cloned().unwrap_or_default();
        *self.ref_mut(dst)? = val.clone();
        Ok(val)
    }

    /// Appends `val` to the string at `key`.
    pub fn concat(&mut self, key: &str, val: &str) -> Result<String, Error> {
        let slot = self.ref_mut(key)?;
        if matches!(slot, Value::List(_) | Value::Map(_) | Value::Object(_)) {
            return Err(shape(key, "string"));
        }
        let joined = slot.to_text() + val;
        *slot = Value::Str(joined.clone());
        Ok(joined)
    }

    /// Swaps keys and values of the container at `key`.
    pub fn flip(&mut self, key: &str) -> Result<Value, Error> {
        let slot = self.ref_mut(key)?;
        let flipped: Value = match &*slot {
            Value::Map(map) => map.iter().map(|(k, v)| (v.to_text(), Value::from(k.as_str()))).collect(),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (v.to_text(), Value::from(i as u64)))
                .collect(),
            _ => return Err(shape(key, "map or list")),
        };
        *slot = flipped.clone();
        Ok(flipped)
    }

    pub fn push(&mut self, key: &str, val: impl Into<Value>) -> Result<(), Error> {
        list(self.ref_mut(key)?, key)?.push(val.into());
        Ok(())
    }

    pub fn pop(&mut self, key: &str) -> Result<Option<Value>, Error> {
        Ok(list(self.ref_mut(key)?, key)?.pop())
    }

    pub fn unshift(&mut self, key: &str, val: impl Into<Value>) -> Result<(), Error> {
        list(self.ref_mut(key)?, key)?.insert(0, val.into());
        Ok(())
    }

    pub fn shift(&mut self, key: &str) -> Result<Option<Value>, Error> {
        let items = list(self.ref_mut(key)?, key)?;
        Ok((!items.is_empty()).then(|| items.remove(0)))
    }

    /// Returns the container at `key` merged with `src`, which is either
    /// another hive key or a literal container. The hive is left unchanged.
    pub fn merge(&mut self, key: &str, src: impl Into<Merge>) -> Result<Value, Error> {
        let src = match src.into() {
            Merge::Key(other) => self.lookup(&other)?.cloned().unwrap_or_default(),
            Merge::Value(val) => val,
        };
        let base = self.ref_mut(key)?;
        if base.is_null() {
            *base = Value::map();
        }
        match (base.clone(), src) {
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::Map(mut a), Value::Map(b)) => {
                a.extend(b);
                Ok(Value::Map(a))
            }
            (base @ (Value::List(_) | Value::Map(_)), Value::Null) => Ok(base),
            _ => Err(shape(key, "container of the same shape as the merge source")),
        }
    }

    /// The whole tree.
    pub fn vars(&self) -> &Value {
        &self.vars
    }

    /// Current language lookup sequence.
    pub fn language_sequence(&self) -> &[String] {
        &self.languages
    }

    /// Drains the `Set-Cookie` header values emitted so far.
    pub fn take_cookies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.cookies)
    }

    /// Writes the session back if it was opened during this request.
    pub fn commit_session(&mut self) {
        if !self.session_active {
            return;
        }
        if let Some(id) = self.session_id.as_deref() {
            let data = self.vars.child("SESSION").cloned().unwrap_or_else(Value::map);
            self.session.commit(id, &data);
        }
    }

    /// Text of a top-level or nested key; empty if unset or invalid.
    pub(crate) fn text(&mut self, key: &str) -> String {
        self.lookup(key).ok().flatten().map(Value::to_text).unwrap_or_default()
    }

    /// Truthiness of a key; `false` if unset or invalid.
    pub(crate) fn flag(&mut self, key: &str) -> bool {
        self.lookup(key).ok().flatten().is_some_and(Value::is_truthy)
    }

    /// Id of the session opened during this request, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Opens the session named by the request's session cookie on first
    /// `SESSION` access, issuing a new cookie when the id changes.
    fn session_scope(&mut self, path: &Path) {
        if path.root != "SESSION" || self.session_active {
            return;
        }
        let name = self.session.name().to_owned();
        let incoming = self
            .vars
            .child("COOKIE")
            .and_then(|cookies| cookies.child(&name))
            .map(Value::to_text)
            .filter(|id| !id.is_empty());
        let (id, data) = self.session.start(incoming.as_deref());
        if incoming.as_deref() != Some(id.as_str()) {
            self.emit_cookie(&name, &id, None);
        }
        self.session_id = Some(id);
        self.session_active = true;
        *self.vars.slot("SESSION") = data;
    }

    fn write(&mut self, path: &Path, val: Value) {
        let mut cur = self.vars.slot(&path.root);
        for step in &path.steps {
            cur = match step {
                Step::Key(k) => cur.slot(k),
                Step::Prop(p) => cur.coerce_object().entry(p.clone()).or_default(),
            };
        }
        *cur = val;
    }

    fn remove(&mut self, path: &Path) {
        let Some((last, parents)) = path.steps.split_last() else {
            if let Value::Map(vars) = &mut self.vars {
                vars.shift_remove(&path.root);
            }
            return;
        };
        let Some(mut cur) = self.vars.child_mut(&path.root) else { return };
        for step in parents {
            let next = match step {
                Step::Key(k) => cur.child_mut(k),
                Step::Prop(p) => cur.prop_mut(p),
            };
            match next {
                Some(v) => cur = v,
                None => return,
            }
        }
        match (cur, last) {
            (Value::Map(map), Step::Key(k)) | (Value::Object(map), Step::Prop(k)) => {
                map.shift_remove(k);
            }
            (Value::List(items), Step::Key(k)) => {
                if let Some(i) = k.parse::<usize>().ok().filter(|i| *i < items.len()) {
                    items.remove(i);
                }
            }
            _ => {}
        }
    }

    fn negotiate(&mut self, code: &str) -> String {
        self.languages = locale::languages(code, &self.fallback);
        self.languages.join(",")
    }

    fn reload_lexicon(&mut self, dir: &str, ttl: u64) -> Result<(), Error> {
        let lex = locale::lexicon(dir, &self.languages);
        if lex.is_empty() {
            return Ok(());
        }
        let prefix = self.text("PREFIX");
        self.mset(lex, &prefix, ttl)
    }

    fn emit_cookie(&mut self, name: &str, value: &str, expire: Option<SystemTime>) {
        let jar = self.vars.child("JAR").cloned().unwrap_or_default();
        let mut cookie = format!("{name}={}", urlencoding::encode(value));
        let expire = expire.or_else(|| {
            jar.field("expire")
                .and_then(Value::as_int)
                .filter(|secs| *secs > 0)
                .map(|secs| horizon(SystemTime::UNIX_EPOCH, secs.unsigned_abs()))
        });
        if let Some(at) = expire {
            let max_age = at.duration_since(SystemTime::now()).map_or(0, |d| d.as_secs());
            cookie.push_str(&format!("; expires={}; Max-Age={max_age}", httpdate::fmt_http_date(at)));
        }
        let path = jar.field("path").map(Value::to_text).unwrap_or_default();
        if !path.is_empty() {
            cookie.push_str(&format!("; path={path}"));
        }
        let domain = jar.field("domain").map(Value::to_text).unwrap_or_default();
        if !domain.is_empty() {
            cookie.push_str(&format!("; domain={domain}"));
        }
        if jar.field("secure").is_some_and(Value::is_truthy) {
            cookie.push_str("; secure");
        }
        if jar.field("httponly").is_some_and(Value::is_truthy) {
            cookie.push_str("; HttpOnly");
        }
        self.cookies.push(cookie);
    }
}

fn list<'a>(slot: &'a mut Value, key: &str) -> Result<&'a mut Vec<Value>, Error> {
    if slot.is_null() {
        *slot = Value::List(Vec::new());
    }
    match slot {
        Value::List(items) => Ok(items),
        _ => Err(shape(key, "list")),
    }
}

fn shape(key: &str, expected: &'static str) -> Error {
    Error::ShapeMismatch { key: key.to_owned(), expected }
}
