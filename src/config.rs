//! Startup configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Values are seeded into the hive under upper-case keys
//! (`base` becomes `BASE`, `jar.path` becomes `JAR.path`) where handlers can
//! read and change them per request.
//!
//! ```toml
//! base = "/app"
//! caseless = false
//! deny = ["10.0.0.13"]
//!
//! [jar]
//! httponly = true
//!
//! [globals]
//! site = "Example"
//!
//! [routes]
//! "GET /" = "Home->index"
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hive::Value;

/// Session cookie parameters, seeded as `JAR`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Jar {
    pub expire: i64,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub httponly: bool,
}

impl Default for Jar {
    fn default() -> Self {
        Self {
            expire: 0,
            path: "/".to_owned(),
            domain: String::new(),
            secure: false,
            httponly: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Mount point stripped from request paths and prefixed to built URLs.
    pub base: String,
    pub caseless: bool,
    /// Non-zero levels attach a stack trace to error reports.
    pub debug: u8,
    /// DNS blocklist servers queried with the reversed client address.
    pub dnsbl: Vec<String>,
    /// Addresses never checked against `dnsbl`.
    pub exempt: Vec<String>,
    /// Addresses refused outright.
    pub deny: Vec<String>,
    pub encoding: String,
    pub fallback: String,
    pub language: Option<String>,
    pub locales: String,
    /// Hive prefix dictionary entries are stored under.
    pub prefix: String,
    pub package: String,
    /// Suppresses response bodies.
    pub quiet: bool,
    /// Leaves the request body unread.
    pub raw: bool,
    pub temp: String,
    pub root: String,
    pub tz: String,
    pub xframe: String,
    /// Trailing-slash redirects use 301 instead of 302.
    pub permanent: bool,
    /// Seconds after which a mutex lock file is considered stale.
    pub max_execution_time: u64,
    pub jar: Jar,
    /// Extra hive entries, stored under their key as written.
    pub globals: IndexMap<String, Value>,
    /// Route pattern to handler descriptor.
    pub routes: IndexMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: String::new(),
            caseless: true,
            debug: 0,
            dnsbl: Vec::new(),
            exempt: Vec::new(),
            deny: Vec::new(),
            encoding: "UTF-8".to_owned(),
            fallback: "en".to_owned(),
            language: None,
            locales: "./".to_owned(),
            prefix: String::new(),
            package: env!("CARGO_PKG_NAME").to_owned(),
            quiet: false,
            raw: false,
            temp: "tmp/".to_owned(),
            root: ".".to_owned(),
            tz: "UTC".to_owned(),
            xframe: "SAMEORIGIN".to_owned(),
            permanent: false,
            max_execution_time: 30,
            jar: Jar::default(),
            globals: IndexMap::new(),
            routes: IndexMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Startup values of the hive.
    pub(crate) fn hive_defaults(&self) -> IndexMap<String, Value> {
        let strings = |items: &[String]| Value::from(items.to_vec());
        let mut out: IndexMap<String, Value> = IndexMap::new();
        out.insert("BASE".into(), self.base.as_str().into());
        out.insert("CASELESS".into(), self.caseless.into());
        out.insert("DEBUG".into(), i64::from(self.debug).into());
        out.insert("DNSBL".into(), strings(&self.dnsbl));
        out.insert("EXEMPT".into(), strings(&self.exempt));
        out.insert("DENY".into(), strings(&self.deny));
        out.insert("ENCODING".into(), self.encoding.as_str().into());
        out.insert("FALLBACK".into(), self.fallback.as_str().into());
        if let Some(language) = &self.language {
            out.insert("LANGUAGE".into(), language.as_str().into());
        }
        out.insert("LOCALES".into(), self.locales.as_str().into());
        out.insert("PREFIX".into(), self.prefix.as_str().into());
        out.insert("PACKAGE".into(), self.package.as_str().into());
        out.insert("QUIET".into(), self.quiet.into());
        out.insert("RAW".into(), self.raw.into());
        out.insert("TEMP".into(), self.temp.as_str().into());
        out.insert("ROOT".into(), self.root.as_str().into());
        out.insert("TZ".into(), self.tz.as_str().into());
        out.insert("XFRAME".into(), self.xframe.as_str().into());
        out.insert(
            "JAR".into(),
            Value::Map(IndexMap::from([
                ("expire".to_owned(), Value::Int(self.jar.expire)),
                ("path".to_owned(), self.jar.path.as_str().into()),
                ("domain".to_owned(), self.jar.domain.as_str().into()),
                ("secure".to_owned(), self.jar.secure.into()),
                ("httponly".to_owned(), self.jar.httponly.into()),
            ])),
        );
        for (key, val) in &self.globals {
            out.insert(key.clone(), val.clone());
        }
        out
    }
}
