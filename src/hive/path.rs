//! Hive key grammar.
//!
//! A key is split left to right into access steps:
//!
//! | Form          | Step                  |
//! |---------------|-----------------------|
//! | `a.b`         | map key `b`           |
//! | `a[b]`, `a['b']`, `a["b"]` | map key (or list index) `b` |
//! | `a->b`        | object property `b`   |
//!
//! The first step names a top-level hive entry and must be an identifier.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

static DELIMITER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[ \t]*['"]?(.+?)['"]?[ \t]*\]|(->)|\."#).expect("static regex")
});

static IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").expect("static regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Key(String),
    Prop(String),
}

impl Step {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Key(k) | Self::Prop(k) => k,
        }
    }
}

/// A parsed hive key: the top-level name plus the steps below it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Path {
    pub(crate) root: String,
    pub(crate) steps: Vec<Step>,
}

impl Path {
    pub(crate) fn parse(key: &str) -> Result<Self, Error> {
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in DELIMITER.captures_iter(key) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            if whole.start > last {
                parts.push(Part::Text(&key[last..whole.start]));
            }
            if let Some(inner) = caps.get(1) {
                parts.push(Part::Text(inner.as_str()));
            } else if caps.get(2).is_some() {
                parts.push(Part::Arrow);
            }
            last = whole.end;
        }
        if last < key.len() {
            parts.push(Part::Text(&key[last..]));
        }

        let mut steps = Vec::new();
        let mut object = false;
        for part in parts {
            match part {
                Part::Arrow => object = true,
                Part::Text(text) if object => {
                    object = false;
                    steps.push(Step::Prop(text.to_owned()));
                }
                Part::Text(text) => steps.push(Step::Key(text.to_owned())),
            }
        }

        let mut steps = steps.into_iter();
        let root = match steps.next() {
            Some(Step::Key(root)) if root == "SESSION" || IDENT.is_match(&root) => root,
            _ => return Err(Error::InvalidKey(key.to_owned())),
        };
        Ok(Self { root, steps: steps.collect() })
    }

    pub(crate) fn is_bare(&self) -> bool {
        self.steps.is_empty()
    }
}

enum Part<'a> {
    Text(&'a str),
    Arrow,
}
