//! The tagged node type the hive is built from.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One node of the hive tree.
///
/// `Map` and `Object` are both insertion-ordered; they differ only in how a
/// key path reaches into them (`a.b` / `a[b]` versus `a->b`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Self::Map(IndexMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Emptiness in the classic sense: null, `false`, `0`, `0.0`, `""`,
    /// `"0"` and empty containers.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Str(s) => s.is_empty() || s == "0",
            Self::List(items) => items.is_empty(),
            Self::Map(map) | Self::Object(map) => map.is_empty(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_empty()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Scalars rendered as text; containers and null render empty.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null | Self::List(_) | Self::Map(_) | Self::Object(_) => String::new(),
            Self::Bool(b) => if *b { "1".to_owned() } else { String::new() },
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    /// Splits a comma, semicolon or pipe separated string into trimmed parts;
    /// lists yield their items' text.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().map(Value::to_text).collect(),
            other => split(&other.to_text()),
        }
    }

    /// Reads a key out of a `Map` without going through the hive.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) | Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Turns `self` into an empty map unless it already is one.
    pub(crate) fn coerce_map(&mut self) -> &mut IndexMap<String, Value> {
        if !matches!(self, Self::Map(_)) {
            *self = Self::map();
        }
        match self {
            Self::Map(map) => map,
            _ => unreachable!("coerced to a map above"),
        }
    }

    pub(crate) fn coerce_object(&mut self) -> &mut IndexMap<String, Value> {
        if !matches!(self, Self::Object(_)) {
            *self = Self::Object(IndexMap::new());
        }
        match self {
            Self::Object(map) => map,
            _ => unreachable!("coerced to an object above"),
        }
    }

    /// Child slot addressed by a map key or list index, created on demand.
    ///
    /// A list keeps its shape while the key is an index no further than one
    /// past its end. Any other key turns the list into a map keyed by the
    /// former indices.
    pub(crate) fn slot(&mut self, key: &str) -> &mut Value {
        let index = match (&*self, key.parse::<usize>()) {
            (Self::List(items), Ok(i)) if i <= items.len() => Some(i),
            _ => None,
        };
        match (self, index) {
            (Self::List(items), Some(i)) => {
                if i == items.len() {
                    items.push(Value::Null);
                }
                &mut items[i]
            }
            (this, _) => {
                if let Self::List(items) = this {
                    let items = std::mem::take(items);
                    *this = Self::Map(
                        items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
                    );
                }
                this.coerce_map().entry(key.to_owned()).or_default()
            }
        }
    }

    pub(crate) fn child(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            Self::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub(crate) fn child_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Self::Map(map) => map.get_mut(key),
            Self::List(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
    }

    pub(crate) fn prop(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(name),
            _ => None,
        }
    }

    pub(crate) fn prop_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Self::Object(map) => map.get_mut(name),
            _ => None,
        }
    }
}

/// Splits on `,`, `;` or `|`, trimming and dropping empty parts.
pub fn split(s: &str) -> Vec<String> {
    s.split([',', ';', '|'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(_) | Self::Map(_) | Self::Object(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
            scalar => f.write_str(&scalar.to_text()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::Str(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::Str(s) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Self::Int(i) }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self { Self::Int(i64::from(i)) }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self { Self::Int(i64::try_from(i).unwrap_or(i64::MAX)) }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self { Self::Float(f) }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self { Self::List(items.into_iter().map(Into::into).collect()) }
}

impl<T: Into<Value>> From<IndexMap<String, T>> for Value {
    fn from(map: IndexMap<String, T>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> FromIterator<(String, T)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emptiness() {
        for v in [
            Value::Null,
            Value::Bool(false),
            Value::Int(0),
            Value::from(""),
            Value::from("0"),
            Value::List(vec![]),
            Value::map(),
        ] {
            assert!(v.is_empty(), "{v:?}");
        }
        assert!(!Value::from("a").is_empty());
        assert!(!Value::from(vec![1]).is_empty());
    }

    #[test]
    fn list_slot_appends_one_past_end() {
        let mut v = Value::from(vec!["a"]);
        *v.slot("1") = Value::from("b");
        assert_eq!(v, Value::from(vec!["a", "b"]));
    }

    #[test]
    fn list_slot_with_name_becomes_map() {
        let mut v = Value::from(vec!["a"]);
        *v.slot("x") = Value::from("b");
        let map = v.as_map().unwrap();
        assert_eq!(map.get("0"), Some(&Value::from("a")));
        assert_eq!(map.get("x"), Some(&Value::from("b")));
    }

    #[test]
    fn split_on_any_separator() {
        assert_eq!(split(" a, b;c|| d "), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn display_renders_containers_as_json() {
        let v: Value = [("a".to_owned(), 1)].into_iter().collect();
        assert_eq!(v.to_string(), r#"{"a":1}"#);
        assert_eq!(Value::Bool(true).to_string(), "1");
    }
}
