//! Language negotiation, dictionary loading and message templates.
//!
//! These are the hooks the hive fires when `LANGUAGE`, `FALLBACK` or
//! `LOCALES` change. Number, currency and date rendering are left to the
//! application.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use tracing::debug;

use super::value::Value;

static LANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\w{2})(?:-(\w{2}))?\b").expect("static regex"));

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\s*(\d+)\s*(?:,\s*(\w+)\s*(?:,\s*((?:[^{}]|\{[^{}]*\})*))?)?\}")
        .expect("static regex")
});

static PLURAL_ARM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s+\{\s*(.*?)\s*\}").expect("static regex"));

/// Builds the language lookup sequence for an `Accept-Language` style list.
///
/// Quality weights are ignored; `fallback` is appended last. Every specific
/// tag (`en-US`) is followed by its generic form (`en`). Duplicates keep
/// their first position.
pub fn languages(code: &str, fallback: &str) -> Vec<String> {
    let mut items: Vec<&str> = code
        .split(',')
        .map(|item| item.split(';').next().unwrap_or("").trim())
        .filter(|item| !item.is_empty())
        .collect();
    items.push(fallback);

    let mut out: Vec<String> = Vec::new();
    for item in items {
        let Some(caps) = LANG.captures(item) else { continue };
        let generic = caps[1].to_ascii_lowercase();
        if let Some(region) = caps.get(2) {
            out.push(format!("{generic}-{}", region.as_str().to_ascii_uppercase()));
        }
        out.push(generic);
    }

    let mut seen = Vec::with_capacity(out.len());
    for lang in out {
        if !seen.contains(&lang) {
            seen.push(lang);
        }
    }
    seen
}

/// Loads `<dir><lang>.ini` for each language in order. Earlier languages win.
pub fn lexicon(dir: &str, languages: &[String]) -> IndexMap<String, String> {
    let mut lex = IndexMap::new();
    for lang in languages {
        let file = format!("{dir}{lang}.ini");
        let Ok(text) = fs::read_to_string(Path::new(&file)) else { continue };
        debug!(file = %file, "loading dictionary");
        for (key, val) in parse_ini(&text) {
            lex.entry(key).or_insert(val);
        }
    }
    lex
}

fn parse_ini(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(String, String)> = None;
    for line in text.lines() {
        if let Some((key, mut val)) = pending.take() {
            let (more, cont) = continuation(line.trim());
            val.push('\n');
            val.push_str(more);
            if cont {
                pending = Some((key, val));
            } else {
                out.push((key, val));
            }
            continue;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('[') {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else { continue };
        let (val, cont) = continuation(val.trim());
        let entry = (key.trim().to_owned(), val.to_owned());
        if cont {
            pending = Some(entry);
        } else {
            out.push(entry);
        }
    }
    out.extend(pending);
    out.into_iter()
        .map(|(k, v)| (k, v.replace('"', "").trim().to_owned()))
        .collect()
}

fn continuation(val: &str) -> (&str, bool) {
    match val.strip_suffix('\\') {
        Some(head) => (head.trim_end(), true),
        None => (val, false),
    }
}

/// Substitutes `{n}` placeholders with `args[n]`.
///
/// `{n,plural,zero {..} one {..} two {..} other {..}}` picks an arm by the
/// argument's value, with `#` standing for the number. Placeholders without a
/// matching argument are left as written.
pub fn format(template: &str, args: &[Value]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = caps[0].to_owned();
            let Some(arg) = caps[1].parse::<usize>().ok().and_then(|i| args.get(i)) else {
                return whole;
            };
            match caps.get(2).map(|m| m.as_str()) {
                None => arg.to_text(),
                Some("plural") => plural(arg, caps.get(3).map_or("", |m| m.as_str())),
                Some(_) => arg.to_text(),
            }
        })
        .into_owned()
}

fn plural(arg: &Value, arms: &str) -> String {
    let n = arg.as_int().unwrap_or(0);
    let ord = match n {
        0 => Some("zero"),
        1 => Some("one"),
        2 => Some("two"),
        _ => None,
    };
    for caps in PLURAL_ARM.captures_iter(arms) {
        let tag = &caps[1];
        if Some(tag) == ord || tag == "other" {
            return caps[2].replace('#', &n.to_string());
        }
    }
    arg.to_text()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_specific_then_generic() {
        assert_eq!(languages("en-us,fr;q=0.8", "en"), vec!["en-US", "en", "fr"]);
        assert_eq!(languages("", "de"), vec!["de"]);
    }

    #[test]
    fn positional_placeholders() {
        let out = format("{0} has {1} items {2}", &[Value::from("cart"), Value::Int(3)]);
        assert_eq!(out, "cart has 3 items {2}");
    }

    #[test]
    fn plural_arms() {
        let tpl = "{0, plural, zero {no apples}, one {one apple}, other {# apples}}";
        assert_eq!(format(tpl, &[Value::Int(0)]), "no apples");
        assert_eq!(format(tpl, &[Value::Int(1)]), "one apple");
        assert_eq!(format(tpl, &[Value::Int(7)]), "7 apples");
    }

    #[test]
    fn loads_first_language_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en.ini"), "greet = Hello\nbye = Bye\n").unwrap();
        fs::write(dir.path().join("fr.ini"), "; comment\ngreet = \"Bonjour\"\n").unwrap();
        let base = format!("{}/", dir.path().display());
        let lex = lexicon(&base, &["fr".to_owned(), "en".to_owned()]);
        assert_eq!(lex.get("greet").map(String::as_str), Some("Bonjour"));
        assert_eq!(lex.get("bye").map(String::as_str), Some("Bye"));
    }

    #[test]
    fn ini_continuation_lines() {
        let parsed = parse_ini("long = first \\\n second\n");
        assert_eq!(parsed, vec![("long".to_owned(), "first\nsecond".to_owned())]);
    }
}
