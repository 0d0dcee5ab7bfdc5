//! Placeholder syntax utilities.
//!
//! A placeholder is a single key wrapped in `${…}` or `{…}`. There is no
//! expression language: dotted paths, calls and operators are not placeholders
//! and stay in the text untouched.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::ops::Range;

use crate::options::PlaceholderSyntax;

lazy_static! {
    /// `$` prefix captured separately so either syntax family can be filtered out.
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"(\$?)\{\s*(\w+)\s*\}").unwrap();
}

/// Result of looking a key up for [`fill`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// No scope defines the key. The placeholder text is kept.
    Unresolved,
    /// The key resolved. `None` is an undefined value and renders empty.
    Resolved(Option<Value>),
}

struct Placeholder<'a> {
    span: Range<usize>,
    key: &'a str,
}

fn placeholders(text: &str, syntax: PlaceholderSyntax) -> Vec<Placeholder<'_>> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(2)?.as_str();
            let dollar = caps.get(1).is_some_and(|m| !m.is_empty());
            let start = match (syntax, dollar) {
                (PlaceholderSyntax::Dollar, false) => return None,
                // `${a}` under brace-only syntax is a literal `$` before `{a}`
                (PlaceholderSyntax::Brace, true) => whole.start() + 1,
                _ => whole.start(),
            };
            Some(Placeholder {
                span: start..whole.end(),
                key,
            })
        })
        .collect()
}

/// Distinct keys referenced by `text`, in order of first use.
pub fn keys(text: &str, syntax: PlaceholderSyntax) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for placeholder in placeholders(text, syntax) {
        if !found.iter().any(|k| k == placeholder.key) {
            found.push(placeholder.key.to_string());
        }
    }
    found
}

pub fn has_placeholders(text: &str, syntax: PlaceholderSyntax) -> bool {
    !placeholders(text, syntax).is_empty()
}

/// Key of `text` when the whole text is exactly one placeholder.
pub fn single_placeholder(text: &str, syntax: PlaceholderSyntax) -> Option<String> {
    match placeholders(text, syntax).as_slice() {
        [only] if only.span == (0..text.len()) => Some(only.key.to_string()),
        _ => None,
    }
}

/// Replace every placeholder in `text` with the display form of its value.
pub fn fill<F>(text: &str, syntax: PlaceholderSyntax, mut lookup: F) -> String
where
    F: FnMut(&str) -> Lookup,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for placeholder in placeholders(text, syntax) {
        out.push_str(&text[last..placeholder.span.start]);
        match lookup(placeholder.key) {
            Lookup::Unresolved => out.push_str(&text[placeholder.span.clone()]),
            Lookup::Resolved(Some(value)) => out.push_str(&to_display(&value)),
            Lookup::Resolved(None) => {}
        }
        last = placeholder.span.end;
    }
    out.push_str(&text[last..]);
    out
}

/// String form used for text and attribute output.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.is_f64(), n.as_f64()) {
            // 2.0 prints as 2
            (true, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(to_display).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Falsy values: undefined, null, false, 0, NaN and the empty string.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
