//! Structural paths into the state tree.
//!
//! A [`Path`] addresses a slot from the root of a component's state. Segments are
//! compared by their string form, so `Key::Index(0)` and `Key::Name("0")` are the
//! same segment. List regions rely on this: a path built while iterating a
//! sequence matches the path produced by an array mutation on it.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Key::Name(name) => Cow::Borrowed(name.as_str()),
            Key::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Numeric view of the segment, used when the segment addresses an array.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => canonical_index(name),
        }
    }
}

/// Digits with no sign or leading zero, so the index reads back as the same text.
/// Anything else ("01", "+1") stays a name and never addresses an array element.
fn canonical_index(segment: &str) -> Option<usize> {
    let digits = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    if !digits || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    segment.parse().ok()
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Index(a), Key::Index(b)) => a == b,
            (Key::Name(a), Key::Name(b)) => a == b,
            _ => self.as_str() == other.as_str(),
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(&other.as_str())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Name(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Name(value)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Index(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Key>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn new(segments: Vec<Key>) -> Self {
        Path(segments)
    }

    /// Parse a dotted path (`"items.0.title"`). The empty string is the root.
    pub fn parse(dotted: &str) -> Self {
        let trimmed = dotted.trim();
        if trimmed.is_empty() {
            return Path::root();
        }
        Path(
            trimmed
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match canonical_index(segment) {
                    Some(index) => Key::Index(index),
                    None => Key::Name(segment.to_string()),
                })
                .collect(),
        )
    }

    pub fn segments(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    pub fn push(&mut self, key: impl Into<Key>) {
        self.0.push(key.into());
    }

    pub fn pop(&mut self) -> Option<Key> {
        self.0.pop()
    }

    pub fn child(&self, key: impl Into<Key>) -> Path {
        let mut next = self.clone();
        next.push(key);
        next
    }

    pub fn join(&self, keys: &[Key]) -> Path {
        let mut next = self.clone();
        next.0.extend(keys.iter().cloned());
        next
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Subscription key: a JSON array of the string-coerced segments.
    pub fn serialize(&self) -> String {
        let segments: Vec<Cow<'_, str>> = self.0.iter().map(Key::as_str).collect();
        serde_json::to_string(&segments).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

impl From<Vec<Key>> for Path {
    fn from(segments: Vec<Key>) -> Self {
        Path(segments)
    }
}

/// Build a [`Path`] from a list of segments: `path!["items", 0, "title"]`.
#[macro_export]
macro_rules! path {
    () => { $crate::path::Path::root() };
    ($($segment:expr),+ $(,)?) => {
        $crate::path::Path::new(vec![$($crate::path::Key::from($segment)),+])
    };
}
