//! Nearest-ancestor placeholder resolution.

use serde_json::Value;

use crate::path::{Key, Path};
use crate::store::value_at;

/// Find the nearest path at or above `scope` whose object defines `key`.
///
/// Tries `scope + key`, then drops the last scope segment and retries, ending
/// with `[key]` at the root. Returns `None` when no level defines `key`; callers
/// render the placeholder literally in that case.
pub fn resolve(root: &Value, scope: &Path, key: &str) -> Option<Path> {
    let mut candidate = scope.clone();
    loop {
        let probe = candidate.child(Key::from(key));
        if value_at(root, &probe).is_some() {
            return Some(probe);
        }
        candidate.pop()?;
    }
}

/// Like [`resolve`], but falls back to `scope + key` so a binding still has a
/// subscription target for a key that does not exist yet.
pub fn resolve_or_local(root: &Value, scope: &Path, key: &str) -> (Path, bool) {
    match resolve(root, scope, key) {
        Some(path) => (path, true),
        None => (scope.child(Key::from(key)), false),
    }
}
