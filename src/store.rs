//! Observable state tree.
//!
//! [`Store`] is the only way to mutate component state. Each mutation applies to
//! the tree and hands its event to the scheduler before the call returns, so the
//! event queue always reflects the order in which callers changed things. Reads
//! go straight to the current tree; nothing is cached, because any slot can be
//! replaced at any time.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Result, RuntimeError};
use crate::event::{ArrayOp, ChangeEvent, EventKind};
use crate::path::{Key, Path};
use crate::registry::SubscriptionRegistry;
use crate::resolve;
use crate::scheduler::EventScheduler;

/// Function-valued slot. Helpers never trigger re-rendering.
pub type Helper = Rc<dyn Fn(&Store)>;

struct StoreInner {
    root: RefCell<Value>,
    helpers: RefCell<HashMap<String, Helper>>,
    registry: Rc<SubscriptionRegistry>,
    scheduler: Rc<EventScheduler>,
}

#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.inner.root.borrow())
            .field("subscriptions", &self.inner.registry.len())
            .finish()
    }
}

/// Read the value at `path` inside `root`.
pub fn value_at<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, key| child_of(current, key))
}

fn child_of<'a>(value: &'a Value, key: &Key) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key.as_str().as_ref()),
        Value::Array(items) => key.as_index().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Widest gap a single `set` may fill with nulls past the end of an array.
pub const MAX_ARRAY_PAD: usize = 65_536;

/// Walk to `path`, creating missing objects along the way. Array segments must
/// already exist: growing an array here would skip the event its observers need.
fn slot_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Value> {
    let mut current = root;
    for key in path.segments() {
        current = match current {
            Value::Object(map) => map
                .entry(key.as_str().into_owned())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = key.as_index().ok_or_else(|| RuntimeError::NotAContainer {
                    path: path.clone(),
                })?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| RuntimeError::IndexOutOfRange {
                        path: path.clone(),
                        index,
                        len,
                    })?
            }
            _ => {
                return Err(RuntimeError::NotAContainer { path: path.clone() });
            }
        };
    }
    Ok(current)
}

fn existing_array_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Vec<Value>> {
    let mut current = root;
    for key in path.segments() {
        current = match current {
            Value::Object(map) => map.get_mut(key.as_str().as_ref()),
            Value::Array(items) => key.as_index().and_then(move |index| items.get_mut(index)),
            _ => None,
        }
        .ok_or_else(|| RuntimeError::NotAnArray { path: path.clone() })?;
    }
    match current {
        Value::Array(items) => Ok(items),
        _ => Err(RuntimeError::NotAnArray { path: path.clone() }),
    }
}

impl Store {
    pub fn new(
        root: Value,
        registry: Rc<SubscriptionRegistry>,
        scheduler: Rc<EventScheduler>,
    ) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                root: RefCell::new(root),
                helpers: RefCell::new(HashMap::new()),
                registry,
                scheduler,
            }),
        }
    }

    pub fn registry(&self) -> &Rc<SubscriptionRegistry> {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &Rc<EventScheduler> {
        &self.inner.scheduler
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn emit(&self, event: ChangeEvent) {
        trace!(path = %event.path, kind = ?event.kind, op = ?event.op, "emit");
        self.inner.scheduler.emit(&self.inner.registry, event);
    }

    /// Snapshot of the whole tree.
    pub fn root(&self) -> Value {
        self.inner.root.borrow().clone()
    }

    /// Current value at `path`, `None` when undefined.
    pub fn get(&self, path: &Path) -> Option<Value> {
        value_at(&self.inner.root.borrow(), path).cloned()
    }

    /// Borrowing read, for callers that only need to inspect the value.
    pub fn read<R>(&self, path: &Path, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(value_at(&self.inner.root.borrow(), path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read(path, |value| value.is_some())
    }

    /// Nearest path at or above `scope` that defines `key`.
    pub fn resolve(&self, scope: &Path, key: &str) -> Option<Path> {
        resolve::resolve(&self.inner.root.borrow(), scope, key)
    }

    pub fn len_at(&self, path: &Path) -> usize {
        self.read(path, |value| match value {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        })
    }

    pub fn replace_root(&self, value: Value) {
        let old = std::mem::replace(&mut *self.inner.root.borrow_mut(), value.clone());
        self.emit(ChangeEvent::new(
            EventKind::Change,
            Path::root(),
            Some(old),
            Some(value),
        ));
    }

    /// Write `value` at `path`: `Assign` if the slot was undefined, `Change` otherwise.
    pub fn set(&self, path: &Path, value: Value) -> Result<()> {
        let Some(parent_path) = path.parent() else {
            self.replace_root(value);
            return Ok(());
        };
        let key = path.last().cloned().unwrap_or_else(|| Key::from(""));

        let (old, container) = {
            let mut root = self.inner.root.borrow_mut();
            match slot_mut(&mut root, &parent_path)? {
                Value::Object(map) => (map.insert(key.as_str().into_owned(), value.clone()), None),
                Value::Array(items) => {
                    let index = key.as_index().ok_or_else(|| RuntimeError::NotAContainer {
                        path: path.clone(),
                    })?;
                    let len = items.len();
                    let old = if index < len {
                        Some(std::mem::replace(&mut items[index], value.clone()))
                    } else {
                        if index - len > MAX_ARRAY_PAD {
                            return Err(RuntimeError::IndexOutOfRange {
                                path: path.clone(),
                                index,
                                len,
                            });
                        }
                        items.resize(index, Value::Null);
                        items.push(value.clone());
                        None
                    };
                    (old, Some(parent_path))
                }
                _ => return Err(RuntimeError::NotAContainer { path: path.clone() }),
            }
        };

        let kind = if old.is_some() {
            EventKind::Change
        } else {
            EventKind::Assign
        };
        self.emit(ChangeEvent::new(kind, path.clone(), old, Some(value)).in_container(container));
        Ok(())
    }

    /// Attach a function-valued slot. No event is emitted.
    pub fn attach_helper(&self, path: &Path, helper: Helper) {
        self.inner
            .helpers
            .borrow_mut()
            .insert(path.serialize(), helper);
    }

    pub fn helper(&self, path: &Path) -> Option<Helper> {
        self.inner.helpers.borrow().get(&path.serialize()).cloned()
    }

    /// Call the helper at `path`. Returns false when there is none.
    pub fn call_helper(&self, path: &Path) -> bool {
        match self.helper(path) {
            Some(helper) => {
                helper(self);
                true
            }
            None => false,
        }
    }

    /// Remove the slot at `path`. Array elements are removed, not left as holes.
    /// Deleting an undefined slot (or the root) is a no-op.
    pub fn delete(&self, path: &Path) -> Result<Option<Value>> {
        let Some(parent_path) = path.parent() else {
            return Ok(None);
        };
        let Some(key) = path.last() else {
            return Ok(None);
        };

        let (removed, container) = {
            let mut root = self.inner.root.borrow_mut();
            let parent = parent_path
                .segments()
                .iter()
                .try_fold(&mut *root, |current, key| match current {
                    Value::Object(map) => map.get_mut(key.as_str().as_ref()),
                    Value::Array(items) => key.as_index().and_then(move |i| items.get_mut(i)),
                    _ => None,
                });
            match parent {
                Some(Value::Object(map)) => (map.remove(key.as_str().as_ref()), None),
                Some(Value::Array(items)) => match key.as_index() {
                    Some(index) if index < items.len() => {
                        (Some(items.remove(index)), Some(parent_path.clone()))
                    }
                    _ => (None, None),
                },
                _ => (None, None),
            }
        };

        if let Some(old) = &removed {
            self.emit(
                ChangeEvent::new(EventKind::Remove, path.clone(), Some(old.clone()), None)
                    .in_container(container),
            );
        }
        Ok(removed)
    }

    /// Append `items`. Emits one `Add` at the first new index. Returns the new length.
    pub fn push(&self, path: &Path, items: Vec<Value>) -> Result<usize> {
        let (start, len) = {
            let mut root = self.inner.root.borrow_mut();
            let array = existing_array_mut(&mut root, path)?;
            let start = array.len();
            array.extend(items.iter().cloned());
            (start, array.len())
        };
        if !items.is_empty() {
            self.emit_add(path, start, items, ArrayOp::Push);
        }
        Ok(len)
    }

    /// Prepend `items`. Emits one `Add` at index 0. Returns the new length.
    pub fn unshift(&self, path: &Path, items: Vec<Value>) -> Result<usize> {
        let len = {
            let mut root = self.inner.root.borrow_mut();
            let array = existing_array_mut(&mut root, path)?;
            array.splice(0..0, items.iter().cloned());
            array.len()
        };
        if !items.is_empty() {
            self.emit_add(path, 0, items, ArrayOp::Unshift);
        }
        Ok(len)
    }

    pub fn pop(&self, path: &Path) -> Result<Option<Value>> {
        let removed = {
            let mut root = self.inner.root.borrow_mut();
            let array = existing_array_mut(&mut root, path)?;
            array.pop().map(|value| (array.len(), value))
        };
        Ok(removed.map(|(index, value)| {
            self.emit_remove(path, index, value.clone(), ArrayOp::Pop);
            value
        }))
    }

    pub fn shift(&self, path: &Path) -> Result<Option<Value>> {
        let removed = {
            let mut root = self.inner.root.borrow_mut();
            let array = existing_array_mut(&mut root, path)?;
            if array.is_empty() {
                None
            } else {
                Some(array.remove(0))
            }
        };
        Ok(removed.map(|value| {
            self.emit_remove(path, 0, value.clone(), ArrayOp::Shift);
            value
        }))
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// Emits `Remove` (old = removed elements) when something was deleted, then
    /// `Add` when something was inserted; both may fire for one call. Bounds are
    /// clamped to the array.
    pub fn splice(
        &self,
        path: &Path,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let (start, removed) = {
            let mut root = self.inner.root.borrow_mut();
            let array = existing_array_mut(&mut root, path)?;
            let start = start.min(array.len());
            let end = start + delete_count.min(array.len() - start);
            let removed: Vec<Value> = array.splice(start..end, items.iter().cloned()).collect();
            (start, removed)
        };
        if !removed.is_empty() {
            self.emit_remove(path, start, Value::Array(removed.clone()), ArrayOp::Splice);
        }
        if !items.is_empty() {
            self.emit_add(path, start, items, ArrayOp::Splice);
        }
        Ok(removed)
    }

    /// Reorder in place. Emits one `Move` at the array's own path carrying the
    /// whole array before and after.
    pub fn sort_by<F>(&self, path: &Path, mut compare: F) -> Result<()>
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let (before, after) = {
            let mut root = self.inner.root.borrow_mut();
            let array = existing_array_mut(&mut root, path)?;
            let before = array.clone();
            array.sort_by(|a, b| compare(a, b));
            (before, array.clone())
        };
        self.emit(
            ChangeEvent::new(
                EventKind::Move,
                path.clone(),
                Some(Value::Array(before)),
                Some(Value::Array(after)),
            )
            .with_op(ArrayOp::Sort),
        );
        Ok(())
    }

    fn emit_add(&self, path: &Path, index: usize, items: Vec<Value>, op: ArrayOp) {
        self.emit(
            ChangeEvent::new(
                EventKind::Add,
                path.child(index),
                None,
                Some(Value::Array(items)),
            )
            .in_container(Some(path.clone()))
            .with_op(op),
        );
    }

    fn emit_remove(&self, path: &Path, index: usize, removed: Value, op: ArrayOp) {
        self.emit(
            ChangeEvent::new(EventKind::Remove, path.child(index), Some(removed), None)
                .in_container(Some(path.clone()))
                .with_op(op),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use rstest::rstest;
    use serde_json::json;
    use std::cell::Cell;

    struct Harness {
        store: Store,
        scheduler: Rc<EventScheduler>,
        events: Rc<RefCell<Vec<ChangeEvent>>>,
        registry: Rc<SubscriptionRegistry>,
    }

    impl Harness {
        fn new(root: Value) -> Self {
            let registry = Rc::new(SubscriptionRegistry::new());
            let scheduler = Rc::new(EventScheduler::new());
            let store = Store::new(root, registry.clone(), scheduler.clone());
            Self {
                store,
                scheduler,
                events: Rc::new(RefCell::new(Vec::new())),
                registry,
            }
        }

        /// Record every event delivered at `path`.
        fn watch(&self, path: &Path) {
            let events = self.events.clone();
            self.registry.subscribe_path(
                path,
                Rc::new(move |e: &ChangeEvent| events.borrow_mut().push(e.clone())),
            );
        }

        fn flushed(&self) -> Vec<ChangeEvent> {
            self.scheduler.flush();
            self.events.borrow_mut().drain(..).collect()
        }
    }

    #[test]
    fn test_assign_then_change() {
        let h = Harness::new(json!({}));
        h.watch(&path!["title"]);

        h.store.set(&path!["title"], json!("a")).unwrap();
        h.store.set(&path!["title"], json!("b")).unwrap();

        let events = h.flushed();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Assign);
        assert_eq!(events[0].old, None);
        assert_eq!(events[0].new, Some(json!("a")));
        assert_eq!(events[1].kind, EventKind::Change);
        assert_eq!(events[1].old, Some(json!("a")));
        assert_eq!(events[1].new, Some(json!("b")));
    }

    #[test]
    fn test_event_is_queued_before_set_returns() {
        let h = Harness::new(json!({ "n": 1 }));
        h.store.set(&path!["n"], json!(2)).unwrap();
        assert_eq!(h.scheduler.pending_len(), 1);
        h.store.set(&path!["n"], Value::Null).unwrap();
        assert_eq!(h.scheduler.pending_len(), 2);
    }

    #[test]
    fn test_null_over_null_is_change() {
        let h = Harness::new(json!({ "n": null }));
        h.watch(&path!["n"]);
        h.store.set(&path!["n"], Value::Null).unwrap();
        let events = h.flushed();
        assert_eq!(events[0].kind, EventKind::Change);
        assert_eq!(events[0].old, Some(Value::Null));
    }

    #[test]
    fn test_set_creates_missing_parents() {
        let h = Harness::new(json!({}));
        h.store.set(&path!["user", "name"], json!("ada")).unwrap();
        assert_eq!(h.store.get(&path!["user"]), Some(json!({ "name": "ada" })));
        assert_eq!(h.scheduler.pending_len(), 1);
    }

    #[test]
    fn test_set_below_primitive_fails_without_event() {
        let h = Harness::new(json!({ "n": 3 }));
        let err = h.store.set(&path!["n", "x"], json!(1)).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_NOT_A_CONTAINER);
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_set_array_element_names_container() {
        let h = Harness::new(json!({ "items": ["a", "b"] }));
        h.watch(&path!["items"]);
        h.store.set(&path!["items", 1], json!("z")).unwrap();
        let events = h.flushed();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, path!["items", 1]);
        assert_eq!(events[0].container, Some(path!["items"]));
    }

    #[test]
    fn test_set_pads_short_gap_with_nulls() {
        let h = Harness::new(json!({ "items": ["a"] }));
        h.store.set(&path!["items", 3], json!("d")).unwrap();
        assert_eq!(h.store.get(&path!["items"]), Some(json!(["a", null, null, "d"])));
        let events = h.flushed();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Assign);
    }

    #[rstest]
    #[case::huge(usize::MAX)]
    #[case::past_pad_limit(MAX_ARRAY_PAD + 2)]
    fn test_set_far_past_end_fails_without_event(#[case] index: usize) {
        let h = Harness::new(json!({ "items": ["a"] }));
        let err = h.store.set(&path!["items", index], json!(1)).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_INDEX_OUT_OF_RANGE);
        assert_eq!(h.store.get(&path!["items"]), Some(json!(["a"])));
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_set_through_missing_array_element_fails_without_event() {
        let h = Harness::new(json!({ "items": [] }));
        let err = h.store.set(&path!["items", 2, "n"], json!(1)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::IndexOutOfRange {
                path: path!["items", 2],
                index: 2,
                len: 0,
            }
        );
        assert_eq!(h.store.get(&path!["items"]), Some(json!([])));
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_non_canonical_digits_do_not_address_elements() {
        let h = Harness::new(json!({ "items": ["a", "b"] }));
        assert_eq!(h.store.get(&path!["items", "01"]), None);
        let err = h.store.set(&path!["items", "01"], json!("z")).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_NOT_A_CONTAINER);
        assert_eq!(h.store.get(&path!["items"]), Some(json!(["a", "b"])));
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_helpers_do_not_emit() {
        let h = Harness::new(json!({}));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        h.store.attach_helper(
            &path!["increment"],
            Rc::new(move |_store: &Store| counter.set(counter.get() + 1)),
        );
        assert_eq!(h.scheduler.pending_len(), 0);
        assert!(h.store.call_helper(&path!["increment"]));
        assert!(!h.store.call_helper(&path!["missing"]));
        assert_eq!(calls.get(), 1);
        assert_eq!(h.store.get(&path!["increment"]), None);
    }

    #[test]
    fn test_delete_emits_removed_value() {
        let h = Harness::new(json!({ "user": { "name": "ada", "age": 36 } }));
        h.watch(&path!["user", "age"]);
        let removed = h.store.delete(&path!["user", "age"]).unwrap();
        assert_eq!(removed, Some(json!(36)));

        let events = h.flushed();
        assert_eq!(events[0].kind, EventKind::Remove);
        assert_eq!(events[0].old, Some(json!(36)));
        assert_eq!(events[0].new, None);
    }

    #[test]
    fn test_delete_missing_is_silent() {
        let h = Harness::new(json!({}));
        assert_eq!(h.store.delete(&path!["nope"]).unwrap(), None);
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_push_emits_single_add_at_first_index() {
        let h = Harness::new(json!({ "items": ["a"] }));
        h.watch(&path!["items", 1]);
        let len = h.store.push(&path!["items"], vec![json!("b"), json!("c")]).unwrap();
        assert_eq!(len, 3);

        let events = h.flushed();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Add);
        assert_eq!(events[0].new, Some(json!(["b", "c"])));
        assert_eq!(events[0].op, Some(ArrayOp::Push));
        assert_eq!(events[0].index(), Some(1));
    }

    #[test]
    fn test_unshift_adds_at_zero() {
        let h = Harness::new(json!({ "items": ["b"] }));
        h.watch(&path!["items"]);
        h.store.unshift(&path!["items"], vec![json!("a")]).unwrap();
        assert_eq!(h.store.get(&path!["items"]), Some(json!(["a", "b"])));
        let events = h.flushed();
        assert_eq!(events[0].path, path!["items", 0]);
        assert_eq!(events[0].kind, EventKind::Add);
    }

    #[rstest]
    #[case::pop(true, 2, "c")]
    #[case::shift(false, 0, "a")]
    fn test_pop_and_shift_remove_at_vacated_index(
        #[case] pop: bool,
        #[case] index: usize,
        #[case] value: &str,
    ) {
        let h = Harness::new(json!({ "items": ["a", "b", "c"] }));
        h.watch(&path!["items"]);
        let removed = if pop {
            h.store.pop(&path!["items"])
        } else {
            h.store.shift(&path!["items"])
        }
        .unwrap();
        assert_eq!(removed, Some(json!(value)));

        let events = h.flushed();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Remove);
        assert_eq!(events[0].path, path!["items", index]);
        assert_eq!(events[0].old, Some(json!(value)));
    }

    #[test]
    fn test_pop_empty_is_silent() {
        let h = Harness::new(json!({ "items": [] }));
        assert_eq!(h.store.pop(&path!["items"]).unwrap(), None);
        assert_eq!(h.store.shift(&path!["items"]).unwrap(), None);
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[rstest]
    #[case::delete_and_insert(1, 1, vec![json!("x")], vec![EventKind::Remove, EventKind::Add])]
    #[case::delete_only(0, 2, vec![], vec![EventKind::Remove])]
    #[case::insert_only(3, 0, vec![json!("x")], vec![EventKind::Add])]
    #[case::nothing(1, 0, vec![], vec![])]
    fn test_splice_events(
        #[case] start: usize,
        #[case] delete_count: usize,
        #[case] items: Vec<Value>,
        #[case] expected: Vec<EventKind>,
    ) {
        let h = Harness::new(json!({ "items": ["a", "b", "c"] }));
        h.watch(&path!["items"]);
        h.store.splice(&path!["items"], start, delete_count, items).unwrap();
        let kinds: Vec<EventKind> = h.flushed().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn test_splice_clamps_and_reports_removed() {
        let h = Harness::new(json!({ "items": ["a", "b", "c"] }));
        h.watch(&path!["items"]);
        let removed = h
            .store
            .splice(&path!["items"], 2, 10, vec![json!("z")])
            .unwrap();
        assert_eq!(removed, vec![json!("c")]);
        assert_eq!(h.store.get(&path!["items"]), Some(json!(["a", "b", "z"])));

        let events = h.flushed();
        assert_eq!(events[0].path, path!["items", 2]);
        assert_eq!(events[0].old, Some(json!(["c"])));
        assert_eq!(events[1].new, Some(json!(["z"])));
    }

    #[test]
    fn test_sort_emits_move_with_snapshots() {
        let h = Harness::new(json!({ "items": [3, 1, 2] }));
        h.watch(&path!["items"]);
        h.store
            .sort_by(&path!["items"], |a, b| {
                a.as_i64().unwrap_or_default().cmp(&b.as_i64().unwrap_or_default())
            })
            .unwrap();

        let events = h.flushed();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Move);
        assert_eq!(events[0].path, path!["items"]);
        assert_eq!(events[0].old, Some(json!([3, 1, 2])));
        assert_eq!(events[0].new, Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_array_ops_on_non_array() {
        let h = Harness::new(json!({ "items": { "a": 1 } }));
        let err = h.store.push(&path!["items"], vec![json!(1)]).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_NOT_AN_ARRAY);
        assert!(h.store.pop(&path!["missing"]).is_err());
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_reads_are_never_stale() {
        let h = Harness::new(json!({ "user": { "name": "ada" } }));
        let before = h.store.get(&path!["user"]).unwrap();
        h.store
            .set(&path!["user"], json!({ "name": "grace" }))
            .unwrap();
        assert_eq!(before, json!({ "name": "ada" }));
        assert_eq!(h.store.get(&path!["user", "name"]), Some(json!("grace")));
    }
}
