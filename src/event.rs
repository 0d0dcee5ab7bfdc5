use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// First write to an absent slot.
    Assign,
    /// Overwrite of a present slot.
    Change,
    /// Deletion, or an element leaving an array.
    Remove,
    /// Elements entering an array.
    Add,
    /// Array reorder. Carries whole before/after snapshots.
    Move,
}

/// Array operation that produced an event, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayOp {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub path: Path,
    /// `None` means the slot was undefined.
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// The owning array when `path` addresses one of its elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<ArrayOp>,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, path: Path, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            kind,
            path,
            old,
            new,
            container: None,
            op: None,
        }
    }

    pub fn in_container(mut self, container: Option<Path>) -> Self {
        self.container = container;
        self
    }

    pub fn with_op(mut self, op: ArrayOp) -> Self {
        self.op = Some(op);
        self
    }

    /// Index addressed within `container`, for element-level events.
    pub fn index(&self) -> Option<usize> {
        self.container.as_ref()?;
        self.path.last().and_then(|key| key.as_index())
    }
}
