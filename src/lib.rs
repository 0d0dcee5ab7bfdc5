//! # Zenith Runtime
//!
//! Reactive state, path-addressed subscriptions and template binding for
//! client-side components.
//!
//! ## Invariants
//!
//! 1. **Explicit Store**: state changes only through [`Store`]. Every mutation
//!    hands its event(s) to the [`EventScheduler`] before returning.
//!
//! 2. **One Flush Per Frame**: the scheduler asks the host for a frame once per
//!    burst and delivers the whole queue, FIFO, in a single flush. Events emitted
//!    during a flush wait for the next one.
//!
//! 3. **Exact-Path Matching**: a consumer at `["user","name"]` never fires for
//!    `["user"]` or `["user","age"]`. Element-level array events are also
//!    delivered to the owning array's consumers (list regions rely on this).
//!
//! 4. **Nearest Ancestor Wins**: a placeholder key resolves at the closest scope
//!    that defines it, falling back outward to the root. Unresolved keys render
//!    as literal text.
//!
//! 5. **Absent, Not Empty**: an attribute whose fill is empty, or whose lone
//!    placeholder is falsy, is removed.
//!
//! 6. **Teardown Releases**: removing output unsubscribes its consumers; detaching
//!    a component aborts its load and clears its registry.
//!
//! Everything is single-threaded (`Rc`/`RefCell`). Markup loads are futures; the
//! host drives frames with [`Runtime::frame`] and background work with
//! [`Runtime::settle`].

pub mod path;

mod behavior;
mod binder;
mod cache;
mod component;
mod dom;
mod error;
mod event;
mod loader;
mod options;
mod parse;
mod registry;
mod resolve;
mod scheduler;
mod store;
mod template;

#[cfg(test)]
mod binder_tests;

pub use behavior::{Behavior, BehaviorContext, BehaviorRegistry};
pub use binder::{ChildMount, TemplateBinder};
pub use cache::{compute_hash, TemplateCache};
pub use component::{Component, ComponentOps, ComponentRegistry, Runtime, Transition};
pub use dom::{Disposer, Document, NodeHooks, NodeId, NodeKind, Removal, SharedDocument};
pub use error::*;
pub use event::{ArrayOp, ChangeEvent, EventKind};
pub use loader::{DirectorySource, FragmentCache, MarkupFuture, MarkupSource, MemorySource};
pub use options::{PlaceholderSyntax, RuntimeOptions};
pub use parse::{
    is_component_tag, parse_template, AttributeIR, ElementNode, Fragment, TemplateNode, TextNode,
};
pub use path::{Key, Path};
pub use registry::{Consumer, SubscriptionId, SubscriptionRegistry};
pub use resolve::{resolve, resolve_or_local};
pub use scheduler::EventScheduler;
pub use store::{value_at, Helper, Store};
pub use template::{fill, has_placeholders, is_truthy, keys, single_placeholder, to_display, Lookup};
