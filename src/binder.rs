//! Template binding.
//!
//! [`TemplateBinder::bind`] walks a template once, creates output nodes in the
//! shared [`Document`](crate::dom::Document) and registers consumers that patch
//! exactly the node they belong to when their path changes:
//!
//! - text with placeholders re-fills its node;
//! - attributes with placeholders re-fill, or are removed when the fill is
//!   empty or a lone resolved placeholder is falsy;
//! - elements marked `for="key"` become list regions over the resolved sequence;
//! - elements marked `in="key"` bind their subtree one level deeper;
//! - hyphenated custom elements are left as empty hosts and reported as
//!   [`ChildMount`]s for the owning component to fill.
//!
//! Keys resolve to the nearest ancestor scope that defines them. Every path a
//! binding reads is fixed at bind time, so a consumer never searches again.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};

use crate::component::ComponentOps;
use crate::dom::{NodeHooks, NodeId, Removal, SharedDocument};
use crate::event::{ArrayOp, ChangeEvent, EventKind};
use crate::options::RuntimeOptions;
use crate::parse::{is_component_tag, ElementNode, TemplateNode};
use crate::path::{Key, Path};
use crate::registry::{Consumer, SubscriptionId};
use crate::resolve::resolve_or_local;
use crate::store::Store;
use crate::template::{self, Lookup};

/// A component host found while binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildMount {
    pub host: NodeId,
    pub tag: String,
    pub scope: Path,
    /// Parent state slice named by the host's state attribute.
    pub state_path: Option<Path>,
}

enum MountSink {
    Collect(Vec<ChildMount>),
    Forward(Rc<dyn Fn(ChildMount)>),
}

/// A placeholder key and the path it was bound to.
#[derive(Debug, Clone)]
struct Target {
    key: String,
    path: Path,
    resolved: bool,
}

struct Region {
    anchor: NodeId,
    parent: NodeId,
    key: String,
    scope: Path,
    item: ElementNode,
    sequence: RefCell<Path>,
    subscription: RefCell<Option<SubscriptionId>>,
    clones: RefCell<Vec<NodeId>>,
}

struct BinderInner {
    document: SharedDocument,
    store: Store,
    options: Rc<RuntimeOptions>,
    component: Option<Weak<dyn ComponentOps>>,
    mounts: RefCell<MountSink>,
}

#[derive(Clone)]
pub struct TemplateBinder {
    inner: Rc<BinderInner>,
}

impl TemplateBinder {
    pub fn new(document: SharedDocument, store: Store, options: Rc<RuntimeOptions>) -> Self {
        Self::with_component(document, store, options, None)
    }

    /// Binder whose nodes carry hooks into `component`.
    pub fn with_component(
        document: SharedDocument,
        store: Store,
        options: Rc<RuntimeOptions>,
        component: Option<Weak<dyn ComponentOps>>,
    ) -> Self {
        Self {
            inner: Rc::new(BinderInner {
                document,
                store,
                options,
                component,
                mounts: RefCell::new(MountSink::Collect(Vec::new())),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn document(&self) -> &SharedDocument {
        &self.inner.document
    }

    /// Bind `node` as the last child of `parent` at `scope`. Returns the
    /// created node, or the region anchor for a list region.
    pub fn bind(&self, node: &TemplateNode, parent: NodeId, scope: &Path) -> NodeId {
        self.inner.bind_node(node, parent, scope, None)
    }

    /// Remove `node` and release everything bound beneath it.
    pub fn teardown(&self, node: NodeId) -> usize {
        let removal = self.inner.document.borrow_mut().remove(node);
        removal.release()
    }

    /// Child mounts collected since the last call.
    pub fn take_mounts(&self) -> Vec<ChildMount> {
        match &mut *self.inner.mounts.borrow_mut() {
            MountSink::Collect(mounts) => std::mem::take(mounts),
            MountSink::Forward(_) => Vec::new(),
        }
    }

    /// Hand later mounts (from region rebuilds) straight to `sink`.
    pub fn forward_mounts<F>(&self, sink: F)
    where
        F: Fn(ChildMount) + 'static,
    {
        *self.inner.mounts.borrow_mut() = MountSink::Forward(Rc::new(sink));
    }
}

impl BinderInner {
    fn bind_node(
        self: &Rc<Self>,
        node: &TemplateNode,
        parent: NodeId,
        scope: &Path,
        before: Option<NodeId>,
    ) -> NodeId {
        match node {
            TemplateNode::Element(element) => self.bind_element(element, parent, scope, before),
            TemplateNode::Text(text) => self.bind_text(&text.value, parent, scope, before),
        }
    }

    fn insert(&self, id: NodeId, parent: NodeId, before: Option<NodeId>) {
        self.document.borrow_mut().insert_before(parent, id, before);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ELEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn bind_element(
        self: &Rc<Self>,
        element: &ElementNode,
        parent: NodeId,
        scope: &Path,
        before: Option<NodeId>,
    ) -> NodeId {
        let options = self.options.clone();
        if !options.is_label_like(&element.tag) {
            if let Some(key) = element.attribute(&options.for_attribute) {
                return self.bind_region(element, key.trim(), parent, scope, before);
            }
        }

        let scope = match element.attribute(&options.in_attribute) {
            Some(key) => scope.child(Key::from(key.trim())),
            None => scope.clone(),
        };

        let id = {
            let mut doc = self.document.borrow_mut();
            let id = doc.create_element(&element.tag);
            doc.insert_before(parent, id, before);
            doc.set_hooks(id, NodeHooks::new(self.store.clone(), self.component.clone()));
            id
        };

        for attribute in &element.attributes {
            if options.is_directive(&element.tag, &attribute.name) {
                continue;
            }
            if template::has_placeholders(&attribute.value, options.syntax) {
                self.bind_attribute(id, &attribute.name, &attribute.value, &scope);
            } else {
                self.document
                    .borrow_mut()
                    .set_attribute(id, &attribute.name, attribute.value.as_str());
            }
        }

        if is_component_tag(&element.tag) {
            let state_path = element
                .attribute(&options.state_attribute)
                .map(|slice| self.resolve_dotted(slice, &scope));
            self.report_mount(ChildMount {
                host: id,
                tag: element.tag.clone(),
                scope,
                state_path,
            });
            return id;
        }

        for child in &element.children {
            self.bind_node(child, id, &scope, None);
        }
        id
    }

    fn report_mount(&self, mount: ChildMount) {
        trace!(tag = %mount.tag, host = %mount.host, "child mount");
        let forward = match &mut *self.mounts.borrow_mut() {
            MountSink::Collect(mounts) => {
                mounts.push(mount);
                return;
            }
            MountSink::Forward(sink) => sink.clone(),
        };
        forward(mount);
    }

    /// First segment resolves by ancestor lookup, the rest is taken as written.
    fn resolve_dotted(&self, dotted: &str, scope: &Path) -> Path {
        let segments = Path::parse(dotted);
        let Some((first, rest)) = segments.segments().split_first() else {
            return scope.clone();
        };
        let (base, _) = self.resolve(scope, &first.as_str());
        base.join(rest)
    }

    fn resolve(&self, scope: &Path, key: &str) -> (Path, bool) {
        self.store.read(&Path::root(), |root| match root {
            Some(root) => resolve_or_local(root, scope, key),
            None => (scope.child(Key::from(key)), false),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TEXT & ATTRIBUTES
    // ═══════════════════════════════════════════════════════════════════════════

    fn targets(&self, text: &str, scope: &Path) -> Vec<Target> {
        template::keys(text, self.options.syntax)
            .into_iter()
            .map(|key| {
                let (path, resolved) = self.resolve(scope, &key);
                Target {
                    key,
                    path,
                    resolved,
                }
            })
            .collect()
    }

    fn render(&self, text: &str, targets: &[Target]) -> String {
        template::fill(text, self.options.syntax, |key| {
            let Some(target) = targets.iter().find(|t| t.key == key) else {
                return Lookup::Unresolved;
            };
            match self.store.get(&target.path) {
                Some(value) => Lookup::Resolved(Some(value)),
                None if target.resolved => Lookup::Resolved(None),
                None => Lookup::Unresolved,
            }
        })
    }

    /// Register `consumer` for every target, grouped by the scope each key
    /// resolved under, and record the ids on `node`.
    fn subscribe(&self, node: NodeId, targets: &[Target], consumer: Consumer) {
        let mut by_scope: BTreeMap<Path, Vec<Key>> = BTreeMap::new();
        for target in targets {
            if let (Some(scope), Some(key)) = (target.path.parent(), target.path.last()) {
                let keys = by_scope.entry(scope).or_default();
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        let registry = self.store.registry();
        let mut doc = self.document.borrow_mut();
        for (scope, keys) in by_scope {
            for id in registry.subscribe(&scope, &keys, consumer.clone()) {
                doc.add_subscription(node, registry, id);
            }
        }
    }

    fn bind_text(
        self: &Rc<Self>,
        text: &str,
        parent: NodeId,
        scope: &Path,
        before: Option<NodeId>,
    ) -> NodeId {
        if !template::has_placeholders(text, self.options.syntax) {
            let id = self.document.borrow_mut().create_text(text);
            self.insert(id, parent, before);
            return id;
        }

        let targets = self.targets(text, scope);
        let id = self
            .document
            .borrow_mut()
            .create_text(self.render(text, &targets));
        self.insert(id, parent, before);

        let weak = Rc::downgrade(self);
        let template = text.to_string();
        let captured = targets.clone();
        let consumer: Consumer = Rc::new(move |_event: &ChangeEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let filled = inner.render(&template, &captured);
            inner.document.borrow_mut().set_text(id, filled);
        });
        self.subscribe(id, &targets, consumer);
        id
    }

    fn bind_attribute(self: &Rc<Self>, node: NodeId, name: &str, value: &str, scope: &Path) {
        let targets = self.targets(value, scope);
        let single = template::single_placeholder(value, self.options.syntax);
        self.apply_attribute(node, name, value, &targets, single.as_deref());

        let weak = Rc::downgrade(self);
        let name = name.to_string();
        let template = value.to_string();
        let captured = targets.clone();
        let consumer: Consumer = Rc::new(move |_event: &ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_attribute(node, &name, &template, &captured, single.as_deref());
            }
        });
        self.subscribe(node, &targets, consumer);
    }

    /// Absence, not an empty string, represents "no value".
    fn apply_attribute(
        &self,
        node: NodeId,
        name: &str,
        template: &str,
        targets: &[Target],
        single: Option<&str>,
    ) {
        let filled = self.render(template, targets);
        // an unresolved lone placeholder keeps its literal text, like text nodes
        let falsy_single = single
            .and_then(|key| targets.iter().find(|t| t.key == key))
            .is_some_and(|target| {
                target.resolved && !template::is_truthy(self.store.get(&target.path).as_ref())
            });

        let mut doc = self.document.borrow_mut();
        if filled.is_empty() || falsy_single {
            doc.remove_attribute(node, name);
        } else {
            doc.set_attribute(node, name, filled);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIST REGIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn bind_region(
        self: &Rc<Self>,
        element: &ElementNode,
        key: &str,
        parent: NodeId,
        scope: &Path,
        before: Option<NodeId>,
    ) -> NodeId {
        let anchor = self
            .document
            .borrow_mut()
            .create_anchor(format!("{}:{}", self.options.for_attribute, key));
        self.insert(anchor, parent, before);

        let (sequence, _) = self.resolve(scope, key);
        let region = Rc::new(Region {
            anchor,
            parent,
            key: key.to_string(),
            scope: scope.clone(),
            item: element.without_attribute(&self.options.for_attribute),
            sequence: RefCell::new(sequence),
            subscription: RefCell::new(None),
            clones: RefCell::new(Vec::new()),
        });

        let length = self.store.len_at(&region.sequence.borrow());
        for index in 0..length {
            self.bind_item(&region, index, None);
        }
        self.subscribe_region(&region);

        // clones are siblings of the anchor, so removing the anchor alone must
        // take them along. The region consumer is unsubscribed before disposers
        // run, so the disposer owns the region.
        let weak_inner = Rc::downgrade(self);
        let owned = region.clone();
        self.document.borrow_mut().add_disposer(
            anchor,
            Box::new(move || {
                if let Some(inner) = weak_inner.upgrade() {
                    inner.clear_region(&owned).release();
                }
            }),
        );
        anchor
    }

    fn subscribe_region(self: &Rc<Self>, region: &Rc<Region>) {
        let weak = Rc::downgrade(self);
        let captured = region.clone();
        let consumer: Consumer = Rc::new(move |event: &ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_region_event(&captured, event);
            }
        });

        let registry = self.store.registry();
        if let Some(previous) = region.subscription.borrow_mut().take() {
            registry.unsubscribe(previous);
        }
        let id = registry.subscribe_path(&region.sequence.borrow(), consumer);
        *region.subscription.borrow_mut() = Some(id);
        self.document
            .borrow_mut()
            .add_subscription(region.anchor, registry, id);
    }

    /// Bind the clone for `index` before `before`, or before the anchor.
    fn bind_item(self: &Rc<Self>, region: &Rc<Region>, index: usize, before: Option<NodeId>) -> NodeId {
        let scope = region.sequence.borrow().child(index);
        let id = self.bind_element(
            &region.item,
            region.parent,
            &scope,
            Some(before.unwrap_or(region.anchor)),
        );
        let mut clones = region.clones.borrow_mut();
        let position = before
            .and_then(|b| clones.iter().position(|c| *c == b))
            .unwrap_or(clones.len());
        clones.insert(position, id);
        id
    }

    fn clear_region(&self, region: &Region) -> Removal {
        let clones = std::mem::take(&mut *region.clones.borrow_mut());
        let mut doc = self.document.borrow_mut();
        let mut removal = Removal::default();
        for clone in clones {
            removal.merge(doc.remove(clone));
        }
        removal
    }

    fn on_region_event(self: &Rc<Self>, region: &Rc<Region>, event: &ChangeEvent) {
        if !self.document.borrow().contains(region.anchor) {
            return;
        }
        let sequence = region.sequence.borrow().clone();
        let length = self.store.len_at(&sequence);
        let rendered = region.clones.borrow().len();

        match (event.kind, event.op, event.index()) {
            // tail append onto an intact prefix
            (EventKind::Add, Some(ArrayOp::Push), Some(start)) if rendered == start => {
                let added = match &event.new {
                    Some(Value::Array(items)) => items.len(),
                    _ => 0,
                };
                for index in start..(start + added).min(length) {
                    self.bind_item(region, index, None);
                }
                trace!(key = %region.key, added, "region append");
            }
            // tail removal: earlier events in this flush already patched the prefix
            (EventKind::Remove, Some(ArrayOp::Pop), Some(_)) if rendered >= length => {
                let trailing = region.clones.borrow_mut().split_off(length);
                let mut removal = Removal::default();
                {
                    let mut doc = self.document.borrow_mut();
                    for clone in trailing {
                        removal.merge(doc.remove(clone));
                    }
                }
                let released = removal.release();
                trace!(key = %region.key, length, released, "region truncate");
            }
            // element replaced in place
            (EventKind::Change, None, Some(index)) if index < rendered && rendered == length => {
                let old = region.clones.borrow_mut().remove(index);
                let next = region.clones.borrow().get(index).copied();
                let removal = self.document.borrow_mut().remove(old);
                removal.release();
                self.bind_item(region, index, next);
                trace!(key = %region.key, index, "region replace item");
            }
            _ => self.rebuild_region(region),
        }
    }

    /// Tear down every clone and regenerate from the current sequence.
    fn rebuild_region(self: &Rc<Self>, region: &Rc<Region>) {
        self.clear_region(region).release();

        let (sequence, _) = self.resolve(&region.scope, &region.key);
        if sequence != *region.sequence.borrow() {
            *region.sequence.borrow_mut() = sequence;
            self.subscribe_region(region);
        }

        let length = self.store.len_at(&region.sequence.borrow());
        for index in 0..length {
            self.bind_item(region, index, None);
        }
        debug!(key = %region.key, sequence = %region.sequence.borrow(), length, "region rebuilt");
    }
}
