//! Output node tree.
//!
//! Bound output lives in a [`Document`] arena addressed by [`NodeId`]. Ids are
//! never reused, so a stale id held by a consumer simply stops matching a node
//! once its subtree is removed. Each node records the subscriptions and
//! disposers that keep it live; [`Document::remove`] hands those back as a
//! [`Removal`] to be released after the document borrow is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::component::{ComponentOps, Transition};
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::store::Store;

pub type SharedDocument = Rc<RefCell<Document>>;

/// Cleanup run when a node is removed, after the document is released.
pub type Disposer = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    /// Invisible position marker for a list region.
    Anchor(String),
}

/// References injected into every bound element.
#[derive(Clone)]
pub struct NodeHooks {
    state: Store,
    component: Option<Weak<dyn ComponentOps>>,
}

impl NodeHooks {
    pub fn new(state: Store, component: Option<Weak<dyn ComponentOps>>) -> Self {
        Self { state, component }
    }

    /// Root state of the owning component.
    pub fn state(&self) -> &Store {
        &self.state
    }

    fn ops(&self) -> Option<Rc<dyn ComponentOps>> {
        self.component.as_ref().and_then(Weak::upgrade)
    }

    pub fn component_key(&self) -> Option<String> {
        self.ops().map(|ops| ops.key())
    }

    pub fn open(&self, tag: &str) -> Option<Transition> {
        self.ops()?.open(tag)
    }

    pub fn replace(&self, tag: &str) -> Option<Transition> {
        self.ops()?.replace(tag)
    }
}

impl fmt::Debug for NodeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHooks")
            .field("component", &self.component_key())
            .finish()
    }
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hooks: Option<NodeHooks>,
    subscriptions: Vec<(Weak<SubscriptionRegistry>, SubscriptionId)>,
    disposers: Vec<Disposer>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            hooks: None,
            subscriptions: Vec::new(),
            disposers: Vec::new(),
        }
    }
}

/// Subscriptions and disposers collected from a removed subtree.
#[must_use = "a removal must be released to unsubscribe its consumers"]
#[derive(Default)]
pub struct Removal {
    subscriptions: Vec<(Weak<SubscriptionRegistry>, SubscriptionId)>,
    disposers: Vec<Disposer>,
    nodes: usize,
}

impl Removal {
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn merge(&mut self, other: Removal) {
        self.subscriptions.extend(other.subscriptions);
        self.disposers.extend(other.disposers);
        self.nodes += other.nodes;
    }

    /// Unsubscribe every consumer, then run disposers in removal order.
    /// Must be called with no outstanding borrow of the document.
    pub fn release(self) -> usize {
        let mut released = 0;
        for (registry, id) in self.subscriptions {
            if let Some(registry) = registry.upgrade() {
                if registry.unsubscribe(id) {
                    released += 1;
                }
            }
        }
        for dispose in self.disposers {
            dispose();
        }
        released
    }
}

pub struct Document {
    nodes: Vec<Option<Node>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("live", &self.live_count())
            .field("html", &self.to_html(self.root()))
            .finish()
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::new(NodeKind::Root))],
        }
    }

    pub fn shared() -> SharedDocument {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(kind)));
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create(NodeKind::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.create(NodeKind::Text(text.into()))
    }

    pub fn create_anchor(&mut self, label: impl Into<String>) -> NodeId {
        self.create(NodeKind::Anchor(label.into()))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|node| &node.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STRUCTURE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Unlink `id` from its parent without freeing it.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|child| *child != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    /// Insert `child` under `parent` before `reference`, or last when the
    /// reference is `None` or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            let position = reference
                .and_then(|r| node.children.iter().position(|c| *c == r))
                .unwrap_or(node.children.len());
            node.children.insert(position, child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Free `id` and its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Removal {
        let mut removal = Removal::default();
        if id == self.root() || !self.contains(id) {
            return removal;
        }
        self.detach(id);

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            removal.subscriptions.extend(node.subscriptions);
            removal.disposers.extend(node.disposers);
            removal.nodes += 1;
            stack.extend(node.children.into_iter().rev());
        }
        removal
    }

    /// Remove every child of `id`, keeping `id` itself.
    pub fn clear_children(&mut self, id: NodeId) -> Removal {
        let children: Vec<NodeId> = self.children(id).to_vec();
        let mut removal = Removal::default();
        for child in children {
            removal.merge(self.remove(child));
        }
        removal
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTENT
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match self.kind(id) {
            Some(NodeKind::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let Some(Node {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = self.node_mut(id)
        else {
            return;
        };
        let value = value.into();
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(Node {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = self.node_mut(id)
        {
            attributes.retain(|(n, _)| n != name);
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let Some(Node {
            kind: NodeKind::Text(existing),
            ..
        }) = self.node_mut(id)
        {
            *existing = text.into();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn set_hooks(&mut self, id: NodeId, hooks: NodeHooks) {
        if let Some(node) = self.node_mut(id) {
            node.hooks = Some(hooks);
        }
    }

    pub fn hooks(&self, id: NodeId) -> Option<&NodeHooks> {
        self.node(id).and_then(|node| node.hooks.as_ref())
    }

    pub fn add_subscription(
        &mut self,
        id: NodeId,
        registry: &Rc<SubscriptionRegistry>,
        subscription: SubscriptionId,
    ) {
        if let Some(node) = self.node_mut(id) {
            node.subscriptions
                .push((Rc::downgrade(registry), subscription));
        }
    }

    pub fn add_disposer(&mut self, id: NodeId, disposer: Disposer) {
        if let Some(node) = self.node_mut(id) {
            node.disposers.push(disposer);
        }
    }

    /// Live subscriptions recorded in the subtree at `id`.
    pub fn subscription_count(&self, id: NodeId) -> usize {
        let own = self.node(id).map(|node| node.subscriptions.len()).unwrap_or(0);
        own + self
            .children(id)
            .iter()
            .map(|child| self.subscription_count(*child))
            .sum::<usize>()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES & OUTPUT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Elements named `tag` in the subtree at `id`, in document order.
    pub fn elements_by_tag(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(id, &mut |node| {
            if self.tag(node) == Some(tag) {
                found.push(node);
            }
        });
        found
    }

    /// Text nodes in the subtree at `id`, in document order.
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(id, &mut |node| {
            if self.text(node).is_some() {
                found.push(node);
            }
        });
        found
    }

    fn walk(&self, id: NodeId, visit: &mut dyn FnMut(NodeId)) {
        if !self.contains(id) {
            return;
        }
        visit(id);
        for child in self.children(id) {
            self.walk(*child, visit);
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.text_nodes(id) {
            out.push_str(self.text(node).unwrap_or_default());
        }
        out
    }

    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            None | Some(NodeKind::Anchor(_)) => {}
            Some(NodeKind::Text(text)) => out.push_str(&escape_text(text)),
            Some(NodeKind::Root) => {
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
            }
            Some(NodeKind::Element { tag, attributes }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use std::cell::Cell;

    #[test]
    fn test_insert_before_and_html() {
        let mut doc = Document::new();
        let root = doc.root();
        let ul = doc.create_element("ul");
        doc.append(root, ul);
        let anchor = doc.create_anchor("for:items");
        doc.append(ul, anchor);
        for text in ["a", "b"] {
            let li = doc.create_element("li");
            let t = doc.create_text(text);
            doc.append(li, t);
            doc.insert_before(ul, li, Some(anchor));
        }
        doc.set_attribute(ul, "class", "x \"y\"");
        assert_eq!(
            doc.to_html(root),
            r#"<ul class="x &quot;y&quot;"><li>a</li><li>b</li></ul>"#
        );
        assert_eq!(doc.text_content(ul), "ab");
        assert_eq!(doc.elements_by_tag(root, "li").len(), 2);
    }

    #[test]
    fn test_remove_collects_subscriptions_and_disposers() {
        let registry = Rc::new(SubscriptionRegistry::new());
        let id = registry.subscribe_path(&path!["x"], Rc::new(|_e: &crate::event::ChangeEvent| {}));

        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element("div");
        let text = doc.create_text("x");
        doc.append(root, div);
        doc.append(div, text);
        doc.add_subscription(text, &registry, id);

        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        doc.add_disposer(div, Box::new(move || flag.set(true)));

        let removal = doc.remove(div);
        assert_eq!(removal.nodes(), 2);
        assert!(!doc.contains(text));
        assert!(doc.children(root).is_empty());
        assert!(!disposed.get());

        assert_eq!(removal.release(), 1);
        assert!(disposed.get());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_ids_are_ignored() {
        let mut doc = Document::new();
        let root = doc.root();
        let text = doc.create_text("a");
        doc.append(root, text);
        doc.remove(text).release();

        doc.set_text(text, "b");
        assert_eq!(doc.text(text), None);
        assert_eq!(doc.remove(root).nodes(), 0);
        let fresh = doc.create_text("c");
        assert_ne!(fresh, text);
    }

    #[test]
    fn test_attribute_set_replace_remove() {
        let mut doc = Document::new();
        let input = doc.create_element("input");
        doc.set_attribute(input, "value", "1");
        doc.set_attribute(input, "value", "2");
        assert_eq!(doc.attributes(input).len(), 1);
        assert_eq!(doc.attribute(input, "value"), Some("2"));
        doc.remove_attribute(input, "value");
        assert_eq!(doc.attribute(input, "value"), None);
        assert_eq!(doc.to_html(input), "<input>");
    }
}
