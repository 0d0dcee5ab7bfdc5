//! Markup parsing for component fragments.
//!
//! Fragments are parsed with html5ever into a small owned IR. Placeholders are
//! plain text as far as HTML is concerned, so they survive parsing verbatim and
//! are interpreted later by the binder.

use html5ever::parse_document;
use tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::compute_hash;
use crate::error::{Result, RuntimeError};

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    /// Two-part hyphenated custom element name.
    static ref COMPONENT_TAG_RE: Regex = Regex::new(r"^[a-z][a-z0-9]*-[a-z0-9]+$").unwrap();

    static ref STYLE_RE: Regex = Regex::new(r"(?is)<style\b[^>]*>[\s\S]*?</style>").unwrap();

    /// `<user-card />`: html5ever would treat this as an open tag and nest the
    /// following siblings inside it.
    static ref SELF_CLOSING_RE: Regex =
        Regex::new(r"<([a-z][a-z0-9]*-[a-z0-9-]*)((?:\s+[^\s>][^>]*?)?)\s*/>").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE IR TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeIR {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub value: String,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Copy of this element without the named attribute.
    pub fn without_attribute(&self, name: &str) -> ElementNode {
        ElementNode {
            tag: self.tag.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|attr| attr.name != name)
                .cloned()
                .collect(),
            children: self.children.clone(),
        }
    }
}

/// Parsed markup for one component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub source_name: String,
    pub nodes: Vec<TemplateNode>,
    /// Behavior names declared by `<script>` elements, in document order.
    pub behaviors: Vec<String>,
    /// sha256 of the source markup.
    pub hash: String,
}

pub fn is_component_tag(tag_name: &str) -> bool {
    COMPONENT_TAG_RE.is_match(tag_name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PASSES
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_styles(html: &str) -> String {
    STYLE_RE.replace_all(html, "").to_string()
}

fn close_self_closing_components(html: &str) -> String {
    SELF_CLOSING_RE.replace_all(html, "<$1$2></$1>").to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE PARSING
// ═══════════════════════════════════════════════════════════════════════════════

struct Collector {
    nodes: Vec<TemplateNode>,
    behaviors: Vec<String>,
    keep_wrappers: bool,
}

impl Collector {
    fn collect_top(&mut self, handle: &Handle) {
        match &handle.data {
            NodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.collect_top(child);
                }
            }
            NodeData::Element { name, .. } => {
                let tag = name.local.to_string().to_lowercase();
                let is_wrapper = tag == "html" || tag == "head" || tag == "body";
                if is_wrapper && !self.keep_wrappers {
                    for child in handle.children.borrow().iter() {
                        self.collect_top(child);
                    }
                } else if let Some(node) = self.parse_node(handle) {
                    self.nodes.push(node);
                }
            }
            NodeData::Text { .. } => {
                if let Some(node) = self.parse_node(handle) {
                    self.nodes.push(node);
                }
            }
            _ => {}
        }
    }

    fn parse_node(&mut self, handle: &Handle) -> Option<TemplateNode> {
        match &handle.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if text.trim().is_empty() {
                    return None;
                }
                Some(TemplateNode::Text(TextNode { value: text }))
            }

            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.to_string();
                let attributes: Vec<AttributeIR> = attrs
                    .borrow()
                    .iter()
                    .map(|attr| AttributeIR {
                        name: attr.name.local.to_string(),
                        value: attr.value.to_string(),
                    })
                    .collect();

                if tag == "script" {
                    self.collect_behavior(handle, &attributes);
                    return None;
                }

                let children = handle
                    .children
                    .borrow()
                    .iter()
                    .filter_map(|child| self.parse_node(child))
                    .collect();

                Some(TemplateNode::Element(ElementNode {
                    tag,
                    attributes,
                    children,
                }))
            }

            NodeData::Document
            | NodeData::Doctype { .. }
            | NodeData::Comment { .. }
            | NodeData::ProcessingInstruction { .. } => None,
        }
    }

    /// A script names a registered behavior by its `name` attribute or its text.
    fn collect_behavior(&mut self, handle: &Handle, attributes: &[AttributeIR]) {
        let named = attributes
            .iter()
            .find(|attr| attr.name == "name")
            .map(|attr| attr.value.trim().to_string());
        let name = named.unwrap_or_else(|| {
            handle
                .children
                .borrow()
                .iter()
                .filter_map(|child| match &child.data {
                    NodeData::Text { contents } => Some(contents.borrow().to_string()),
                    _ => None,
                })
                .collect::<String>()
                .trim()
                .to_string()
        });
        if !name.is_empty() {
            self.behaviors.push(name);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a component fragment.
pub fn parse_template(html: &str, source_name: &str) -> Result<Fragment> {
    let prepared = close_self_closing_components(&strip_styles(html));

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut prepared.as_bytes())
        .map_err(|e| RuntimeError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

    let mut collector = Collector {
        nodes: Vec::new(),
        behaviors: Vec::new(),
        keep_wrappers: html.to_lowercase().contains("<html"),
    };
    collector.collect_top(&dom.document);

    debug!(
        source = source_name,
        nodes = collector.nodes.len(),
        behaviors = collector.behaviors.len(),
        "parsed fragment"
    );

    Ok(Fragment {
        source_name: source_name.to_string(),
        nodes: collector.nodes,
        behaviors: collector.behaviors,
        hash: compute_hash(html),
    })
}
