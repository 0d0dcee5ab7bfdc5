use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// Which placeholder delimiters the binder recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaceholderSyntax {
    /// `${key}`
    Dollar,
    /// `{key}`
    Brace,
    #[default]
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    pub syntax: PlaceholderSyntax,
    /// Repeat marker attribute.
    pub for_attribute: String,
    /// Scope descent attribute.
    pub in_attribute: String,
    /// Elements where `for` is a native attribute and never a repeat marker.
    pub label_like_tags: Vec<String>,
    /// File extension searched by `DirectorySource`.
    pub markup_extension: String,
    /// Host attribute naming the parent state slice handed to a child component.
    pub state_attribute: String,
    /// Host attribute prefix for cross-component reads (`from-user="app-shell#0:user"`).
    pub alias_prefix: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            syntax: PlaceholderSyntax::Both,
            for_attribute: "for".to_string(),
            in_attribute: "in".to_string(),
            label_like_tags: vec!["label".to_string(), "output".to_string()],
            markup_extension: "html".to_string(),
            state_attribute: "state".to_string(),
            alias_prefix: "from-".to_string(),
        }
    }
}

impl RuntimeOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RuntimeError::Options {
            message: e.to_string(),
        })
    }

    pub fn is_label_like(&self, tag: &str) -> bool {
        self.label_like_tags
            .iter()
            .any(|label| label.eq_ignore_ascii_case(tag))
    }

    /// Attributes consumed by the binder and never copied to output.
    pub fn is_directive(&self, tag: &str, attribute: &str) -> bool {
        attribute == self.in_attribute
            || (attribute == self.for_attribute && !self.is_label_like(tag))
    }
}
