use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

use crate::error::Result;
use crate::parse::{parse_template, Fragment};

pub fn compute_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parsed fragments keyed by the content hash of their markup, so identical
/// markup served under different tags is parsed once.
#[derive(Default)]
pub struct TemplateCache {
    entries: RefCell<HashMap<String, Rc<Fragment>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<Rc<Fragment>> {
        self.entries.borrow().get(&compute_hash(source)).cloned()
    }

    pub fn get_or_parse(&self, source: &str, source_name: &str) -> Result<Rc<Fragment>> {
        let hash = compute_hash(source);
        if let Some(hit) = self.entries.borrow().get(&hash) {
            trace!(source = source_name, "template cache hit");
            return Ok(hit.clone());
        }

        let fragment = Rc::new(parse_template(source, source_name)?);
        self.entries.borrow_mut().insert(hash, fragment.clone());
        Ok(fragment)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
