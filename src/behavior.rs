//! Registered behaviors.
//!
//! A fragment's `<script>` elements name behaviors instead of carrying code. Each
//! named behavior runs once per render, after the component's bindings and child
//! mounts are in place, with a [`BehaviorContext`] as its only capability.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::component::Component;
use crate::store::Store;

pub type Behavior = Rc<dyn Fn(&BehaviorContext)>;

pub struct BehaviorContext {
    component: Component,
}

impl BehaviorContext {
    pub(crate) fn new(component: Component) -> Self {
        Self { component }
    }

    /// The component's root state.
    pub fn state(&self) -> Store {
        self.component.state()
    }

    pub fn key(&self) -> String {
        self.component.key()
    }

    /// Schedule `open`. Returns false for an invalid tag.
    pub fn open(&self, tag: &str) -> bool {
        self.component.spawn_open(tag)
    }

    /// Schedule `replace`. Returns false for an invalid tag.
    pub fn replace(&self, tag: &str) -> bool {
        self.component.spawn_replace(tag)
    }
}

#[derive(Default)]
pub struct BehaviorRegistry {
    handlers: RefCell<HashMap<String, Behavior>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(&BehaviorContext) + 'static,
    {
        self.handlers
            .borrow_mut()
            .insert(name.to_string(), Rc::new(handler));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.borrow_mut().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.borrow().contains_key(name)
    }

    /// Run each named behavior once, in order. Unknown names are skipped.
    /// Returns how many ran.
    pub fn run(&self, names: &[String], context: &BehaviorContext) -> usize {
        let mut ran = 0;
        for name in names {
            let handler = self.handlers.borrow().get(name).cloned();
            match handler {
                Some(handler) => {
                    debug!(behavior = %name, component = %context.key(), "running behavior");
                    handler(context);
                    ran += 1;
                }
                None => warn!(behavior = %name, "no behavior registered, skipping"),
            }
        }
        ran
    }
}
