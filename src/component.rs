//! Component shell, instance registry and runtime.
//!
//! A [`Component`] owns one [`Store`] and one [`TemplateBinder`] rendered into a
//! host element. Attaching registers it with the runtime's [`ComponentRegistry`],
//! loads its markup (abortable), binds it, mounts any child components found in
//! it and finally runs its behaviors. Detaching undoes all of that: the in-flight
//! load is aborted, bound output is removed, the component's subscription
//! registry is cleared so already-queued events deliver to nobody, and the
//! instance is unregistered.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::Path as FsPath;
use std::rc::{Rc, Weak};

use futures::future::{join_all, AbortHandle, Abortable, FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::behavior::{BehaviorContext, BehaviorRegistry};
use crate::binder::{ChildMount, TemplateBinder};
use crate::dom::{Document, NodeId, SharedDocument};
use crate::error::{LoadError, Result, RuntimeError};
use crate::loader::{DirectorySource, FragmentCache, MarkupSource};
use crate::options::RuntimeOptions;
use crate::parse::is_component_tag;
use crate::path::Path;
use crate::registry::SubscriptionRegistry;
use crate::scheduler::EventScheduler;
use crate::store::Store;

/// Pending `open` / `replace`.
pub type Transition = LocalBoxFuture<'static, Result<()>>;

/// Operations a component exposes to its bound nodes.
pub trait ComponentOps {
    fn key(&self) -> String;

    /// Re-render in place as `tag`, keeping this identity. `None` if `tag` is
    /// not a component name.
    fn open(&self, tag: &str) -> Option<Transition>;

    /// Put a new `tag` component in this one's position and end this one.
    /// `None` if `tag` is not a component name.
    fn replace(&self, tag: &str) -> Option<Transition>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME
// ═══════════════════════════════════════════════════════════════════════════════

struct RuntimeInner {
    document: SharedDocument,
    scheduler: Rc<EventScheduler>,
    fragments: FragmentCache,
    behaviors: BehaviorRegistry,
    components: ComponentRegistry,
    options: Rc<RuntimeOptions>,
    tasks: RefCell<Vec<Transition>>,
}

/// Everything components on one surface share.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(source: Rc<dyn MarkupSource>, options: RuntimeOptions) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                document: Document::shared(),
                scheduler: Rc::new(EventScheduler::new()),
                fragments: FragmentCache::new(source),
                behaviors: BehaviorRegistry::new(),
                components: ComponentRegistry::new(),
                options: Rc::new(options),
                tasks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Runtime over `<tag>.<markup_extension>` files under `dir`.
    pub fn from_directory(dir: impl AsRef<FsPath>, options: RuntimeOptions) -> Self {
        let source = DirectorySource::new(dir, &options.markup_extension);
        Self::new(Rc::new(source), options)
    }

    pub fn document(&self) -> &SharedDocument {
        &self.inner.document
    }

    pub fn scheduler(&self) -> &Rc<EventScheduler> {
        &self.inner.scheduler
    }

    pub fn fragments(&self) -> &FragmentCache {
        &self.inner.fragments
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.inner.behaviors
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.components
    }

    pub fn options(&self) -> &Rc<RuntimeOptions> {
        &self.inner.options
    }

    /// Deliver everything queued since the last frame.
    pub fn frame(&self) -> usize {
        self.inner.scheduler.flush()
    }

    /// Queue background work (mounts found during a frame, behavior-initiated
    /// transitions). Driven by [`Runtime::settle`].
    pub fn spawn(&self, task: Transition) {
        self.inner.tasks.borrow_mut().push(task);
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Run queued tasks, including any they queue, until none are left.
    /// Every task runs; the first failure is returned.
    pub async fn settle(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let batch = std::mem::take(&mut *self.inner.tasks.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for result in join_all(batch).await {
                if let Err(e) = result {
                    warn!(code = e.code(), error = %e, "background task failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Create a host element for `tag` under `parent` and attach a component to it.
    pub async fn mount(&self, tag: &str, parent: NodeId, state: Value) -> Result<Component> {
        if !is_component_tag(tag) {
            return Err(RuntimeError::InvalidTag {
                tag: tag.to_string(),
            });
        }
        let host = {
            let mut doc = self.inner.document.borrow_mut();
            let host = doc.create_element(tag);
            doc.append(parent, host);
            host
        };
        Component::attach(self, host, tag, state).await
    }

    pub fn html(&self) -> String {
        let doc = self.inner.document.borrow();
        doc.to_html(doc.root())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Live component instances keyed `"<tag>#<n>"`.
#[derive(Default)]
pub struct ComponentRegistry {
    instances: RefCell<BTreeMap<String, Component>>,
    counters: RefCell<HashMap<String, usize>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance numbers count up per tag and are never reused.
    fn next_key(&self, tag: &str) -> String {
        let mut counters = self.counters.borrow_mut();
        let n = counters.entry(tag.to_string()).or_insert(0);
        let key = format!("{}#{}", tag, n);
        *n += 1;
        key
    }

    pub fn register(&self, component: Component) -> bool {
        let key = component.key();
        let mut instances = self.instances.borrow_mut();
        if instances.contains_key(&key) {
            return false;
        }
        instances.insert(key, component);
        true
    }

    pub fn unregister(&self, key: &str) -> Option<Component> {
        self.instances.borrow_mut().remove(key)
    }

    pub fn lookup(&self, key: &str) -> Option<Component> {
        self.instances.borrow().get(key).cloned()
    }

    /// Snapshot read from another instance's state.
    pub fn read(&self, key: &str, path: &Path) -> Option<Value> {
        self.lookup(key)?.state().get(path)
    }

    pub fn keys(&self) -> Vec<String> {
        self.instances.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.borrow().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT
// ═══════════════════════════════════════════════════════════════════════════════

struct ComponentInner {
    this: Weak<ComponentInner>,
    runtime: Weak<RuntimeInner>,
    key: String,
    tag: RefCell<String>,
    host: NodeId,
    store: Store,
    binder: RefCell<Option<TemplateBinder>>,
    abort: RefCell<Option<AbortHandle>>,
    attached: Cell<bool>,
}

#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("key", &self.inner.key)
            .field("tag", &self.inner.tag.borrow())
            .field("host", &self.inner.host)
            .field("attached", &self.inner.attached.get())
            .finish()
    }
}

impl Component {
    /// Attach a new `tag` component to `host` with `state` as its root.
    ///
    /// Host attributes starting with the alias prefix copy a value out of
    /// another instance (`from-user="app-shell#0:user"`) before anything binds.
    /// On failure the component is detached again and the error returned.
    pub async fn attach(
        runtime: &Runtime,
        host: NodeId,
        tag: &str,
        state: Value,
    ) -> Result<Component> {
        if !is_component_tag(tag) {
            return Err(RuntimeError::InvalidTag {
                tag: tag.to_string(),
            });
        }

        let mut state = match state {
            Value::Object(_) => state,
            Value::Null => Value::Object(Map::new()),
            other => {
                warn!(tag, value = %other, "component state must be an object, starting empty");
                Value::Object(Map::new())
            }
        };
        apply_aliases(runtime, host, &mut state);

        let store = Store::new(
            state,
            Rc::new(SubscriptionRegistry::new()),
            runtime.scheduler().clone(),
        );
        let key = runtime.components().next_key(tag);
        let inner = Rc::new_cyclic(|this| ComponentInner {
            this: this.clone(),
            runtime: Rc::downgrade(&runtime.inner),
            key,
            tag: RefCell::new(tag.to_string()),
            host,
            store,
            binder: RefCell::new(None),
            abort: RefCell::new(None),
            attached: Cell::new(true),
        });
        let component = Component { inner };
        runtime.components().register(component.clone());
        debug!(key = %component.key(), host = %host, "attaching component");

        if let Err(e) = ComponentInner::render(component.inner.clone()).await {
            component.detach();
            return Err(e);
        }

        // removing the host from the tree ends the component
        let weak = Rc::downgrade(&component.inner);
        runtime.document().borrow_mut().add_disposer(
            host,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Component { inner }.detach();
                }
            }),
        );
        Ok(component)
    }

    pub fn key(&self) -> String {
        self.inner.key.clone()
    }

    pub fn tag(&self) -> String {
        self.inner.tag.borrow().clone()
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    pub fn state(&self) -> Store {
        self.inner.store.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.get()
    }

    pub fn open(&self, tag: &str) -> Option<Transition> {
        self.inner.open(tag)
    }

    pub fn replace(&self, tag: &str) -> Option<Transition> {
        self.inner.replace(tag)
    }

    pub(crate) fn spawn_open(&self, tag: &str) -> bool {
        self.spawn(self.inner.open(tag))
    }

    pub(crate) fn spawn_replace(&self, tag: &str) -> bool {
        self.spawn(self.inner.replace(tag))
    }

    fn spawn(&self, transition: Option<Transition>) -> bool {
        match (transition, self.inner.runtime.upgrade()) {
            (Some(task), Some(runtime)) => {
                Runtime { inner: runtime }.spawn(task);
                true
            }
            _ => false,
        }
    }

    /// Abort loading, remove output, drop subscriptions and unregister.
    /// Idempotent.
    pub fn detach(&self) {
        let inner = &self.inner;
        if !inner.attached.replace(false) {
            return;
        }
        if let Some(handle) = inner.abort.borrow_mut().take() {
            handle.abort();
        }
        inner.teardown_output();
        if let Some(runtime) = inner.runtime.upgrade() {
            let removed = runtime.components.unregister(&inner.key);
            drop(removed);
        }
        debug!(key = %inner.key, "detached component");
    }
}

fn apply_aliases(runtime: &Runtime, host: NodeId, state: &mut Value) {
    let prefix = runtime.options().alias_prefix.as_str();
    let aliases: Vec<(String, String)> = runtime
        .document()
        .borrow()
        .attributes(host)
        .iter()
        .filter_map(|(name, value)| {
            let alias = name.strip_prefix(prefix)?;
            Some((alias.to_string(), value.clone()))
        })
        .collect();

    let Value::Object(map) = state else {
        return;
    };
    for (alias, target) in aliases {
        let (key, path) = target.split_once(':').unwrap_or((target.as_str(), ""));
        match runtime.components().read(key, &Path::parse(path)) {
            Some(value) => {
                map.insert(alias, value);
            }
            None => warn!(alias = %alias, target = %target, "alias target not found"),
        }
    }
}

impl ComponentInner {
    fn runtime(&self) -> Result<Runtime> {
        self.runtime
            .upgrade()
            .map(|inner| Runtime { inner })
            .ok_or_else(|| self.detached())
    }

    fn detached(&self) -> RuntimeError {
        RuntimeError::Detached {
            key: self.key.clone(),
        }
    }

    /// Remove everything rendered into the host and drop its subscriptions.
    fn teardown_output(&self) {
        let binder = self.binder.borrow_mut().take();
        if let Some(runtime) = self.runtime.upgrade() {
            let removal = runtime.document.borrow_mut().clear_children(self.host);
            removal.release();
        }
        self.store.registry().clear();
        drop(binder);
    }

    /// Load, bind, mount children, run behaviors.
    fn render(this: Rc<ComponentInner>) -> Transition {
        async move {
            let runtime = this.runtime()?;
            let tag = this.tag.borrow().clone();

            let (handle, registration) = AbortHandle::new_pair();
            if let Some(previous) = this.abort.borrow_mut().replace(handle) {
                previous.abort();
            }
            let fragment = match Abortable::new(runtime.fragments().load(&tag), registration).await
            {
                Ok(loaded) => {
                    this.abort.borrow_mut().take();
                    loaded?
                }
                Err(_aborted) => return Err(LoadError::Aborted { tag }.into()),
            };

            if !this.attached.get() || !runtime.document().borrow().contains(this.host) {
                return Err(this.detached());
            }

            let removal = runtime.document().borrow_mut().clear_children(this.host);
            removal.release();

            let ops: Weak<dyn ComponentOps> = this.this.clone();
            let binder = TemplateBinder::with_component(
                runtime.document().clone(),
                this.store.clone(),
                runtime.options().clone(),
                Some(ops),
            );
            for node in &fragment.nodes {
                binder.bind(node, this.host, &Path::root());
            }
            let mounts = binder.take_mounts();

            let weak_this = this.this.clone();
            let weak_runtime = Rc::downgrade(&runtime.inner);
            binder.forward_mounts(move |mount| {
                if let (Some(parent), Some(runtime)) = (weak_this.upgrade(), weak_runtime.upgrade()) {
                    let runtime = Runtime { inner: runtime };
                    let task = ComponentInner::mount_child(parent, runtime.clone(), mount)
                        .map(|result| result.map(|_| ()))
                        .boxed_local();
                    runtime.spawn(task);
                }
            });
            *this.binder.borrow_mut() = Some(binder);

            let children = join_all(
                mounts
                    .into_iter()
                    .map(|mount| ComponentInner::mount_child(this.clone(), runtime.clone(), mount)),
            )
            .await;
            for child in children {
                child?;
            }

            if !this.attached.get() {
                return Err(this.detached());
            }
            let context = BehaviorContext::new(Component {
                inner: this.clone(),
            });
            runtime.behaviors().run(&fragment.behaviors, &context);
            Ok(())
        }
        .boxed_local()
    }

    /// Attach a child component found while binding. The child receives its
    /// own copy of the named state slice. Tags with no markup stay plain elements.
    async fn mount_child(
        parent: Rc<ComponentInner>,
        runtime: Runtime,
        mount: ChildMount,
    ) -> Result<Option<Component>> {
        if !parent.attached.get() {
            return Ok(None);
        }
        let state = mount
            .state_path
            .as_ref()
            .and_then(|path| parent.store.get(path))
            .unwrap_or(Value::Null);

        match Component::attach(&runtime, mount.host, &mount.tag, state).await {
            Ok(child) => Ok(Some(child)),
            Err(RuntimeError::Load(LoadError::NotFound { tag })) => {
                warn!(tag = %tag, "no markup for custom element, leaving it empty");
                Ok(None)
            }
            Err(RuntimeError::Detached { key }) => {
                debug!(key = %key, "host went away before mount finished");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl ComponentOps for ComponentInner {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn open(&self, tag: &str) -> Option<Transition> {
        if !is_component_tag(tag) {
            return None;
        }
        let this = self.this.upgrade()?;
        let tag = tag.to_string();
        Some(
            async move {
                if !this.attached.get() {
                    return Err(this.detached());
                }
                if let Some(handle) = this.abort.borrow_mut().take() {
                    handle.abort();
                }
                this.teardown_output();
                debug!(key = %this.key, to = %tag, "opening in place");
                *this.tag.borrow_mut() = tag;
                ComponentInner::render(this).await
            }
            .boxed_local(),
        )
    }

    fn replace(&self, tag: &str) -> Option<Transition> {
        if !is_component_tag(tag) {
            return None;
        }
        let this = self.this.upgrade()?;
        let tag = tag.to_string();
        Some(
            async move {
                if !this.attached.get() {
                    return Err(this.detached());
                }
                let runtime = this.runtime()?;
                let state = this.store.root();
                let host = {
                    let mut doc = runtime.document().borrow_mut();
                    let Some(parent) = doc.parent(this.host) else {
                        return Err(this.detached());
                    };
                    let host = doc.create_element(&tag);
                    doc.insert_before(parent, host, Some(this.host));
                    host
                };
                debug!(key = %this.key, to = %tag, "replacing");

                Component { inner: this.clone() }.detach();
                let removal = runtime.document().borrow_mut().remove(this.host);
                removal.release();

                Component::attach(&runtime, host, &tag, state).await.map(|_| ())
            }
            .boxed_local(),
        )
    }
}
