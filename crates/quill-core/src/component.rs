//! Component instances and their render lifecycle.
//!
//! A component owns a [`StateContainer`] built from its class schema, an
//! output node, its refs and the child components its render passes
//! created. It moves through [`LifecycleState`]:
//!
//! ```text
//! Created ──render──▶ Rendered ⇄ Updating
//!                         │
//!                         ▼
//!                      Disposed
//! ```
//!
//! Updates are driven by the container's `stateChanged` event. By default
//! every `stateChanged` before the next turn is folded into one update task
//! on the deferred queue. Classes built with `sync_updates(true)` flush their
//! state on every write and update inline.
//!
//! Events emitted on the component (through its state emitter):
//! - `rendered` after each render, with `first_render`
//! - `stateSynced` after each update, with the batch's changes
//! - `disposed` once, when disposed

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use quill_dom::{DomEvent, Node};
use thiserror::Error;

use crate::class::{ClassRef, ComponentClass, ComponentType};
use crate::emitter::{Event, Payload, SubscriptionId};
use crate::render::{Children, RenderError, Renderer};
use crate::scheduler;
use crate::state::{BatchMode, ChangeMap, Config, DeclarationError, StateContainer, StateError, StateSchema};
use crate::value::Value;

/// Errors returned by component construction and writes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComponentError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Where a component is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Rendered,
    Updating,
    Disposed,
}

/// Per-instance construction options.
#[derive(Clone, Default)]
pub struct ComponentOptions {
    renderer: Option<Rc<dyn Renderer>>,
    element: Option<Node>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `renderer` instead of the class renderer.
    pub fn with_renderer(self, renderer: impl Renderer + 'static) -> Self {
        self.with_shared_renderer(Rc::new(renderer))
    }

    pub fn with_shared_renderer(mut self, renderer: Rc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Adopt an existing node as the initial output.
    pub fn with_element(mut self, element: Node) -> Self {
        self.element = Some(element);
        self
    }
}

impl fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("renderer", &self.renderer.is_some())
            .field("element", &self.element)
            .finish()
    }
}

/// A registered ref.
#[derive(Debug, Clone, PartialEq)]
pub enum RefTarget {
    Node(Node),
    Component(Component),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildIdentity {
    Ref(String),
    Key(String),
    Ordinal(usize),
}

struct ChildSlot {
    class: TypeId,
    identity: ChildIdentity,
    component: Component,
    created: bool,
}

/// Bookkeeping for one render pass.
#[derive(Default)]
struct PassState {
    claimed: Vec<ChildSlot>,
    refs: BTreeMap<String, RefTarget>,
    ordinals: HashMap<TypeId, usize>,
}

/// How a render pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassOutcome {
    Commit,
    Abort,
}

struct ComponentInner {
    class: ClassRef,
    state: StateContainer,
    renderer: Rc<dyn Renderer>,
    sync_updates: bool,
    lifecycle: Cell<LifecycleState>,
    element: RefCell<Option<Node>>,
    refs: RefCell<BTreeMap<String, RefTarget>>,
    children: RefCell<Children>,
    child_components: RefCell<Vec<ChildSlot>>,
    pass: RefCell<Option<PassState>>,
    pending_update: RefCell<ChangeMap>,
    update_scheduled: Cell<bool>,
    /// First failure of an inline update, returned to the writer
    sync_error: RefCell<Option<RenderError>>,
}

/// A component instance. Cloning yields another handle to it.
#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

/// Non-owning handle to a component.
#[derive(Clone)]
pub struct WeakComponent(Weak<ComponentInner>);

impl WeakComponent {
    pub fn upgrade(&self) -> Option<Component> {
        self.0.upgrade().map(Component)
    }
}

impl fmt::Debug for WeakComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakComponent")
    }
}

impl Component {
    /// Construct and render a `T`.
    pub fn new<T: ComponentType>(config: Config) -> Result<Component, ComponentError> {
        Self::with_options::<T>(config, ComponentOptions::default())
    }

    pub fn with_options<T: ComponentType>(
        config: Config,
        options: ComponentOptions,
    ) -> Result<Component, ComponentError> {
        let class = ComponentClass::of::<T>()?;
        Self::from_class(class, config, options)
    }

    pub fn from_class(
        class: ClassRef,
        config: Config,
        options: ComponentOptions,
    ) -> Result<Component, ComponentError> {
        Self::create(class, config, Children::default(), options)
    }

    pub(crate) fn create(
        class: ClassRef,
        config: Config,
        children: Children,
        options: ComponentOptions,
    ) -> Result<Component, ComponentError> {
        let sync_updates = class.sync_updates();
        let mode = if sync_updates {
            BatchMode::Immediate
        } else {
            BatchMode::Deferred
        };
        let schema = class.schema();
        let initial = external_config(&schema, config);
        let state = StateContainer::for_owner(class.name(), schema, &initial, mode);
        let renderer = options.renderer.unwrap_or_else(|| class.renderer());

        let component = Component(Rc::new(ComponentInner {
            class,
            state,
            renderer,
            sync_updates,
            lifecycle: Cell::new(LifecycleState::Created),
            element: RefCell::new(options.element),
            refs: RefCell::new(BTreeMap::new()),
            children: RefCell::new(children),
            child_components: RefCell::new(Vec::new()),
            pass: RefCell::new(None),
            pending_update: RefCell::new(ChangeMap::new()),
            update_scheduled: Cell::new(false),
            sync_error: RefCell::new(None),
        }));

        let weak = component.downgrade();
        component.0.state.on("stateChanged", move |event| {
            if let (Some(component), Some(changes)) = (weak.upgrade(), event.changes()) {
                component.handle_state_changed(changes);
            }
        });

        if let Some(hook) = component.0.class.created_hook() {
            hook(&component);
        }
        // The first render reads whatever the hook wrote.
        *component.0.pending_update.borrow_mut() = ChangeMap::new();

        component
            .0
            .state
            .batch(|| component.0.renderer.render(&component))?;
        component.0.lifecycle.set(LifecycleState::Rendered);
        tracing::debug!(class = component.name(), "component rendered");
        component.after_render(true);

        // Writes made during the first render form the first update.
        if !component.0.pending_update.borrow().is_empty() {
            if component.0.sync_updates {
                component.run_update()?;
            } else {
                component.schedule_update();
            }
        }
        Ok(component)
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn class(&self) -> &ClassRef {
        &self.0.class
    }

    pub fn name(&self) -> &'static str {
        self.0.class.name()
    }

    pub fn state(&self) -> &StateContainer {
        &self.0.state
    }

    pub fn renderer(&self) -> Rc<dyn Renderer> {
        Rc::clone(&self.0.renderer)
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.0.lifecycle.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle() == LifecycleState::Disposed
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.state.get(key)
    }

    /// Write `key`.
    ///
    /// For classes with synchronous updates the re-render runs inside this
    /// call, and its failure is returned here.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ComponentError> {
        self.0.state.set(key, value)?;
        self.take_sync_error()?;
        Ok(())
    }

    /// The output node, if any.
    pub fn element(&self) -> Option<Node> {
        self.0.element.borrow().clone()
    }

    /// Replace the output node. Renderers call this from `render`.
    pub fn set_element(&self, element: Option<Node>) {
        *self.0.element.borrow_mut() = element;
    }

    /// Content forwarded by the parent's markup.
    pub fn children(&self) -> Children {
        self.0.children.borrow().clone()
    }

    /// Child components created by this component's render passes.
    pub fn child_components(&self) -> Vec<Component> {
        self.0
            .child_components
            .borrow()
            .iter()
            .map(|slot| slot.component.clone())
            .collect()
    }

    pub fn refs(&self) -> BTreeMap<String, RefTarget> {
        self.0.refs.borrow().clone()
    }

    pub fn ref_node(&self, name: &str) -> Option<Node> {
        match self.0.refs.borrow().get(name) {
            Some(RefTarget::Node(node)) => Some(node.clone()),
            _ => None,
        }
    }

    pub fn ref_component(&self, name: &str) -> Option<Component> {
        match self.0.refs.borrow().get(name) {
            Some(RefTarget::Component(component)) => Some(component.clone()),
            _ => None,
        }
    }

    pub fn on<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.0.state.on(name, callback)
    }

    pub fn once<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.0.state.once(name, callback)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.0.state.off(id)
    }

    pub fn emit(&self, name: &str, payload: Payload) -> bool {
        self.0.state.emit(name, payload)
    }

    /// Invoke the class method `name`. Returns `false` if there is none.
    pub fn call_method(&self, name: &str, event: &DomEvent) -> bool {
        match self.0.class.method(name) {
            Some(method) => {
                method(self, event);
                true
            }
            None => {
                tracing::trace!(class = self.name(), method = name, "no such method");
                false
            }
        }
    }

    // ========================================================================
    // Updates
    // ========================================================================

    fn handle_state_changed(&self, changes: &ChangeMap) {
        if self.is_disposed() {
            return;
        }
        self.0.pending_update.borrow_mut().merge(changes);

        // Running passes pick the changes up when they finish.
        if matches!(
            self.lifecycle(),
            LifecycleState::Created | LifecycleState::Updating
        ) {
            return;
        }

        if self.0.sync_updates {
            if let Err(err) = self.run_update() {
                tracing::error!(class = self.name(), %err, "synchronous update failed");
                self.0.sync_error.borrow_mut().get_or_insert(err);
            }
            return;
        }
        self.schedule_update();
    }

    fn take_sync_error(&self) -> Result<(), RenderError> {
        match self.0.sync_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Queue one update task for the pending changes.
    fn schedule_update(&self) {
        if self.0.update_scheduled.replace(true) {
            return;
        }
        let weak = self.downgrade();
        scheduler::try_defer(move || match weak.upgrade() {
            Some(component) => component.run_update(),
            None => Ok(()),
        });
    }

    /// Apply every pending update now.
    pub fn update_now(&self) -> Result<(), RenderError> {
        self.0.state.flush();
        self.take_sync_error()?;
        self.run_update()
    }

    fn run_update(&self) -> Result<(), RenderError> {
        self.0.update_scheduled.set(false);
        loop {
            if self.is_disposed() {
                return Ok(());
            }
            let changes = std::mem::take(&mut *self.0.pending_update.borrow_mut());
            if changes.is_empty() {
                return Ok(());
            }
            self.apply_update(&changes, true)?;
        }
    }

    fn apply_update(&self, changes: &ChangeMap, announce: bool) -> Result<(), RenderError> {
        let should_render = self
            .0
            .class
            .should_update_hook()
            .is_none_or(|hook| hook(self, changes));

        if should_render {
            tracing::debug!(class = self.name(), keys = changes.len(), "updating component");
            self.0.lifecycle.set(LifecycleState::Updating);
            let result = self
                .0
                .state
                .batch(|| self.0.renderer.update(self, changes));
            if self.is_disposed() {
                return Ok(());
            }
            self.0.lifecycle.set(LifecycleState::Rendered);
            result?;
            self.after_render(false);
        }

        if announce && !self.is_disposed() {
            self.emit("stateSynced", Payload::Changes(changes.clone()));
        }
        Ok(())
    }

    fn after_render(&self, first_render: bool) {
        if let Some(hook) = self.0.class.rendered_hook() {
            hook(self, first_render);
        }
        self.emit("rendered", Payload::Rendered { first_render });
    }

    /// Reconfigure a child from its parent's latest pass and bring its
    /// output up to date.
    pub(crate) fn update_from_parent(
        &self,
        config: Config,
        children: Children,
    ) -> Result<(), RenderError> {
        let children_changed = {
            let mut current = self.0.children.borrow_mut();
            let changed = !(current.is_empty() && children.is_empty());
            *current = children;
            changed
        };

        let schema = self.0.state.schema();
        let wrote = self.0.state.batch(|| -> Result<bool, StateError> {
            let mut wrote = false;
            for (key, value) in external_config(&schema, config) {
                if self.0.state.get(&key).as_ref() != Some(&value) {
                    self.0.state.set(&key, value)?;
                    wrote = true;
                }
            }
            Ok(wrote)
        })?;

        self.0.state.flush();
        self.take_sync_error()?;
        if self.is_disposed() {
            return Ok(());
        }
        let pending = std::mem::take(&mut *self.0.pending_update.borrow_mut());
        if !pending.is_empty() {
            self.apply_update(&pending, true)?;
        } else if children_changed && !wrote {
            self.apply_update(&ChangeMap::new(), false)?;
        }
        // Writes the pass itself made.
        self.run_update()
    }

    // ========================================================================
    // Render passes
    // ========================================================================

    pub(crate) fn begin_pass(&self) {
        let previous = self.0.pass.borrow_mut().replace(PassState::default());
        if previous.is_some() {
            tracing::warn!(class = self.name(), "render pass started inside another pass");
        }
    }

    pub(crate) fn end_pass(&self, outcome: PassOutcome) {
        let Some(pass) = self.0.pass.borrow_mut().take() else {
            return;
        };
        match outcome {
            PassOutcome::Commit => {
                let kept: Vec<ChildSlot> = pass
                    .claimed
                    .into_iter()
                    .map(|slot| ChildSlot {
                        created: false,
                        ..slot
                    })
                    .collect();
                let dropped = std::mem::replace(&mut *self.0.child_components.borrow_mut(), kept);
                for slot in dropped {
                    tracing::debug!(
                        parent = self.name(),
                        child = slot.component.name(),
                        "disposing child missing from render"
                    );
                    slot.component.dispose();
                }
                *self.0.refs.borrow_mut() = pass.refs;
            }
            PassOutcome::Abort => {
                for slot in pass.claimed {
                    if slot.created {
                        slot.component.dispose();
                    } else {
                        self.0.child_components.borrow_mut().push(slot);
                    }
                }
            }
        }
    }

    /// Record a ref, committed with the current pass if one is running.
    pub(crate) fn register_ref(&self, name: &str, target: RefTarget) {
        if let Some(pass) = self.0.pass.borrow_mut().as_mut() {
            pass.refs.insert(name.to_string(), target);
            return;
        }
        self.0.refs.borrow_mut().insert(name.to_string(), target);
    }

    /// Find or create the child for a component tag in the current pass.
    ///
    /// Children are matched by ref, then key, then by their position among
    /// same-class siblings without either.
    pub(crate) fn claim_child(
        &self,
        class: &ClassRef,
        key: Option<&str>,
        ref_name: Option<&str>,
        config: Config,
        children: Children,
    ) -> Result<Component, RenderError> {
        let class_id = class.type_id();
        let identity = match (ref_name, key) {
            (Some(name), _) => ChildIdentity::Ref(name.to_string()),
            (None, Some(key)) => ChildIdentity::Key(key.to_string()),
            (None, None) => {
                let mut pass = self.0.pass.borrow_mut();
                let pass = pass.get_or_insert_with(PassState::default);
                let ordinal = pass.ordinals.entry(class_id).or_insert(0);
                let identity = ChildIdentity::Ordinal(*ordinal);
                *ordinal += 1;
                identity
            }
        };

        let existing = {
            let mut slots = self.0.child_components.borrow_mut();
            slots
                .iter()
                .position(|slot| slot.class == class_id && slot.identity == identity)
                .map(|index| slots.remove(index))
        };

        let (component, created) = match existing {
            Some(slot) if !slot.component.is_disposed() => {
                slot.component.update_from_parent(config, children)?;
                (slot.component, false)
            }
            _ => {
                let child =
                    Component::create(Rc::clone(class), config, children, ComponentOptions::default())?;
                (child, true)
            }
        };

        let slot = ChildSlot {
            class: class_id,
            identity,
            component: component.clone(),
            created,
        };
        match self.0.pass.borrow_mut().as_mut() {
            Some(pass) => pass.claimed.push(slot),
            None => self.0.child_components.borrow_mut().push(slot),
        }
        Ok(component)
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Dispose children, detach the output and stop reacting to state.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        self.0.lifecycle.set(LifecycleState::Disposed);

        let children = std::mem::take(&mut *self.0.child_components.borrow_mut());
        for slot in children {
            slot.component.dispose();
        }
        if let Some(element) = self.element() {
            element.detach();
        }
        if let Some(hook) = self.0.class.disposed_hook() {
            hook(self);
        }
        self.emit("disposed", Payload::Empty);

        *self.0.pending_update.borrow_mut() = ChangeMap::new();
        self.0.refs.borrow_mut().clear();
        self.0.state.dispose();
        tracing::debug!(class = self.name(), "component disposed");
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("class", &self.name())
            .field("lifecycle", &self.lifecycle())
            .field("element", &self.element())
            .finish()
    }
}

/// Drop internal keys from configuration passed in from outside.
fn external_config(schema: &StateSchema, config: Config) -> Config {
    config
        .into_iter()
        .filter(|(key, _)| match schema.get(key) {
            Some(descriptor) if descriptor.is_internal() => {
                tracing::debug!(key = %key, "ignoring internal key in external config");
                false
            }
            Some(_) => true,
            None => {
                tracing::trace!(key = %key, "ignoring undeclared key in config");
                false
            }
        })
        .collect()
}
