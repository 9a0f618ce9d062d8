//! Component classes.
//!
//! A component type implements [`ComponentType`] and describes itself once
//! through a [`ClassBuilder`]: its parent class, declared state, renderer,
//! render function, named methods, static properties and lifecycle hooks.
//! The result is a [`ComponentClass`], built on first use and cached per
//! thread, whose merged state schema every instance shares.
//!
//! # Example
//!
//! ```ignore
//! struct Counter;
//!
//! impl ComponentType for Counter {
//!     fn define(class: ClassBuilder) -> ClassBuilder {
//!         class
//!             .state("count", AttributeDescriptor::new().value(0))
//!             .method("increment", |component, _event| {
//!                 let count = component.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
//!                 let _ = component.set("count", count + 1);
//!             })
//!             .render(|component, ctx| {
//!                 ctx.open("button", None, vec![("data-onclick".into(), "increment".into())])?;
//!                 ctx.text(&component.get("count").unwrap_or_default().to_string())?;
//!                 ctx.close("button")
//!             })
//!     }
//! }
//! ```

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use quill_dom::DomEvent;

use crate::component::Component;
use crate::render::{ComponentRenderer, IncrementalRenderer, RenderContext, RenderError, Renderer};
use crate::state::{AttributeDescriptor, ChangeMap, DeclarationError, StateSchema};
use crate::value::Value;

/// Render function of a class.
pub type RenderFn = Rc<dyn Fn(&Component, &mut RenderContext<'_>) -> Result<(), RenderError>>;

/// Named method, callable from listeners bound by name.
pub type MethodFn = Rc<dyn Fn(&Component, &DomEvent)>;

/// Hook run with the component only.
pub type LifecycleHook = Rc<dyn Fn(&Component)>;

/// Hook run after each render, with `first_render`.
pub type RenderedHook = Rc<dyn Fn(&Component, bool)>;

/// Hook deciding whether a batch of changes needs a render.
pub type ShouldUpdateHook = Rc<dyn Fn(&Component, &ChangeMap) -> bool>;

/// Shared handle to a built class.
pub type ClassRef = Rc<ComponentClass>;

/// A Rust type usable as a component class.
pub trait ComponentType: 'static {
    fn define(class: ClassBuilder) -> ClassBuilder;
}

// ============================================================================
// Registry
// ============================================================================

thread_local! {
    static CLASS_REGISTRY: RefCell<ClassRegistry> = RefCell::new(ClassRegistry::default());
}

#[derive(Default)]
struct ClassRegistry {
    classes: HashMap<TypeId, ClassRef>,
    /// Classes whose `define` is running, innermost last
    defining: Vec<(TypeId, &'static str)>,
}

/// Pops the defining stack even if `define` panics.
struct DefiningGuard;

impl Drop for DefiningGuard {
    fn drop(&mut self) {
        CLASS_REGISTRY.with(|registry| {
            registry.borrow_mut().defining.pop();
        });
    }
}

// ============================================================================
// ComponentClass
// ============================================================================

#[derive(Default, Clone)]
struct Hooks {
    created: Option<LifecycleHook>,
    rendered: Option<RenderedHook>,
    disposed: Option<LifecycleHook>,
    should_update: Option<ShouldUpdateHook>,
}

/// A built component class.
pub struct ComponentClass {
    name: &'static str,
    type_id: TypeId,
    parent: Option<ClassRef>,
    schema: Rc<StateSchema>,
    renderer: Option<Rc<dyn Renderer>>,
    sync_updates: Option<bool>,
    render_fn: Option<RenderFn>,
    methods: Vec<(String, MethodFn)>,
    statics: Vec<(String, Value)>,
    hooks: Hooks,
}

impl ComponentClass {
    /// The class of `T`, built on first use.
    pub fn of<T: ComponentType>() -> Result<ClassRef, DeclarationError> {
        let type_id = TypeId::of::<T>();
        let name = std::any::type_name::<T>();

        let cached = CLASS_REGISTRY.with(|registry| {
            let registry = registry.borrow();
            if let Some(class) = registry.classes.get(&type_id) {
                return Ok(Some(Rc::clone(class)));
            }
            if registry.defining.iter().any(|(id, _)| *id == type_id) {
                let class = registry.defining.last().map_or(name, |(_, n)| *n);
                return Err(DeclarationError::InheritanceCycle {
                    class,
                    parent: name,
                });
            }
            Ok(None)
        })?;
        if let Some(class) = cached {
            return Ok(class);
        }

        CLASS_REGISTRY.with(|registry| registry.borrow_mut().defining.push((type_id, name)));
        let built = {
            let _guard = DefiningGuard;
            T::define(ClassBuilder::new(name, type_id)).build()?
        };
        let class = Rc::new(built);
        tracing::debug!(class = name, keys = class.schema.len(), "built component class");

        CLASS_REGISTRY.with(|registry| {
            registry
                .borrow_mut()
                .classes
                .insert(type_id, Rc::clone(&class));
        });
        Ok(class)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn parent(&self) -> Option<&ClassRef> {
        self.parent.as_ref()
    }

    /// This class followed by its ancestors.
    pub fn chain(&self) -> impl Iterator<Item = &ComponentClass> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// Whether this class is `T` or derives from it.
    pub fn is<T: ComponentType>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.chain().any(|class| class.type_id == id)
    }

    /// Merged state schema, base declarations first.
    pub fn schema(&self) -> Rc<StateSchema> {
        Rc::clone(&self.schema)
    }

    /// The class renderer.
    ///
    /// Without an explicit renderer anywhere in the chain, classes with a
    /// render function use the shared [`IncrementalRenderer`] and the rest
    /// the shared [`ComponentRenderer`].
    pub fn renderer(&self) -> Rc<dyn Renderer> {
        if let Some(renderer) = resolve_static(self, |c| c.renderer.clone(), None) {
            return renderer;
        }
        if self.render_fn().is_some() {
            IncrementalRenderer::shared()
        } else {
            ComponentRenderer::shared()
        }
    }

    /// Whether updates run inline on each `stateChanged`.
    pub fn sync_updates(&self) -> bool {
        resolve_static(self, |c| c.sync_updates, None).unwrap_or(false)
    }

    pub fn render_fn(&self) -> Option<RenderFn> {
        resolve_static(self, |c| c.render_fn.clone(), None)
    }

    /// Most-derived method named `name`.
    pub fn method(&self, name: &str) -> Option<MethodFn> {
        resolve_static(
            self,
            |c| {
                c.methods
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, f)| Rc::clone(f))
            },
            None,
        )
    }

    /// Static property `name`, folded along the chain with `combine`.
    pub fn static_property(
        &self,
        name: &str,
        combine: Option<&dyn Fn(Value, Value) -> Value>,
    ) -> Option<Value> {
        resolve_static(
            self,
            |c| {
                c.statics
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
            },
            combine,
        )
    }

    pub(crate) fn created_hook(&self) -> Option<LifecycleHook> {
        resolve_static(self, |c| c.hooks.created.clone(), None)
    }

    pub(crate) fn rendered_hook(&self) -> Option<RenderedHook> {
        resolve_static(self, |c| c.hooks.rendered.clone(), None)
    }

    pub(crate) fn disposed_hook(&self) -> Option<LifecycleHook> {
        resolve_static(self, |c| c.hooks.disposed.clone(), None)
    }

    pub(crate) fn should_update_hook(&self) -> Option<ShouldUpdateHook> {
        resolve_static(self, |c| c.hooks.should_update.clone(), None)
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name))
            .field("keys", &self.schema.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Walk `class` and its ancestors collecting each level's own value.
///
/// With `combine`, values are folded from the base upwards as
/// `combine(derived, folded_parents)`. Without it the most-derived value
/// wins.
pub fn resolve_static<T>(
    class: &ComponentClass,
    select: impl Fn(&ComponentClass) -> Option<T>,
    combine: Option<&dyn Fn(T, T) -> T>,
) -> Option<T> {
    let Some(combine) = combine else {
        return class.chain().find_map(select);
    };
    let values: Vec<T> = class.chain().filter_map(select).collect();
    values
        .into_iter()
        .rev()
        .reduce(|parents, derived| combine(derived, parents))
}

// ============================================================================
// ClassBuilder
// ============================================================================

/// Describes a class inside [`ComponentType::define`].
///
/// Declaration errors are collected and reported by
/// [`ComponentClass::of`].
pub struct ClassBuilder {
    name: &'static str,
    type_id: TypeId,
    parent: Option<ClassRef>,
    own_state: StateSchema,
    renderer: Option<Rc<dyn Renderer>>,
    sync_updates: Option<bool>,
    render_fn: Option<RenderFn>,
    methods: Vec<(String, MethodFn)>,
    statics: Vec<(String, Value)>,
    hooks: Hooks,
    error: Option<DeclarationError>,
}

impl ClassBuilder {
    fn new(name: &'static str, type_id: TypeId) -> Self {
        Self {
            name,
            type_id,
            parent: None,
            own_state: StateSchema::new(),
            renderer: None,
            sync_updates: None,
            render_fn: None,
            methods: Vec::new(),
            statics: Vec::new(),
            hooks: Hooks::default(),
            error: None,
        }
    }

    fn fail(&mut self, err: DeclarationError) {
        self.error.get_or_insert(err);
    }

    /// Inherit from `P`.
    pub fn extends<P: ComponentType>(mut self) -> Self {
        match ComponentClass::of::<P>() {
            Ok(parent) => self.parent = Some(parent),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Declare a state key; overrides an inherited declaration.
    pub fn state(mut self, key: &str, descriptor: AttributeDescriptor) -> Self {
        if let Err(err) = self.own_state.declare(key, descriptor) {
            self.fail(err);
        }
        self
    }

    pub fn renderer(self, renderer: impl Renderer + 'static) -> Self {
        self.shared_renderer(Rc::new(renderer))
    }

    /// Use an already shared renderer instance.
    pub fn shared_renderer(mut self, renderer: Rc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn sync_updates(mut self, sync: bool) -> Self {
        self.sync_updates = Some(sync);
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&Component, &mut RenderContext<'_>) -> Result<(), RenderError> + 'static,
    {
        self.render_fn = Some(Rc::new(render));
        self
    }

    pub fn method<F>(mut self, name: &str, method: F) -> Self
    where
        F: Fn(&Component, &DomEvent) + 'static,
    {
        self.methods.retain(|(n, _)| n != name);
        self.methods.push((name.to_string(), Rc::new(method)));
        self
    }

    pub fn static_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.statics.retain(|(n, _)| n != name);
        self.statics.push((name.to_string(), value.into()));
        self
    }

    pub fn on_created<F: Fn(&Component) + 'static>(mut self, hook: F) -> Self {
        self.hooks.created = Some(Rc::new(hook));
        self
    }

    pub fn on_rendered<F: Fn(&Component, bool) + 'static>(mut self, hook: F) -> Self {
        self.hooks.rendered = Some(Rc::new(hook));
        self
    }

    pub fn on_disposed<F: Fn(&Component) + 'static>(mut self, hook: F) -> Self {
        self.hooks.disposed = Some(Rc::new(hook));
        self
    }

    pub fn should_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Component, &ChangeMap) -> bool + 'static,
    {
        self.hooks.should_update = Some(Rc::new(hook));
        self
    }

    fn build(self) -> Result<ComponentClass, DeclarationError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut schema = match &self.parent {
            Some(parent) => (*parent.schema).clone(),
            None => base_schema(),
        };
        schema.merge(&self.own_state);

        Ok(ComponentClass {
            name: self.name,
            type_id: self.type_id,
            parent: self.parent,
            schema: Rc::new(schema),
            renderer: self.renderer,
            sync_updates: self.sync_updates,
            render_fn: self.render_fn,
            methods: self.methods,
            statics: self.statics,
            hooks: self.hooks,
        })
    }
}

/// State every component class starts from.
fn base_schema() -> StateSchema {
    StateSchema::new()
        .with("elementClasses", AttributeDescriptor::new().value(""))
        .with("visible", AttributeDescriptor::new().value(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GrandParent;
    struct Parent;
    struct Main;

    impl ComponentType for GrandParent {
        fn define(class: ClassBuilder) -> ClassBuilder {
            class
                .static_value("STATIC_PROP", 1)
                .state("a", AttributeDescriptor::new().value(1))
        }
    }

    impl ComponentType for Parent {
        fn define(class: ClassBuilder) -> ClassBuilder {
            class
                .extends::<GrandParent>()
                .static_value("STATIC_PROP", 2)
                .state("b", AttributeDescriptor::new())
                .method("hello", |_, _| {})
        }
    }

    impl ComponentType for Main {
        fn define(class: ClassBuilder) -> ClassBuilder {
            class
                .extends::<Parent>()
                .static_value("STATIC_PROP", 3)
                .state("a", AttributeDescriptor::new().value(10))
                .sync_updates(true)
        }
    }

    fn add(a: Value, b: Value) -> Value {
        Value::from(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0))
    }

    #[test]
    fn static_property_folds_along_chain() {
        let main = ComponentClass::of::<Main>().unwrap();
        assert_eq!(main.static_property("STATIC_PROP", Some(&add)), Some(Value::from(6)));
        assert_eq!(main.static_property("STATIC_PROP", None), Some(Value::from(3)));
        assert_eq!(main.static_property("MISSING", Some(&add)), None);
    }

    #[test]
    fn combine_receives_derived_first() {
        let main = ComponentClass::of::<Main>().unwrap();
        let concat = |derived: Value, parents: Value| Value::from(format!("{derived}{parents}"));
        assert_eq!(
            main.static_property("STATIC_PROP", Some(&concat)),
            Some(Value::from("321"))
        );
    }

    #[test]
    fn schema_merges_base_to_derived() {
        let main = ComponentClass::of::<Main>().unwrap();
        let schema = main.schema();
        assert_eq!(
            schema.keys().collect::<Vec<_>>(),
            vec!["elementClasses", "visible", "a", "b"]
        );
        assert_eq!(
            schema.get("a").and_then(|d| d.default_value().map(|v| v.resolve())),
            Some(Value::from(10))
        );
    }

    #[test]
    fn classes_are_cached_and_resolve_along_chain() {
        let first = ComponentClass::of::<Main>().unwrap();
        let second = ComponentClass::of::<Main>().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(first.is::<GrandParent>());
        assert!(first.method("hello").is_some());
        assert!(first.sync_updates());
        assert!(!ComponentClass::of::<Parent>().unwrap().sync_updates());
    }

    #[test]
    fn conflicting_state_in_one_class_fails() {
        struct Broken;
        impl ComponentType for Broken {
            fn define(class: ClassBuilder) -> ClassBuilder {
                class
                    .state("x", AttributeDescriptor::new().value(1))
                    .state("x", AttributeDescriptor::new().value(2))
            }
        }
        assert_eq!(
            ComponentClass::of::<Broken>().unwrap_err(),
            DeclarationError::Conflict { key: "x".into() }
        );
    }

    #[test]
    fn inheritance_cycle_is_reported() {
        struct Ouroboros;
        impl ComponentType for Ouroboros {
            fn define(class: ClassBuilder) -> ClassBuilder {
                class.extends::<Ouroboros>()
            }
        }
        let name = std::any::type_name::<Ouroboros>();
        let err = ComponentClass::of::<Ouroboros>().unwrap_err();
        assert_eq!(
            err,
            DeclarationError::InheritanceCycle {
                class: name,
                parent: name,
            }
        );
        assert!(err.to_string().contains("inheritance cycle"));
    }
}
