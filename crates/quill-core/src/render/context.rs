//! The render context handed to render functions.
//!
//! Render functions describe their output through imperative calls:
//!
//! ```ignore
//! ctx.open("div", None, vec![("class".into(), "box".into())])?;
//! ctx.void("input", None, vec![("ref".into(), "field".into())])?;
//! ctx.open(Tag::component::<Child>(), Some("a".into()), vec![])?;
//! ctx.text("forwarded to Child")?;
//! ctx.close(Tag::component::<Child>())?;
//! ctx.close("div")?;
//! ```
//!
//! Element tags go straight to the tree builder. Component and function
//! tags capture every call up to their matching close as children, then
//! delegate: a component tag creates or reconfigures a child component and
//! places its output here; a function tag is called inline.

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use quill_dom::{AttrValue, BuilderError, Listener, Node, TreeBuilder};

use super::RenderError;
use crate::class::{ClassRef, ComponentClass, ComponentType};
use crate::component::{Component, RefTarget, WeakComponent};
use crate::state::{Config, DeclarationError};
use crate::value::Value;

/// Attribute name/value pairs passed at a call site.
pub type Attrs = Vec<(String, Value)>;

// ============================================================================
// Tags
// ============================================================================

/// A component class named by a tag.
#[derive(Clone)]
pub enum ClassSource {
    Resolved(ClassRef),
    /// Resolved on first use, so tags can be built before the class is.
    Lazy {
        type_id: TypeId,
        name: &'static str,
        resolve: fn() -> Result<ClassRef, DeclarationError>,
    },
}

impl ClassSource {
    pub fn resolve(&self) -> Result<ClassRef, DeclarationError> {
        match self {
            ClassSource::Resolved(class) => Ok(Rc::clone(class)),
            ClassSource::Lazy { resolve, .. } => resolve(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            ClassSource::Resolved(class) => class.type_id(),
            ClassSource::Lazy { type_id, .. } => *type_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassSource::Resolved(class) => class.name(),
            ClassSource::Lazy { name, .. } => name,
        }
    }
}

type FunctionFn = dyn Fn(&FunctionConfig, &mut RenderContext<'_>) -> Result<(), RenderError>;

/// A stateless sub-render used as a tag.
#[derive(Clone)]
pub struct FunctionTag(Rc<FunctionFn>);

impl FunctionTag {
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&FunctionConfig, &mut RenderContext<'_>) -> Result<(), RenderError> + 'static,
    {
        Self(Rc::new(render))
    }

    pub fn call(&self, config: &FunctionConfig, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        (self.0)(config, ctx)
    }
}

impl fmt::Debug for FunctionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FunctionTag(...)")
    }
}

/// What an open, close or void call names.
#[derive(Clone)]
pub enum Tag {
    Element(String),
    Component(ClassSource),
    Function(FunctionTag),
}

impl Tag {
    pub fn element(name: &str) -> Self {
        Tag::Element(name.to_string())
    }

    pub fn component<T: ComponentType>() -> Self {
        Tag::Component(ClassSource::Lazy {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            resolve: ComponentClass::of::<T>,
        })
    }

    pub fn class(class: ClassRef) -> Self {
        Tag::Component(ClassSource::Resolved(class))
    }

    pub fn function<F>(render: F) -> Self
    where
        F: Fn(&FunctionConfig, &mut RenderContext<'_>) -> Result<(), RenderError> + 'static,
    {
        Tag::Function(FunctionTag::new(render))
    }

    fn describe(&self) -> String {
        match self {
            Tag::Element(name) => name.clone(),
            Tag::Component(source) => source.name().to_string(),
            Tag::Function(_) => "<function>".to_string(),
        }
    }

    /// Whether `close` ends an element opened with `self`.
    ///
    /// Function tags have no identity, so any function close matches.
    fn is_closed_by(&self, close: &Tag) -> bool {
        match (self, close) {
            (Tag::Element(a), Tag::Element(b)) => a == b,
            (Tag::Component(a), Tag::Component(b)) => a.type_id() == b.type_id(),
            (Tag::Function(_), Tag::Function(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Element(name) => write!(f, "Element({name})"),
            Tag::Component(source) => write!(f, "Component({})", source.name()),
            Tag::Function(_) => f.write_str("Function"),
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::element(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::Element(name)
    }
}

impl From<ClassRef> for Tag {
    fn from(class: ClassRef) -> Self {
        Tag::class(class)
    }
}

impl From<FunctionTag> for Tag {
    fn from(function: FunctionTag) -> Self {
        Tag::Function(function)
    }
}

// ============================================================================
// Captured children
// ============================================================================

/// One recorded render call.
#[derive(Debug, Clone)]
pub enum Call {
    Open {
        tag: Tag,
        key: Option<String>,
        attrs: Attrs,
    },
    Close(Tag),
    Void {
        tag: Tag,
        key: Option<String>,
        attrs: Attrs,
    },
    Text(String),
    Children(Children),
}

/// Calls captured between a component or function tag's open and close.
///
/// Replayed with [`RenderContext::render_children`]. Listeners named by
/// method and refs inside resolve against the component that wrote them,
/// not the one replaying them.
#[derive(Clone, Default)]
pub struct Children {
    owner: Option<WeakComponent>,
    calls: Rc<Vec<Call>>,
}

impl Children {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.calls.iter()).finish()
    }
}

/// What a function tag receives.
#[derive(Debug, Clone, Default)]
pub struct FunctionConfig {
    pub attrs: Config,
    pub key: Option<String>,
    pub children: Children,
}

impl FunctionConfig {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }
}

struct Capture {
    tag: Tag,
    key: Option<String>,
    attrs: Attrs,
    calls: Vec<Call>,
    /// Opens seen inside the capture that are not closed yet
    depth: usize,
    owner: Component,
}

// ============================================================================
// Listeners
// ============================================================================

/// Event name bound by a listener attribute.
///
/// `onClick` binds `click`, `data-onclick` binds `click`; anything else is a
/// plain attribute.
pub fn listener_event(attr: &str) -> Option<String> {
    if let Some(event) = attr.strip_prefix("data-on") {
        return (!event.is_empty()).then(|| event.to_ascii_lowercase());
    }
    let event = attr.strip_prefix("on")?;
    event
        .chars()
        .next()
        .filter(char::is_ascii_uppercase)
        .map(|_| event.to_ascii_lowercase())
}

enum Binding {
    Function(Listener),
    Method(String),
}

impl Binding {
    fn into_listener(self, owner: &Component) -> Listener {
        match self {
            Binding::Function(listener) => listener,
            Binding::Method(method) => {
                let owner = owner.downgrade();
                Listener::new(move |event| {
                    if let Some(owner) = owner.upgrade() {
                        owner.call_method(&method, event);
                    }
                })
            }
        }
    }
}

// ============================================================================
// RenderContext
// ============================================================================

/// Drives a tree builder on behalf of a rendering component.
pub struct RenderContext<'a> {
    builder: &'a mut dyn TreeBuilder,
    component: Component,
    /// Components whose markup is being replayed, innermost last
    owners: Vec<Component>,
    root_opened: bool,
    capture: Option<Capture>,
}

impl<'a> RenderContext<'a> {
    pub fn new(builder: &'a mut dyn TreeBuilder, component: &Component) -> Self {
        Self {
            builder,
            component: component.clone(),
            owners: vec![component.clone()],
            root_opened: false,
            capture: None,
        }
    }

    /// The component being rendered.
    pub fn component(&self) -> &Component {
        &self.component
    }

    /// The component listeners and refs currently resolve against.
    pub fn owner(&self) -> &Component {
        self.owners.last().unwrap_or(&self.component)
    }

    pub fn open(
        &mut self,
        tag: impl Into<Tag>,
        key: Option<String>,
        attrs: Attrs,
    ) -> Result<(), RenderError> {
        let tag = tag.into();
        if let Some(capture) = self.capture.as_mut() {
            capture.depth += 1;
            capture.calls.push(Call::Open { tag, key, attrs });
            return Ok(());
        }
        match tag {
            Tag::Element(name) => {
                self.open_element(&name, key, attrs, false)?;
            }
            tag => {
                self.capture = Some(Capture {
                    tag,
                    key,
                    attrs,
                    calls: Vec::new(),
                    depth: 0,
                    owner: self.owner().clone(),
                });
            }
        }
        Ok(())
    }

    pub fn close(&mut self, tag: impl Into<Tag>) -> Result<(), RenderError> {
        let tag = tag.into();
        if let Some(capture) = self.capture.as_mut()
            && capture.depth > 0
        {
            capture.depth -= 1;
            capture.calls.push(Call::Close(tag));
            return Ok(());
        }
        if let Some(capture) = self.capture.take() {
            if !capture.tag.is_closed_by(&tag) {
                return Err(BuilderError::MismatchedClose {
                    expected: capture.tag.describe(),
                    found: tag.describe(),
                }
                .into());
            }
            return self.delegate(capture);
        }
        match tag {
            Tag::Element(name) => {
                self.builder.close_element(&name)?;
                Ok(())
            }
            other => Err(BuilderError::NothingOpen(other.describe()).into()),
        }
    }

    /// Open and close in one call.
    pub fn void(
        &mut self,
        tag: impl Into<Tag>,
        key: Option<String>,
        attrs: Attrs,
    ) -> Result<(), RenderError> {
        let tag = tag.into();
        if let Some(capture) = self.capture.as_mut() {
            capture.calls.push(Call::Void { tag, key, attrs });
            return Ok(());
        }
        match tag {
            Tag::Element(name) => {
                self.open_element(&name, key, attrs, true)?;
                Ok(())
            }
            tag => {
                let capture = Capture {
                    tag,
                    key,
                    attrs,
                    calls: Vec::new(),
                    depth: 0,
                    owner: self.owner().clone(),
                };
                self.delegate(capture)
            }
        }
    }

    pub fn text(&mut self, content: &str) -> Result<(), RenderError> {
        if let Some(capture) = self.capture.as_mut() {
            capture.calls.push(Call::Text(content.to_string()));
            return Ok(());
        }
        self.builder.text(content);
        Ok(())
    }

    /// Replay forwarded children here.
    pub fn render_children(&mut self, children: &Children) -> Result<(), RenderError> {
        if let Some(capture) = self.capture.as_mut() {
            capture.calls.push(Call::Children(children.clone()));
            return Ok(());
        }
        let owner = children.owner.as_ref().and_then(WeakComponent::upgrade);
        if let Some(owner) = &owner {
            self.owners.push(owner.clone());
        }
        let result = children.calls.iter().try_for_each(|call| self.replay(call));
        if owner.is_some() {
            self.owners.pop();
        }
        result
    }

    fn replay(&mut self, call: &Call) -> Result<(), RenderError> {
        match call.clone() {
            Call::Open { tag, key, attrs } => self.open(tag, key, attrs),
            Call::Close(tag) => self.close(tag),
            Call::Void { tag, key, attrs } => self.void(tag, key, attrs),
            Call::Text(content) => self.text(&content),
            Call::Children(children) => self.render_children(&children),
        }
    }

    /// Fail if a component or function tag was left open.
    pub fn finish(self) -> Result<(), RenderError> {
        match self.capture {
            Some(capture) => Err(BuilderError::UnclosedElements(capture.depth + 1).into()),
            None => Ok(()),
        }
    }

    fn open_element(
        &mut self,
        tag: &str,
        key: Option<String>,
        attrs: Attrs,
        void: bool,
    ) -> Result<Node, RenderError> {
        let owner = self.owner().clone();
        let mut ref_name = None;
        let mut bindings = Vec::new();
        let mut builder_attrs: Vec<(String, AttrValue)> = Vec::with_capacity(attrs.len());

        for (name, value) in attrs {
            if name == "ref" {
                match value.as_str() {
                    Some(r) => ref_name = Some(r.to_string()),
                    None => tracing::warn!(tag, kind = value.kind(), "ref must be a string"),
                }
                continue;
            }
            if let Some(event) = listener_event(&name) {
                let (attr, binding) = match value {
                    Value::Listener(listener) => (
                        AttrValue::Listener(listener.clone()),
                        Binding::Function(listener),
                    ),
                    Value::Str(method) => (AttrValue::Str(method.clone()), Binding::Method(method)),
                    Value::Null => continue,
                    other => {
                        tracing::warn!(tag, attr = %name, kind = other.kind(), "ignoring listener value");
                        continue;
                    }
                };
                builder_attrs.push((name.clone(), attr));
                bindings.push((name, event, binding));
                continue;
            }
            if let Some(attr) = value.to_attribute() {
                builder_attrs.push((name, attr));
            }
        }

        if self.builder.depth() == 0 && !self.root_opened {
            self.root_opened = true;
            self.decorate_root(&mut builder_attrs);
        }

        let opened = if void {
            self.builder
                .void_element(tag, key.as_deref(), &builder_attrs)?
        } else {
            self.builder.open_element(tag, key.as_deref(), &builder_attrs)
        };

        for change in opened.changes.iter().filter(|c| c.current.is_none()) {
            if let Some(event) = listener_event(&change.name) {
                opened.node.remove_listener(&event);
            }
        }
        for (attr, event, binding) in bindings {
            if opened.changed(&attr) || opened.node.listener(&event).is_none() {
                opened.node.set_listener(&event, binding.into_listener(&owner));
            }
        }

        if let Some(name) = ref_name {
            owner.register_ref(&name, RefTarget::Node(opened.node.clone()));
        }
        Ok(opened.node)
    }

    /// Merge `elementClasses` into the root's `class` and hide invisible
    /// components.
    fn decorate_root(&self, attrs: &mut Vec<(String, AttrValue)>) {
        let extra = self
            .component
            .get("elementClasses")
            .and_then(|value| value.to_attribute())
            .and_then(|attr| attr.as_str().map(str::to_string))
            .unwrap_or_default();

        if !extra.trim().is_empty() {
            let index = attrs.iter().position(|(name, _)| name == "class");
            let own = index
                .and_then(|i| attrs[i].1.as_str().map(str::to_string))
                .unwrap_or_default();
            let mut classes: Vec<&str> = Vec::new();
            for class in own.split_whitespace().chain(extra.split_whitespace()) {
                if !classes.contains(&class) {
                    classes.push(class);
                }
            }
            let merged = AttrValue::Str(classes.join(" "));
            match index {
                Some(i) => attrs[i].1 = merged,
                None => attrs.push(("class".to_string(), merged)),
            }
        }

        if self.component.get("visible") == Some(Value::Bool(false)) {
            attrs.push(("hidden".to_string(), AttrValue::Bool(true)));
        }
    }

    /// Hand a captured component or function tag its content.
    fn delegate(&mut self, capture: Capture) -> Result<(), RenderError> {
        let Capture {
            tag,
            key,
            attrs,
            calls,
            owner,
            ..
        } = capture;
        let children = Children {
            owner: Some(owner.downgrade()),
            calls: Rc::new(calls),
        };

        match tag {
            Tag::Component(source) => {
                let class = source.resolve()?;
                let mut ref_name = None;
                let mut config = Config::new();
                for (name, value) in attrs {
                    if name == "ref" {
                        ref_name = value.as_str().map(str::to_string);
                    } else {
                        config.insert(&name, value);
                    }
                }
                let child = self.component.claim_child(
                    &class,
                    key.as_deref(),
                    ref_name.as_deref(),
                    config,
                    children,
                )?;
                child.renderer().render_inline(&child, &mut *self.builder)?;
                if let Some(name) = ref_name {
                    owner.register_ref(&name, RefTarget::Component(child));
                }
                Ok(())
            }
            Tag::Function(function) => {
                let config = FunctionConfig {
                    attrs: attrs.into_iter().collect(),
                    key,
                    children,
                };
                function.call(&config, self)
            }
            Tag::Element(name) => Err(RenderError::Failed(format!(
                "element `{name}` cannot take captured children"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_attribute_names() {
        assert_eq!(listener_event("onClick"), Some("click".to_string()));
        assert_eq!(listener_event("onMouseDown"), Some("mousedown".to_string()));
        assert_eq!(listener_event("data-onclick"), Some("click".to_string()));
        assert_eq!(listener_event("one"), None);
        assert_eq!(listener_event("on"), None);
        assert_eq!(listener_event("data-on"), None);
        assert_eq!(listener_event("class"), None);
    }

    #[test]
    fn close_matching() {
        let f = Tag::function(|_, _| Ok(()));
        let g = Tag::function(|_, _| Ok(()));
        assert!(f.is_closed_by(&g));
        assert!(Tag::from("div").is_closed_by(&Tag::from("div")));
        assert!(!Tag::from("div").is_closed_by(&Tag::from("span")));
        assert!(!Tag::from("div").is_closed_by(&f));
    }
}
