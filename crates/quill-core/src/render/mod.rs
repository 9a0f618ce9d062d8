//! Renderers: the strategy turning a component into nodes.
//!
//! A [`Renderer`] is a shared, stateless service. Every instance of a class
//! uses the class renderer unless constructed with its own through
//! [`ComponentOptions`](crate::component::ComponentOptions).
//!
//! - [`ComponentRenderer`] keeps whatever element the component adopted.
//! - [`IncrementalRenderer`] runs the class render function against a
//!   [`RenderContext`] and reconciles the result in place.

mod context;
mod incremental;

use std::rc::Rc;

use quill_dom::{BuilderError, TreeBuilder};
use thiserror::Error;

use crate::component::{Component, ComponentError};
use crate::state::{ChangeMap, DeclarationError, StateError};

pub use context::{
    Attrs, Call, Children, ClassSource, FunctionConfig, FunctionTag, RenderContext, Tag,
    listener_event,
};
pub use incremental::IncrementalRenderer;

/// Errors raised while rendering or updating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("render failed: {0}")]
    Failed(String),
}

impl From<ComponentError> for RenderError {
    fn from(err: ComponentError) -> Self {
        match err {
            ComponentError::Declaration(err) => RenderError::Declaration(err),
            ComponentError::State(err) => RenderError::State(err),
            ComponentError::Render(err) => err,
        }
    }
}

/// Turns a component into output nodes.
///
/// Implementations may override only `update` and keep the default that
/// re-runs `render`, or override `render` alone.
pub trait Renderer {
    /// Produce the component's output.
    ///
    /// By return, the component's element must be a new root node, `None`
    /// when there is no output, or the externally supplied node it adopted.
    fn render(&self, component: &Component) -> Result<(), RenderError>;

    /// Bring the output up to date with `changes`.
    fn update(&self, component: &Component, changes: &ChangeMap) -> Result<(), RenderError> {
        let _ = changes;
        self.render(component)
    }

    /// Place the component's output at the builder's current position.
    fn render_inline(
        &self,
        component: &Component,
        builder: &mut dyn TreeBuilder,
    ) -> Result<(), RenderError> {
        if component.element().is_none() {
            self.render(component)?;
        }
        if let Some(element) = component.element() {
            builder.adopt(&element);
        }
        Ok(())
    }
}

/// The default renderer: keeps an adopted element and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentRenderer;

thread_local! {
    static COMPONENT_RENDERER: Rc<ComponentRenderer> = Rc::new(ComponentRenderer);
}

impl ComponentRenderer {
    /// The instance shared by every class that does not pick a renderer.
    pub fn shared() -> Rc<dyn Renderer> {
        COMPONENT_RENDERER.with(|renderer| Rc::clone(renderer) as Rc<dyn Renderer>)
    }
}

impl Renderer for ComponentRenderer {
    fn render(&self, _component: &Component) -> Result<(), RenderError> {
        Ok(())
    }
}
