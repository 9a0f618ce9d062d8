//! Quill - reactive component state and render scheduling.
//!
//! A component owns declared, validated, observable attributes. Writes are
//! batched into one `stateChanged` event per turn, and each batch drives a
//! single re-render through the component's renderer into an incremental
//! node tree.
//!
//! # Quick Start
//!
//! ```ignore
//! use quill::prelude::*;
//!
//! struct Counter;
//!
//! impl ComponentType for Counter {
//!     fn define(class: ClassBuilder) -> ClassBuilder {
//!         class
//!             .state("count", AttributeDescriptor::new().value(0).validator(validators::number()))
//!             .method("increment", |component, _event| {
//!                 let count = component.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
//!                 let _ = component.set("count", count + 1);
//!             })
//!             .render(|component, ctx| {
//!                 let count = component.get("count").unwrap_or_default();
//!                 markup!(ctx,
//!                     button { onClick: "increment", "Clicked " {count} " times" }
//!                 )
//!             })
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     quill::logging::init();
//!     let counter = Component::new::<Counter>(Config::new())?;
//!     counter.set("count", 5)?;
//!     scheduler::drain()?;
//!     Ok(())
//! }
//! ```
//!
//! # Update modes
//!
//! | Mode | Flush | Re-render |
//! |------|-------|-----------|
//! | default | once per turn, on the deferred queue | one task per batch |
//! | `sync_updates(true)` | on every write | inline, per write |
//!
//! The deferred queue is drained with [`scheduler::drain`](core::scheduler::drain)
//! or, inside tokio, [`runtime::run_until_idle`].

pub mod logging;

#[cfg(feature = "tokio")]
pub mod runtime;

pub mod prelude {
    //! Common imports for quill applications.
    pub use quill_core::scheduler;
    pub use quill_core::{
        validators, AttributeDescriptor, Children, ClassBuilder, Component, ComponentOptions,
        ComponentRenderer, ComponentType, Config, FunctionConfig, IncrementalRenderer,
        LifecycleState, RenderContext, RenderError, Renderer, Tag, Value,
    };
    pub use quill_dom::{DomEvent, Node};
    pub use quill_macros::markup;
}

// Re-export core types at crate root
pub use quill_core::{
    Component, ComponentError, ComponentType, Config, RenderContext, RenderError, Value,
};
pub use quill_macros::markup;

pub use quill_core as core;
pub use quill_dom as dom;
