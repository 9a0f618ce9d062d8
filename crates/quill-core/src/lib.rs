//! Core types for quill: component state, change batching and the render
//! lifecycle.

pub mod class;
pub mod component;
pub mod emitter;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod value;

// Re-export the component model
pub use class::{resolve_static, ClassBuilder, ClassRef, ComponentClass, ComponentType};
pub use component::{
    Component, ComponentError, ComponentOptions, LifecycleState, RefTarget, WeakComponent,
};

// Re-export rendering types
pub use render::{
    Attrs, Call, Children, ComponentRenderer, FunctionConfig, FunctionTag, IncrementalRenderer,
    RenderContext, RenderError, Renderer, Tag,
};

// Re-export state and events
pub use emitter::{Emitter, EmitterProxy, Event, EventCallback, Payload, SubscriptionId};
pub use scheduler::{SchedulerConfig, SchedulerError};
pub use state::{
    validators, AttributeDescriptor, BatchMode, ChangeMap, Config, DeclarationError, KeyChange,
    StateContainer, StateError, StateSchema, ValidationError, Validator,
};
pub use value::{Object, Value};
