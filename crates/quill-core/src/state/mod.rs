//! Declared, validated, observable component state.
//!
//! - [`StateSchema`]: ordered table of [`AttributeDescriptor`]s, built once
//!   per component class and shared by its instances
//! - [`StateContainer`]: per-instance values plus batched change events
//! - [`validators`]: reusable value checks

mod batch;
mod container;
mod descriptor;
pub mod validators;

pub use batch::{BatchMode, ChangeMap, KeyChange};
pub use container::{StateContainer, StateError};
pub use descriptor::{AttributeDescriptor, Config, DeclarationError, DefaultValue, StateSchema};
pub use validators::{ValidationContext, ValidationError, Validator};
