//! Node tree and incremental tree builder for quill.
//!
//! This crate is the tree-building engine the component core renders into:
//! a small reference counted node tree with event dispatch, and an
//! [`IncrementalDom`] builder that reconciles imperative open/close/text
//! calls against the nodes already in place.

pub mod builder;
pub mod node;

pub use builder::{AttrChange, BuilderError, IncrementalDom, Opened, TreeBuilder};
pub use node::{html_escape, AttrValue, DomEvent, Listener, Node, Snapshot};
