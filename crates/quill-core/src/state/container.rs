//! The observable state container.
//!
//! A container holds the values of the keys declared in its [`StateSchema`].
//! Accepted writes are recorded in a pending [`ChangeMap`] and announced in
//! one flush:
//!
//! 1. `<key>Changed` for every changed key, in first-write order
//! 2. `stateKeyChanged` for every changed key, same order
//! 3. one `stateChanged` with the whole map
//!
//! # Example
//!
//! ```ignore
//! let schema = StateSchema::new()
//!     .with("foo1", AttributeDescriptor::new())
//!     .with("foo2", AttributeDescriptor::new());
//! let state = StateContainer::new(schema, &Config::new().with("foo1", 1), BatchMode::Deferred);
//! state.on("stateChanged", |event| println!("{:?}", event.changes()));
//! state.set("foo1", 10)?;
//! state.set("foo2", 20)?;
//! scheduler::drain()?; // one stateChanged with both keys
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

use super::batch::{BatchMode, ChangeMap};
use super::descriptor::{AttributeDescriptor, Config, DeclarationError, StateSchema};
use super::validators::{ValidationContext, ValidationError};
use crate::emitter::{Emitter, Event, Payload, SubscriptionId};
use crate::scheduler;
use crate::value::Value;

/// Errors returned by writes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("`{owner}` declares no state key `{key}`")]
    UnknownKey { key: String, owner: String },
}

#[derive(Debug, Clone, Default)]
struct StateEntry {
    value: Value,
    has_been_set: bool,
}

struct ContainerInner {
    owner: String,
    schema: RefCell<Rc<StateSchema>>,
    entries: RefCell<HashMap<String, StateEntry>>,
    pending: RefCell<ChangeMap>,
    flush_scheduled: Cell<bool>,
    flushing: Cell<bool>,
    /// Open [`StateContainer::batch`] scopes
    held: Cell<usize>,
    mode: Cell<BatchMode>,
    disposed: Cell<bool>,
    emitter: Emitter,
}

/// Declared, validated, observable key/value state.
///
/// Cloning yields another handle to the same container.
#[derive(Clone)]
pub struct StateContainer(Rc<ContainerInner>);

impl StateContainer {
    /// Container with `initial` values already applied.
    pub fn new(schema: impl Into<Rc<StateSchema>>, initial: &Config, mode: BatchMode) -> Self {
        Self::for_owner("State", schema, initial, mode)
    }

    /// Container whose validation context names `owner`.
    ///
    /// Initial values count as set but produce no change events. A value
    /// rejected by its validator is dropped and the key keeps its default.
    pub fn for_owner(
        owner: &str,
        schema: impl Into<Rc<StateSchema>>,
        initial: &Config,
        mode: BatchMode,
    ) -> Self {
        let container = Self(Rc::new(ContainerInner {
            owner: owner.to_string(),
            schema: RefCell::new(schema.into()),
            entries: RefCell::new(HashMap::new()),
            pending: RefCell::new(ChangeMap::new()),
            flush_scheduled: Cell::new(false),
            flushing: Cell::new(false),
            held: Cell::new(0),
            mode: Cell::new(mode),
            disposed: Cell::new(false),
            emitter: Emitter::new(),
        }));
        container.apply_initial(initial);
        container
    }

    fn apply_initial(&self, initial: &Config) {
        for (key, value) in initial.iter() {
            let Some(descriptor) = self.descriptor(key) else {
                tracing::debug!(owner = %self.0.owner, key, "ignoring undeclared initial value");
                continue;
            };
            if let Err(err) = self.validate(key, &descriptor, value) {
                tracing::warn!(owner = %self.0.owner, %err, "dropping initial value");
                continue;
            }
            self.0.entries.borrow_mut().insert(
                key.to_string(),
                StateEntry {
                    value: value.clone(),
                    has_been_set: true,
                },
            );
        }
    }

    pub fn owner(&self) -> &str {
        &self.0.owner
    }

    pub fn schema(&self) -> Rc<StateSchema> {
        Rc::clone(&self.0.schema.borrow())
    }

    fn descriptor(&self, key: &str) -> Option<AttributeDescriptor> {
        self.0.schema.borrow().get(key).cloned()
    }

    /// Declare an additional key on this container only.
    pub fn declare(&self, key: &str, descriptor: AttributeDescriptor) -> Result<(), DeclarationError> {
        let mut schema = self.0.schema.borrow_mut();
        Rc::make_mut(&mut schema).declare(key, descriptor)
    }

    pub fn mode(&self) -> BatchMode {
        self.0.mode.get()
    }

    pub fn set_mode(&self, mode: BatchMode) {
        self.0.mode.set(mode);
    }

    /// Current value of `key`, `None` if the key is not declared.
    ///
    /// The first read of a key that was never written resolves its default;
    /// a producer runs at most once.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.0.entries.borrow().get(key) {
            return Some(entry.value.clone());
        }
        let descriptor = self.descriptor(key)?;
        let value = descriptor
            .default_value()
            .map(|default| default.resolve())
            .unwrap_or_default();
        let mut entries = self.0.entries.borrow_mut();
        let entry = entries.entry(key.to_string()).or_insert(StateEntry {
            value,
            has_been_set: false,
        });
        Some(entry.value.clone())
    }

    /// Whether `key` is declared.
    pub fn has(&self, key: &str) -> bool {
        self.0.schema.borrow().contains(key)
    }

    /// Whether `key` was written, by configuration or by [`set`](Self::set).
    pub fn was_set(&self, key: &str) -> bool {
        self.0
            .entries
            .borrow()
            .get(key)
            .is_some_and(|entry| entry.has_been_set)
    }

    /// Declared keys, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.0.schema.borrow().keys().map(str::to_string).collect()
    }

    /// Current value of every declared key.
    pub fn snapshot(&self) -> Config {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key).unwrap_or_default();
                (key, value)
            })
            .collect()
    }

    fn validate(
        &self,
        key: &str,
        descriptor: &AttributeDescriptor,
        value: &Value,
    ) -> Result<(), ValidationError> {
        let Some(validator) = descriptor.get_validator() else {
            return Ok(());
        };
        let context = ValidationContext {
            key,
            owner: &self.0.owner,
        };
        validator
            .check(value, &context)
            .map_err(|reason| ValidationError {
                key: key.to_string(),
                attempted: value.clone(),
                reason,
            })
    }

    /// Write `key`.
    ///
    /// A write to a write-once key that was already set, or to a disposed
    /// container, is silently ignored. A value rejected by the key's
    /// validator leaves the current value in place and records nothing.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StateError> {
        let value = value.into();
        if self.0.disposed.get() {
            tracing::trace!(owner = %self.0.owner, key, "write to disposed state ignored");
            return Ok(());
        }
        let Some(descriptor) = self.descriptor(key) else {
            return Err(StateError::UnknownKey {
                key: key.to_string(),
                owner: self.0.owner.clone(),
            });
        };
        if descriptor.is_write_once() && self.was_set(key) {
            tracing::trace!(owner = %self.0.owner, key, "write-once key already set");
            return Ok(());
        }
        if let Err(err) = self.validate(key, &descriptor, &value) {
            tracing::warn!(owner = %self.0.owner, %err, "rejected state write");
            return Err(err.into());
        }

        let prev_val = self.get(key).unwrap_or_default();
        self.0.entries.borrow_mut().insert(
            key.to_string(),
            StateEntry {
                value: value.clone(),
                has_been_set: true,
            },
        );
        self.0.pending.borrow_mut().record(key, prev_val, value);
        self.schedule_flush();
        Ok(())
    }

    /// Write every pair of `values` in order.
    ///
    /// All writes are attempted; the first error is returned.
    pub fn set_many(&self, values: &Config) -> Result<(), StateError> {
        let mut first_error = None;
        for (key, value) in values.iter() {
            if let Err(err) = self.set(key, value.clone()) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn schedule_flush(&self) {
        match self.0.mode.get() {
            BatchMode::Immediate => {
                if !self.0.flushing.get() && self.0.held.get() == 0 {
                    self.flush();
                }
            }
            BatchMode::Deferred => {
                if self.0.flush_scheduled.replace(true) {
                    return;
                }
                let weak: Weak<ContainerInner> = Rc::downgrade(&self.0);
                scheduler::defer(move || {
                    if let Some(inner) = weak.upgrade() {
                        StateContainer(inner).flush();
                    }
                });
            }
        }
    }

    /// Run `f` with immediate flushes held back.
    ///
    /// Writes made inside `f` collect into one batch, flushed when the
    /// outermost scope returns. Deferred containers flush on the queue as
    /// usual.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.0.held.set(self.0.held.get() + 1);
        let result = {
            let _guard = HeldGuard(self);
            f()
        };
        if self.0.held.get() == 0 && self.0.mode.get() == BatchMode::Immediate && self.has_pending()
        {
            self.flush();
        }
        result
    }

    /// Whether changes are waiting to be flushed.
    pub fn has_pending(&self) -> bool {
        !self.0.pending.borrow().is_empty()
    }

    /// Emit pending changes now.
    ///
    /// Writes made by listeners during the flush start a new batch. In
    /// immediate mode that batch is flushed before this call returns.
    pub fn flush(&self) {
        if self.0.disposed.get() || self.0.flushing.replace(true) {
            return;
        }
        self.0.flush_scheduled.set(false);
        loop {
            let changes = std::mem::take(&mut *self.0.pending.borrow_mut());
            if changes.is_empty() {
                break;
            }
            self.emit_changes(changes);
            if self.0.mode.get() == BatchMode::Deferred || self.0.disposed.get() {
                break;
            }
        }
        self.0.flushing.set(false);
    }

    fn emit_changes(&self, changes: ChangeMap) {
        tracing::debug!(owner = %self.0.owner, keys = changes.len(), "flushing state changes");
        let emitter = &self.0.emitter;
        for change in &changes {
            emitter.emit(
                &format!("{}Changed", change.key),
                Payload::KeyChange(change.clone()),
            );
        }
        for change in &changes {
            emitter.emit("stateKeyChanged", Payload::KeyChange(change.clone()));
        }
        if !self.0.disposed.get() {
            emitter.emit("stateChanged", Payload::Changes(changes));
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.0.emitter
    }

    pub fn on<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.0.emitter.on(name, callback)
    }

    pub fn once<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.0.emitter.once(name, callback)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.0.emitter.off(id)
    }

    pub fn emit(&self, name: &str, payload: Payload) -> bool {
        self.0.emitter.emit(name, payload)
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    /// Drop pending changes and listeners. Later writes are ignored.
    pub fn dispose(&self) {
        if self.0.disposed.replace(true) {
            return;
        }
        *self.0.pending.borrow_mut() = ChangeMap::new();
        self.0.emitter.remove_all_listeners(None);
    }

    pub fn ptr_eq(&self, other: &StateContainer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Closes a [`StateContainer::batch`] scope even if its body panics.
struct HeldGuard<'a>(&'a StateContainer);

impl Drop for HeldGuard<'_> {
    fn drop(&mut self) {
        let held = &self.0.0.held;
        held.set(held.get().saturating_sub(1));
    }
}

impl fmt::Debug for StateContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContainer")
            .field("owner", &self.0.owner)
            .field("keys", &self.keys())
            .field("mode", &self.0.mode.get())
            .finish()
    }
}
