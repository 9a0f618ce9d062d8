//! Publish/subscribe emitter used by state containers and components.
//!
//! Listeners are registered per event name and run in registration order.
//! A listener registered with [`Emitter::on_default`] runs after every
//! regular listener, and only if none of them called
//! [`Event::prevent_default`] while the emitter was in facade mode.
//!
//! # Example
//!
//! ```ignore
//! let emitter = Emitter::new();
//! emitter.set_should_use_facade(true);
//! emitter.on("save", |event| event.prevent_default());
//! emitter.on_default("save", |_| println!("never runs"));
//! assert!(!emitter.emit("save", Payload::Empty));
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::state::{ChangeMap, KeyChange};
use crate::value::Value;

/// Handle returned by [`Emitter::on`] and friends, used to unsubscribe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionId(pub usize);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global counter for subscription and relay ids.
static NEXT_SUBSCRIPTION_ID: AtomicUsize = AtomicUsize::new(0);

fn next_subscription_id() -> SubscriptionId {
    SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::SeqCst))
}

/// Data carried by an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Args(Vec<Value>),
    /// A single key change (`<key>Changed`, `stateKeyChanged`).
    KeyChange(KeyChange),
    /// A whole batch (`stateChanged`, `stateSynced`).
    Changes(ChangeMap),
    /// Emitted with `rendered`.
    Rendered { first_render: bool },
}

/// An event as seen by listeners.
pub struct Event {
    name: String,
    payload: Payload,
    facade: bool,
    default_prevented: Cell<bool>,
}

impl Event {
    fn new(name: &str, payload: Payload, facade: bool) -> Self {
        Self {
            name: name.to_string(),
            payload,
            facade,
            default_prevented: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Skip default listeners and proxy relays for this emission.
    ///
    /// Only honored when the emitter uses a facade.
    pub fn prevent_default(&self) {
        if self.facade {
            self.default_prevented.set(true);
        } else {
            tracing::trace!(event = %self.name, "prevent_default ignored without a facade");
        }
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn key_change(&self) -> Option<&KeyChange> {
        match &self.payload {
            Payload::KeyChange(change) => Some(change),
            _ => None,
        }
    }

    pub fn changes(&self) -> Option<&ChangeMap> {
        match &self.payload {
            Payload::Changes(changes) => Some(changes),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Value] {
        match &self.payload {
            Payload::Args(args) => args,
            _ => &[],
        }
    }

    pub fn first_render(&self) -> Option<bool> {
        match self.payload {
            Payload::Rendered { first_render } => Some(first_render),
            _ => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("default_prevented", &self.default_prevented.get())
            .finish()
    }
}

/// Type alias for emitter callbacks.
pub type EventCallback = Rc<dyn Fn(&Event)>;

struct Subscription {
    id: SubscriptionId,
    name: String,
    callback: EventCallback,
    once: bool,
    default: bool,
}

/// Which events a relay forwards.
#[derive(Clone)]
enum RelayFilter {
    All,
    Except(Vec<String>),
    Only(Vec<String>),
}

impl RelayFilter {
    fn allows(&self, name: &str) -> bool {
        match self {
            RelayFilter::All => true,
            RelayFilter::Except(names) => !names.iter().any(|n| n == name),
            RelayFilter::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

struct Relay {
    id: SubscriptionId,
    target: Weak<EmitterInner>,
    filter: RelayFilter,
}

#[derive(Default)]
struct EmitterInner {
    subscriptions: RefCell<Vec<Subscription>>,
    relays: RefCell<Vec<Relay>>,
    use_facade: Cell<bool>,
}

/// An ordered listener registry keyed by event name.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Emitter {
    inner: Rc<EmitterInner>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe<F>(&self, name: &str, callback: F, once: bool, default: bool) -> SubscriptionId
    where
        F: Fn(&Event) + 'static,
    {
        let id = next_subscription_id();
        self.inner.subscriptions.borrow_mut().push(Subscription {
            id,
            name: name.to_string(),
            callback: Rc::new(callback),
            once,
            default,
        });
        id
    }

    /// Subscribe `callback` to `name`.
    pub fn on<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.subscribe(name, callback, false, false)
    }

    /// Subscribe a default listener, skipped when a regular listener prevents
    /// the default action.
    pub fn on_default<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.subscribe(name, callback, false, true)
    }

    /// Subscribe `callback` for the next emission of `name` only.
    pub fn once<F: Fn(&Event) + 'static>(&self, name: &str, callback: F) -> SubscriptionId {
        self.subscribe(name, callback, true, false)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Remove every listener for `name`, or every listener when `None`.
    pub fn remove_all_listeners(&self, name: Option<&str>) {
        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        match name {
            Some(name) => subscriptions.retain(|s| s.name != name),
            None => subscriptions.clear(),
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .subscriptions
            .borrow()
            .iter()
            .filter(|s| s.name == name)
            .count()
    }

    /// Wrap payloads in a facade that honors [`Event::prevent_default`].
    pub fn set_should_use_facade(&self, use_facade: bool) {
        self.inner.use_facade.set(use_facade);
    }

    pub fn should_use_facade(&self) -> bool {
        self.inner.use_facade.get()
    }

    /// Emit `name` with `payload`.
    ///
    /// Returns `false` if a listener prevented the default action.
    pub fn emit(&self, name: &str, payload: Payload) -> bool {
        let event = Event::new(name, payload, self.inner.use_facade.get());

        // Snapshot so listeners may subscribe or unsubscribe while we run.
        let (regular, defaults) = {
            let mut subscriptions = self.inner.subscriptions.borrow_mut();
            let mut regular = Vec::new();
            let mut defaults = Vec::new();
            for subscription in subscriptions.iter().filter(|s| s.name == name) {
                if subscription.default {
                    defaults.push(Rc::clone(&subscription.callback));
                } else {
                    regular.push(Rc::clone(&subscription.callback));
                }
            }
            subscriptions.retain(|s| !(s.once && s.name == name));
            (regular, defaults)
        };

        for callback in regular {
            callback(&event);
        }
        if event.is_default_prevented() {
            return false;
        }
        for callback in defaults {
            callback(&event);
        }

        let targets: Vec<Emitter> = {
            let mut relays = self.inner.relays.borrow_mut();
            relays.retain(|relay| relay.target.strong_count() > 0);
            relays
                .iter()
                .filter(|relay| relay.filter.allows(name))
                .filter_map(|relay| relay.target.upgrade())
                .map(|inner| Emitter { inner })
                .collect()
        };
        for target in targets {
            target.emit(name, event.payload.clone());
        }

        !event.is_default_prevented()
    }

    fn add_relay(&self, target: &Emitter, filter: RelayFilter) -> SubscriptionId {
        let id = next_subscription_id();
        self.inner.relays.borrow_mut().push(Relay {
            id,
            target: Rc::downgrade(&target.inner),
            filter,
        });
        id
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.inner.subscriptions.borrow().len())
            .field("facade", &self.inner.use_facade.get())
            .finish()
    }
}

/// Re-emits events from one emitter on another.
///
/// The proxy holds neither emitter alive. Relaying stops on [`dispose`] or
/// when either side is dropped.
///
/// [`dispose`]: EmitterProxy::dispose
pub struct EmitterProxy {
    origin: Weak<EmitterInner>,
    relay: SubscriptionId,
}

impl EmitterProxy {
    /// Relay every event from `origin` to `target`.
    pub fn new(origin: &Emitter, target: &Emitter) -> Self {
        Self::with_filter(origin, target, RelayFilter::All)
    }

    /// Relay every event except the named ones.
    pub fn with_blacklist(origin: &Emitter, target: &Emitter, names: &[&str]) -> Self {
        let names = names.iter().map(|n| n.to_string()).collect();
        Self::with_filter(origin, target, RelayFilter::Except(names))
    }

    /// Relay only the named events.
    pub fn with_whitelist(origin: &Emitter, target: &Emitter, names: &[&str]) -> Self {
        let names = names.iter().map(|n| n.to_string()).collect();
        Self::with_filter(origin, target, RelayFilter::Only(names))
    }

    fn with_filter(origin: &Emitter, target: &Emitter, filter: RelayFilter) -> Self {
        let relay = origin.add_relay(target, filter);
        Self {
            origin: Rc::downgrade(&origin.inner),
            relay,
        }
    }

    /// Stop relaying.
    pub fn dispose(&self) {
        if let Some(origin) = self.origin.upgrade() {
            origin.relays.borrow_mut().retain(|r| r.id != self.relay);
        }
    }
}
