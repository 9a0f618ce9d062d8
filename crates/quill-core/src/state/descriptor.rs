//! Attribute descriptors and the per-class schema built from them.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::validators::Validator;
use crate::value::Value;

/// Errors raised while declaring state or building a class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("state key `{key}` is already declared with a different descriptor")]
    Conflict { key: String },
    #[error("`{class}` extends `{parent}`, which is still being defined (inheritance cycle)")]
    InheritanceCycle {
        class: &'static str,
        parent: &'static str,
    },
}

/// Default for a key that was never written.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    /// Evaluated at most once per container, on first read.
    Producer(Rc<dyn Fn() -> Value>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Producer(produce) => produce(),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Literal(a), DefaultValue::Literal(b)) => a == b,
            (DefaultValue::Producer(a), DefaultValue::Producer(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(...)"),
        }
    }
}

/// How one state key behaves.
///
/// # Example
///
/// ```ignore
/// let descriptor = AttributeDescriptor::new()
///     .value(1)
///     .validator(Validator::predicate(|v| v.as_f64().is_some_and(|n| n > 0.0)))
///     .write_once(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeDescriptor {
    default: Option<DefaultValue>,
    validator: Option<Validator>,
    write_once: bool,
    internal: bool,
}

impl AttributeDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal default.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Lazily produced default.
    pub fn producer<F: Fn() -> Value + 'static>(mut self, produce: F) -> Self {
        self.default = Some(DefaultValue::Producer(Rc::new(produce)));
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Reject every write after the first.
    pub fn write_once(mut self, write_once: bool) -> Self {
        self.write_once = write_once;
        self
    }

    /// Ignore this key in configuration passed from outside.
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn get_validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    pub fn is_write_once(&self) -> bool {
        self.write_once
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }
}

/// Ordered descriptor table shared by every container of a class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSchema {
    entries: Vec<(String, AttributeDescriptor)>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chaining form of [`declare`](Self::declare) for literal schemas.
    ///
    /// Conflicting redeclarations are resolved in favor of the later one.
    pub fn with(mut self, key: &str, descriptor: AttributeDescriptor) -> Self {
        self.set(key, descriptor);
        self
    }

    /// Register `descriptor` under `key`.
    ///
    /// Redeclaring a key with an identical descriptor is a no-op; a different
    /// one is a [`DeclarationError::Conflict`].
    pub fn declare(
        &mut self,
        key: &str,
        descriptor: AttributeDescriptor,
    ) -> Result<(), DeclarationError> {
        match self.get(key) {
            Some(existing) if *existing == descriptor => Ok(()),
            Some(_) => Err(DeclarationError::Conflict {
                key: key.to_string(),
            }),
            None => {
                self.entries.push((key.to_string(), descriptor));
                Ok(())
            }
        }
    }

    /// Insert or replace, keeping the key's original position.
    fn set(&mut self, key: &str, descriptor: AttributeDescriptor) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = descriptor,
            None => self.entries.push((key.to_string(), descriptor)),
        }
    }

    /// Layer `derived` on top of this schema; derived declarations win.
    pub fn merge(&mut self, derived: &StateSchema) {
        for (key, descriptor) in &derived.entries {
            self.set(key, descriptor.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeDescriptor> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeDescriptor)> {
        self.entries.iter().map(|(key, d)| (key.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered key/value configuration, as passed to constructors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    entries: Vec<(String, Value)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key`, replacing an earlier value in place.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Config::new();
        for (key, value) in iter {
            config.insert(&key.into(), value);
        }
        config
    }
}

impl IntoIterator for Config {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::validators;

    #[test]
    fn identical_redeclaration_is_idempotent() {
        let validator = validators::number();
        let mut schema = StateSchema::new();
        schema
            .declare("foo", AttributeDescriptor::new().value(1).validator(validator.clone()))
            .unwrap();
        schema
            .declare("foo", AttributeDescriptor::new().value(1).validator(validator))
            .unwrap();
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn conflicting_redeclaration_fails() {
        let mut schema = StateSchema::new();
        schema.declare("foo", AttributeDescriptor::new().value(1)).unwrap();
        let err = schema
            .declare("foo", AttributeDescriptor::new().value(2))
            .unwrap_err();
        assert_eq!(err, DeclarationError::Conflict { key: "foo".into() });

        // Distinct closures never compare equal.
        schema
            .declare("bar", AttributeDescriptor::new().validator(validators::any()))
            .unwrap();
        assert!(schema
            .declare("bar", AttributeDescriptor::new().validator(validators::any()))
            .is_err());
    }

    #[test]
    fn merge_lets_derived_win_in_base_order() {
        let mut base = StateSchema::new()
            .with("a", AttributeDescriptor::new().value(1))
            .with("b", AttributeDescriptor::new().value(2));
        let derived = StateSchema::new()
            .with("c", AttributeDescriptor::new())
            .with("a", AttributeDescriptor::new().value(10));
        base.merge(&derived);

        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(
            base.get("a").unwrap().default_value(),
            Some(&DefaultValue::Literal(10.into()))
        );
    }

    #[test]
    fn config_keeps_insertion_order() {
        let config: Config = [("b", 1), ("a", 2), ("b", 3)].into_iter().collect();
        let pairs: Vec<_> = config.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(
            pairs,
            vec![("b".to_string(), Value::from(3)), ("a".to_string(), Value::from(2))]
        );
    }
}
