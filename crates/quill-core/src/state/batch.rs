//! Pending change sets.

use crate::value::Value;

/// One key's transition within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    pub key: String,
    pub new_val: Value,
    pub prev_val: Value,
}

/// Ordered changes keyed by state key, in first-write order.
///
/// Recording the same key twice keeps the first `prev_val` and the latest
/// `new_val`, so the map always describes the transition across the whole
/// batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeMap {
    changes: Vec<KeyChange>,
}

impl ChangeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: &str, prev_val: Value, new_val: Value) {
        match self.changes.iter_mut().find(|change| change.key == key) {
            Some(existing) => existing.new_val = new_val,
            None => self.changes.push(KeyChange {
                key: key.to_string(),
                new_val,
                prev_val,
            }),
        }
    }

    /// Fold a later batch into this one.
    pub fn merge(&mut self, later: &ChangeMap) {
        for change in &later.changes {
            self.record(&change.key, change.prev_val.clone(), change.new_val.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&KeyChange> {
        self.changes.iter().find(|change| change.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyChange> {
        self.changes.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|change| change.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangeMap {
    type Item = &'a KeyChange;
    type IntoIter = std::slice::Iter<'a, KeyChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// When a container emits its pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Coalesce writes and flush once on the deferred queue.
    #[default]
    Deferred,
    /// Flush right after each accepted write.
    Immediate,
}
