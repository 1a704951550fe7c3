//! Immutable key-value snapshots passed between actions.
//!
//! Every mutating operation is copy-on-write: it returns a new [`State`] and
//! leaves the receiver untouched, so one execution context can keep older
//! snapshots around while it keeps advancing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;

/// An immutable mapping of string keys to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    bindings: BTreeMap<String, Value>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    /// Get the value bound to `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.bindings.get(key).cloned().unwrap_or(default)
    }

    /// Check whether `key` is bound.
    pub fn contains_key(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// Iterate over the bound keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the state has no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Borrow the underlying bindings.
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    /// Return a new state with the given keys overwritten.
    pub fn update<I, K, V>(&self, bindings: I) -> State
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut next = self.bindings.clone();
        for (key, value) in bindings {
            next.insert(key.into(), value.into());
        }
        State { bindings: next }
    }

    /// Return a new state with `other`'s bindings layered on top of this one.
    pub fn merge(&self, other: &State) -> State {
        let mut next = self.bindings.clone();
        next.extend(other.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        State { bindings: next }
    }

    /// Return a new state holding only the listed keys that are present.
    pub fn subset<S: AsRef<str>>(&self, keys: &[S]) -> State {
        let bindings = keys
            .iter()
            .filter_map(|k| {
                self.bindings
                    .get_key_value(k.as_ref())
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        State { bindings }
    }

    /// Return a new state without the listed keys.
    pub fn wipe_delete<S: AsRef<str>>(&self, keys: &[S]) -> State {
        let mut next = self.bindings.clone();
        for key in keys {
            next.remove(key.as_ref());
        }
        State { bindings: next }
    }

    /// Return a new state keeping only the listed keys.
    pub fn wipe_keep<S: AsRef<str>>(&self, keys: &[S]) -> State {
        self.subset(keys)
    }

    /// Return a new state with `value` pushed onto the list at `key`.
    ///
    /// An absent key starts a fresh list. A key bound to anything other than
    /// a list is an error.
    pub fn append(&self, key: &str, value: impl Into<Value>) -> Result<State, ActionError> {
        let mut next = self.bindings.clone();
        match next
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(value.into()),
            _ => {
                return Err(ActionError::InvalidValue {
                    key: key.to_string(),
                    expected: "list",
                })
            }
        }
        Ok(State { bindings: next })
    }

    /// Return a new state with the integer at `key` increased by `delta`.
    ///
    /// An absent key counts as zero. A sum outside the `i64` range is an
    /// error rather than a wrapped value.
    pub fn increment(&self, key: &str, delta: i64) -> Result<State, ActionError> {
        let current = match self.bindings.get(key) {
            None => 0,
            Some(value) => value.as_i64().ok_or_else(|| ActionError::InvalidValue {
                key: key.to_string(),
                expected: "integer",
            })?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| ActionError::InvalidValue {
                key: key.to_string(),
                expected: "integer within range",
            })?;
        Ok(self.update([(key, next)]))
    }
}

impl From<BTreeMap<String, Value>> for State {
    fn from(bindings: BTreeMap<String, Value>) -> Self {
        Self { bindings }
    }
}

impl From<serde_json::Map<String, Value>> for State {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self {
            bindings: map.into_iter().collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_leaves_original_untouched() {
        let state = State::from_iter([("count", 0)]);
        let next = state.update([("count", 1)]);

        assert_eq!(state.get("count"), Some(&json!(0)));
        assert_eq!(next.get("count"), Some(&json!(1)));
    }

    #[test]
    fn test_get_or_default() {
        let state = State::new();
        assert_eq!(state.get_or("count", json!(0)), json!(0));
        assert!(state.get("count").is_none());
    }

    #[test]
    fn test_merge_prefers_other() {
        let a = State::from_iter([("x", json!(1)), ("y", json!(2))]);
        let b = State::from_iter([("y", json!(3))]);
        let merged = a.merge(&b);
        assert_eq!(merged.get("x"), Some(&json!(1)));
        assert_eq!(merged.get("y"), Some(&json!(3)));
    }

    #[test]
    fn test_subset_and_wipe() {
        let state = State::from_iter([("a", 1), ("b", 2), ("c", 3)]);

        let kept = state.wipe_keep(&["a", "missing"]);
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["a"]);

        let deleted = state.wipe_delete(&["a"]);
        assert_eq!(deleted.keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_append() {
        let state = State::new().append("log", "first").unwrap();
        let state = state.append("log", "second").unwrap();
        assert_eq!(state.get("log"), Some(&json!(["first", "second"])));

        let scalar = State::from_iter([("log", 1)]);
        assert!(matches!(
            scalar.append("log", "x"),
            Err(ActionError::InvalidValue { expected: "list", .. })
        ));
    }

    #[test]
    fn test_increment() {
        let state = State::new().increment("count", 2).unwrap();
        let state = state.increment("count", 3).unwrap();
        assert_eq!(state.get("count"), Some(&json!(5)));

        let text = State::from_iter([("count", "ten")]);
        assert!(text.increment("count", 1).is_err());

        let max = State::from_iter([("count", i64::MAX)]);
        assert_eq!(
            max.increment("count", 1),
            Err(ActionError::InvalidValue {
                key: "count".into(),
                expected: "integer within range",
            })
        );
        assert_eq!(max.get("count"), Some(&json!(i64::MAX)));
        assert_eq!(
            max.increment("count", -1).unwrap().get("count"),
            Some(&json!(i64::MAX - 1))
        );
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let state = State::from_iter([("count", 3)]);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, json!({"count": 3}));

        let parsed: State = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }
}
