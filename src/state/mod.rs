//! Device state mirror and edge detection.
//!
//! The device continuously reports its variables through state-update
//! lines; the mirror keeps the most recently reported value per key
//! (`current`) plus a snapshot (`previous`) that consumers advance
//! explicitly. Comparing the two implements "new event since last check"
//! semantics over a polling interface: the device keeps changing a
//! counter under a key, and a consumer that polls once per scheduler
//! tick sees the edge without the transport ever delivering discrete
//! event objects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Device-reported state: either a key/value mapping or a bare scalar.
///
/// Merging is defined only for the mapping case. A scalar payload
/// replaces the state wholesale, so key lookups must tolerate the state
/// not being a mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceState {
    /// Key/value mapping, updated by merge.
    Map(Map<String, Value>),
    /// Non-object payload that replaced the state wholesale.
    Scalar(Value),
}

impl DeviceState {
    /// Looks up a key, returning `None` when the state is a scalar.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            Self::Scalar(_) => None,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::Map(Map::new())
    }
}

/// Mirror of the device-reported state.
#[derive(Debug, Default)]
pub struct StateMirror {
    current: DeviceState,
    previous: Map<String, Value>,
    acknowledged_at: HashMap<String, u64>,
}

impl StateMirror {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an object payload into the current state.
    ///
    /// Existing keys are overwritten, new keys added, untouched keys
    /// persist. If the current state is a scalar, the payload becomes
    /// the new mapping.
    pub(crate) fn merge(&mut self, payload: Map<String, Value>) {
        match &mut self.current {
            DeviceState::Map(map) => map.extend(payload),
            DeviceState::Scalar(_) => self.current = DeviceState::Map(payload),
        }
    }

    /// Replaces the current state wholesale with a scalar payload.
    pub(crate) fn replace(&mut self, payload: Value) {
        self.current = DeviceState::Scalar(payload);
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> &DeviceState {
        &self.current
    }

    /// Reads `current[key]`.
    #[must_use]
    pub fn last_event_id(&self, key: &str) -> Option<&Value> {
        self.current.get(key)
    }

    /// Reads `previous[key]`.
    #[must_use]
    pub fn prev_event_id(&self, key: &str) -> Option<&Value> {
        self.previous.get(key)
    }

    /// True iff `current[key]` is defined and differs from `previous[key]`.
    #[must_use]
    pub fn has_new_event(&self, key: &str) -> bool {
        match self.last_event_id(key) {
            Some(last) => self.prev_event_id(key) != Some(last),
            None => false,
        }
    }

    /// Advances `previous[key]` to `current[key]`, acknowledging the edge.
    ///
    /// `tick` is the host scheduler's step stamp. The advance is
    /// debounced to at most once per distinct tick per key so that rapid
    /// repeats within one scheduling step are not lost. Returns whether
    /// the advance happened.
    pub fn acknowledge_event(&mut self, key: &str, tick: u64) -> bool {
        if self.acknowledged_at.get(key) == Some(&tick) {
            return false;
        }
        self.acknowledged_at.insert(key.to_owned(), tick);

        tracing::debug!(
            key,
            from = ?self.previous.get(key),
            to = ?self.current.get(key),
            "acknowledge event"
        );
        match self.current.get(key) {
            Some(value) => {
                self.previous.insert(key.to_owned(), value.clone());
            }
            None => {
                self.previous.remove(key);
            }
        }
        true
    }
}

/// Cloneable, thread-safe handle to a [`StateMirror`].
///
/// The read loop is the only writer of `current`; consumers get
/// read-only access plus the explicit previous-advance. Readers run
/// synchronously on host-scheduler threads, hence the lock.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<StateMirror>>,
}

impl StateHandle {
    /// Creates a handle around an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn merge(&self, payload: Map<String, Value>) {
        self.inner.write().merge(payload);
    }

    pub(crate) fn replace(&self, payload: Value) {
        self.inner.write().replace(payload);
    }

    /// Reads a value from the current state by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().last_event_id(key).cloned()
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> DeviceState {
        self.inner.read().current().clone()
    }

    /// Reads `current[key]`.
    #[must_use]
    pub fn last_event_id(&self, key: &str) -> Option<Value> {
        self.inner.read().last_event_id(key).cloned()
    }

    /// Reads `previous[key]`.
    #[must_use]
    pub fn prev_event_id(&self, key: &str) -> Option<Value> {
        self.inner.read().prev_event_id(key).cloned()
    }

    /// True iff `current[key]` is defined and differs from `previous[key]`.
    #[must_use]
    pub fn has_new_event(&self, key: &str) -> bool {
        self.inner.read().has_new_event(key)
    }

    /// Advances `previous[key]` to `current[key]`, debounced per `tick`.
    pub fn acknowledge_event(&self, key: &str, tick: u64) -> bool {
        self.inner.write().acknowledge_event(key, tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_adds_and_overwrites() {
        let mut mirror = StateMirror::new();
        mirror.merge(map(&[("a", json!(1)), ("b", json!(2))]));
        mirror.merge(map(&[("a", json!(3))]));

        assert_eq!(mirror.last_event_id("a"), Some(&json!(3)));
        assert_eq!(mirror.last_event_id("b"), Some(&json!(2)));
    }

    #[test]
    fn test_scalar_replaces_wholesale() {
        let mut mirror = StateMirror::new();
        mirror.merge(map(&[("a", json!(1))]));
        mirror.replace(json!(42));

        assert_eq!(mirror.current(), &DeviceState::Scalar(json!(42)));
        assert_eq!(mirror.last_event_id("a"), None);
    }

    #[test]
    fn test_merge_after_scalar_restores_mapping() {
        let mut mirror = StateMirror::new();
        mirror.replace(json!("boot"));
        mirror.merge(map(&[("a", json!(1))]));

        assert_eq!(mirror.last_event_id("a"), Some(&json!(1)));
    }

    #[test]
    fn test_edge_detection_lifecycle() {
        let mut mirror = StateMirror::new();
        assert!(!mirror.has_new_event("P7_ANY"));

        mirror.merge(map(&[("P7_ANY", json!(1))]));
        assert!(mirror.has_new_event("P7_ANY"));

        assert!(mirror.acknowledge_event("P7_ANY", 1));
        assert!(!mirror.has_new_event("P7_ANY"));

        // Same value again is not a new event
        mirror.merge(map(&[("P7_ANY", json!(1))]));
        assert!(!mirror.has_new_event("P7_ANY"));

        mirror.merge(map(&[("P7_ANY", json!(2))]));
        assert!(mirror.has_new_event("P7_ANY"));
    }

    #[test]
    fn test_acknowledge_debounced_per_tick() {
        let mut mirror = StateMirror::new();
        mirror.merge(map(&[("P7_ANY", json!(1))]));

        assert!(mirror.acknowledge_event("P7_ANY", 7));
        mirror.merge(map(&[("P7_ANY", json!(2))]));

        // Same tick: the advance is suppressed, the edge stays visible
        assert!(!mirror.acknowledge_event("P7_ANY", 7));
        assert!(mirror.has_new_event("P7_ANY"));

        // Next tick advances
        assert!(mirror.acknowledge_event("P7_ANY", 8));
        assert!(!mirror.has_new_event("P7_ANY"));
    }

    #[test]
    fn test_acknowledge_missing_key_clears_previous() {
        let mut mirror = StateMirror::new();
        mirror.merge(map(&[("k", json!(1))]));
        mirror.acknowledge_event("k", 1);

        mirror.replace(json!(0));
        mirror.acknowledge_event("k", 2);
        assert_eq!(mirror.prev_event_id("k"), None);
    }

    #[test]
    fn test_handle_is_shared() {
        let handle = StateHandle::new();
        let other = handle.clone();

        handle.merge(map(&[("x", json!(5))]));
        assert_eq!(other.get("x"), Some(json!(5)));
        assert!(other.has_new_event("x"));
    }
}
