//! Cross-step state: a small key/value store flow steps can read from and
//! write to via declared `use`/`set` lists.
//!
//! Mirrors the teacher's `TaskResultBuffer` — state is never mutated in
//! place. A write stages a pending update; `apply_pending_updates`
//! produces a new immutable snapshot rather than touching the old one, so
//! a `StateHandle`'s `view` handed to an agent never moves under it
//! mid-execution.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::agent::StateHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOperation {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub step: String,
    pub key: String,
    pub operation: AccessOperation,
    pub timestamp: DateTime<Utc>,
}

/// A replay of everything read/written over the lifetime of a run,
/// useful for diagnosing why a step saw the state it did.
#[derive(Debug, Clone, Default)]
pub struct AccessReport {
    pub entries: Vec<AccessLogEntry>,
}

impl AccessReport {
    pub fn keys_read(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.operation == AccessOperation::Read)
            .map(|e| e.key.as_str())
            .collect()
    }

    pub fn keys_written(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.operation == AccessOperation::Write)
            .map(|e| e.key.as_str())
            .collect()
    }
}

struct StateInner {
    values: Value,
    pending: Vec<(String, Value)>,
    access_log: Vec<AccessLogEntry>,
}

impl StateInner {
    fn new(initial: Value) -> Self {
        let values = match initial {
            Value::Object(_) => initial,
            Value::Null => Value::Object(serde_json::Map::new()),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                Value::Object(map)
            }
        };
        Self {
            values,
            pending: Vec::new(),
            access_log: Vec::new(),
        }
    }
}

/// Sink handed to an agent for the keys its step declared in `set`.
/// Writes are staged, not applied immediately — the engine calls
/// [`StateManager::apply_pending_updates`] once the step completes.
#[derive(Clone)]
pub struct StateWriter {
    inner: Arc<Mutex<StateInner>>,
    step: Arc<str>,
    allowed_keys: Arc<Vec<String>>,
}

impl StateWriter {
    /// Stage `key = value`. Silently dropped if `key` wasn't declared in
    /// the step's `set` list — the same tolerant-by-design posture as
    /// [`crate::interpolation`].
    pub fn set(&self, key: &str, value: Value) {
        if !self.allowed_keys.iter().any(|k| k == key) {
            return;
        }
        let mut inner = self.inner.lock().expect("state mutex poisoned");
        inner.pending.push((key.to_string(), value));
        inner.access_log.push(AccessLogEntry {
            step: self.step.to_string(),
            key: key.to_string(),
            operation: AccessOperation::Write,
            timestamp: Utc::now(),
        });
    }
}

/// Append-only cross-step key/value store for a single ensemble run.
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<Mutex<StateInner>>,
}

impl StateManager {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner::new(initial))),
        }
    }

    /// Build the read view and write sink for `step`, scoped to its
    /// declared `use` and `set` key lists. Every key in `use` is logged
    /// as a read, whether or not it was actually present.
    pub fn get_state_for_agent(
        &self,
        step: &str,
        use_keys: &[String],
        set_keys: &[String],
    ) -> StateHandle {
        let mut inner = self.inner.lock().expect("state mutex poisoned");
        let mut view = serde_json::Map::with_capacity(use_keys.len());
        for key in use_keys {
            let value = inner
                .values
                .as_object()
                .and_then(|m| m.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            view.insert(key.clone(), value);
            inner.access_log.push(AccessLogEntry {
                step: step.to_string(),
                key: key.clone(),
                operation: AccessOperation::Read,
                timestamp: Utc::now(),
            });
        }
        drop(inner);

        StateHandle {
            view: Value::Object(view),
            writer: StateWriter {
                inner: self.inner.clone(),
                step: Arc::from(step),
                allowed_keys: Arc::new(set_keys.to_vec()),
            },
        }
    }

    /// Fold every value staged by [`StateWriter::set`] calls since the
    /// last flush into a new snapshot, and clear the pending queue.
    /// Returns the new snapshot.
    pub fn apply_pending_updates(&self) -> Value {
        let mut inner = self.inner.lock().expect("state mutex poisoned");
        let pending = std::mem::take(&mut inner.pending);
        if pending.is_empty() {
            return inner.values.clone();
        }
        let mut map = inner
            .values
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (key, value) in pending {
            map.insert(key, value);
        }
        inner.values = Value::Object(map);
        inner.values.clone()
    }

    /// Directly stamp a value into state outside of the `use`/`set`
    /// declaration flow — used for ensemble-level state seeded from a
    /// member's final output.
    pub fn set_state_from_member(&self, member: &str, key: &str, value: Value) {
        let mut inner = self.inner.lock().expect("state mutex poisoned");
        let mut map = inner
            .values
            .as_object()
            .cloned()
            .unwrap_or_default();
        map.insert(key.to_string(), value);
        inner.values = Value::Object(map);
        inner.access_log.push(AccessLogEntry {
            step: member.to_string(),
            key: key.to_string(),
            operation: AccessOperation::Write,
            timestamp: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> Value {
        self.inner.lock().expect("state mutex poisoned").values.clone()
    }

    pub fn get_access_report(&self) -> AccessReport {
        AccessReport {
            entries: self.inner.lock().expect("state mutex poisoned").access_log.clone(),
        }
    }
}
