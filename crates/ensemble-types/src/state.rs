//! Per-invocation session state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A set of key/value updates contributed by one unit.
pub type StateDelta = Map<String, Value>;

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub text: String,
}

/// Key/value context carried through one pipeline invocation.
///
/// A `SessionState` is owned by exactly one invocation. Parallel branches get
/// a clone to read; their updates come back as [`StateDelta`]s that the
/// pipeline merges itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    values: Map<String, Value>,
    #[serde(default)]
    history: Vec<Turn>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            values: Map::new(),
            history: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a value as a string slice, if it is one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Apply a delta. Keys in the delta replace existing keys.
    pub fn merge(&mut self, delta: &StateDelta) {
        for (key, value) in delta {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Whether `key` is present and truthy (non-null, non-false, non-empty).
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.values.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Number(_)) => true,
        }
    }

    pub fn push_turn(&mut self, role: impl Into<String>, text: impl Into<String>) {
        self.history.push(Turn {
            role: role.into(),
            text: text.into(),
        });
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Text of the most recent non-empty turn.
    pub fn latest_turn_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .map(|t| t.text.trim())
            .find(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites() {
        let mut state = SessionState::new("s1");
        state.set("a", 1);
        state.set("b", "keep");

        let mut delta = StateDelta::new();
        delta.insert("a".into(), json!(2));
        delta.insert("c".into(), json!(true));
        state.merge(&delta);

        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get_str("b"), Some("keep"));
        assert!(state.is_truthy("c"));
    }

    #[test]
    fn test_truthiness() {
        let mut state = SessionState::new("s1");
        state.set("empty", "");
        state.set("off", false);
        state.set("zero", 0);
        state.set("null", Value::Null);
        assert!(!state.is_truthy("empty"));
        assert!(!state.is_truthy("off"));
        assert!(state.is_truthy("zero"));
        assert!(!state.is_truthy("null"));
        assert!(!state.is_truthy("missing"));
    }

    #[test]
    fn test_latest_turn_skips_blank() {
        let mut state = SessionState::new("s1");
        assert_eq!(state.latest_turn_text(), None);
        state.push_turn("user", "first");
        state.push_turn("user", "second request");
        state.push_turn("assistant", "   ");
        assert_eq!(state.latest_turn_text(), Some("second request"));
    }
}
