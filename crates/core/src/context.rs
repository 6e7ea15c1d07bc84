use serde_json::{Map, Value};

use crate::template;

/// Mutable key/value scope for one interpreter invocation.
///
/// A store is created when an invocation starts and dropped when it ends.
/// Nothing in it survives a network hop: the receiving node always starts
/// with an empty store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextStore {
    values: Map<String, Value>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    /// Write `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Mutable slot for `key`, created as `null` if absent.
    pub fn entry(&mut self, key: impl Into<String>) -> &mut Value {
        self.values.entry(key.into()).or_insert(Value::Null)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Replace every `${key}` placeholder in `value` with this store's
    /// entries. See [`template::resolve`].
    pub fn resolve(&self, value: &Value) -> Value {
        template::resolve(value, self)
    }

    /// An independent copy for work that must not write back into this
    /// store.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// The whole store as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl From<Map<String, Value>> for ContextStore {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_set_remove() {
        let mut ctx = ContextStore::new();
        assert!(ctx.get("x").is_none());
        assert_eq!(ctx.set("x", json!(1)), None);
        assert_eq!(ctx.set("x", json!(2)), Some(json!(1)));
        assert_eq!(ctx.get("x"), Some(&json!(2)));
        assert_eq!(ctx.remove("x"), Some(json!(2)));
        assert!(ctx.is_empty());
    }

    #[test]
    fn entry_creates_null_slot() {
        let mut ctx = ContextStore::new();
        *ctx.entry("user") = json!({"id": 7});
        assert_eq!(ctx.get("user"), Some(&json!({"id": 7})));
        assert!(ctx.entry("other").is_null());
    }

    #[test]
    fn snapshot_is_independent() {
        let mut ctx = ContextStore::new();
        ctx.set("x", json!(1));
        let mut snapshot = ctx.snapshot();
        snapshot.set("x", json!(99));
        snapshot.set("late", json!(true));
        assert_eq!(ctx.get("x"), Some(&json!(1)));
        assert!(!ctx.contains_key("late"));
    }
}
