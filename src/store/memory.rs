use std::collections::HashMap;
use std::sync::Mutex;

use super::StateStore;
use crate::core::Result;

/// Process-local state store, for tests and embedded use.
#[derive(Default)]
pub struct InMemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock()?.get(key).cloned())
    }

    fn set_value(&self, key: &str, expected_old: &str, new_value: &str) -> Result<bool> {
        let mut values = self.values.lock()?;
        let current = values.get(key).map(String::as_str).unwrap_or("");
        if current != expected_old {
            return Ok(false);
        }
        values.insert(key.to_string(), new_value.to_string());
        Ok(true)
    }
}
