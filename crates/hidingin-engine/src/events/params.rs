use std::collections::HashMap;

use crate::resource::TextureRef;

#[derive(Debug, Clone)]
pub enum EventValue {
    Text(String),
    Int(i64),
    Texture(TextureRef),
}

/// String-keyed payload passed to listeners.
#[derive(Debug, Clone, Default)]
pub struct EventParams {
    values: HashMap<String, EventValue>,
}

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: EventValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: EventValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&EventValue> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            EventValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            EventValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn texture(&self, key: &str) -> Option<&TextureRef> {
        match self.values.get(key)? {
            EventValue::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
