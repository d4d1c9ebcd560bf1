//! Store key layout.

use std::sync::Arc;

/// Translates a store key into a logical config unit name.
pub type KeyMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Default [`KeyMapper`]: the last `/`-separated segment of the key.
pub fn last_segment(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

/// Where config units live in the store: `{storage_path}/global/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub fn new(storage_path: &str) -> Self {
        Self {
            prefix: format!("{}/global/", storage_path.trim_end_matches('/')),
        }
    }

    /// Prefix shared by every unit key, trailing slash included.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}
