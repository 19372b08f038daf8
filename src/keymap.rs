//! Source key -> destination key substitution table.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Directory holding the well-known test keys in a platform build tree.
pub const TEST_KEY_DIR: &str = "build/target/product/security";

/// Well-known test keys and the release key each one maps to inside a
/// release key directory.
pub const DEFAULT_KEY_ROLES: [(&str, &str); 4] = [
    ("testkey", "releasekey"),
    ("media", "media"),
    ("shared", "shared"),
    ("platform", "platform"),
];

/// Mapping from source key identity to destination key identity.
///
/// Insertions are applied in the order supplied; a later insertion for the
/// same source key replaces the earlier one. Resolution is a single hop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMappingTable {
    entries: BTreeMap<String, String>,
}

impl KeyMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `source` to `destination`, replacing any previous mapping.
    pub fn insert(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        self.entries.insert(source.into(), destination.into());
    }

    /// Map the four well-known test keys to their counterparts under `dir`.
    pub fn apply_default_mappings(&mut self, dir: &Path) {
        let dir = dir.to_string_lossy();
        let dir = dir.trim_end_matches('/');
        for (test_key, release_key) in DEFAULT_KEY_ROLES {
            self.insert(
                format!("{TEST_KEY_DIR}/{test_key}"),
                format!("{dir}/{release_key}"),
            );
        }
    }

    /// Parse and insert a `SRC=DEST` pair.
    pub fn insert_pair(&mut self, pair: &str) -> Result<(), ConfigError> {
        let (source, destination) = parse_key_pair(pair)?;
        self.insert(source, destination);
        Ok(())
    }

    /// Resolve `key` through the table. Unmapped keys come back unchanged.
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a `SRC=DEST` option value. Both sides must be non-empty.
pub fn parse_key_pair(pair: &str) -> Result<(String, String), ConfigError> {
    let (source, destination) = pair
        .split_once('=')
        .ok_or_else(|| ConfigError::KeyMapping(pair.to_string()))?;
    let (source, destination) = (source.trim(), destination.trim());
    if source.is_empty() || destination.is_empty() {
        return Err(ConfigError::KeyMapping(pair.to_string()));
    }
    Ok((source.to_string(), destination.to_string()))
}
