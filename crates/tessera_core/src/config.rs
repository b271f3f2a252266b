//! # Store Configuration
//!
//! Tuning knobs for a registry, loaded once at startup.
//!
//! All values have defaults, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! [allocator]
//! recent_capacity = 1024
//!
//! [sparse.layout]
//! kind = "paged"
//! page_size = 4096
//!
//! [storage]
//! initial_capacity = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::Entity;
use crate::error::{StoreError, StoreResult};

/// Bytes budgeted for the allocator's recent-release buffer.
const RECENT_BUFFER_BYTES: usize = 16_384;

/// Top-level registry configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Handle allocator settings.
    pub allocator: AllocatorConfig,
    /// Indirection table settings.
    pub sparse: SparseConfig,
    /// Columnar storage settings.
    pub storage: StorageConfig,
}

impl StoreConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the text is not valid TOML,
    /// has unknown keys, or fails [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the file cannot be read or
    /// its content is rejected by [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> StoreResult<()> {
        if self.allocator.recent_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "allocator.recent_capacity must be at least 1".into(),
            ));
        }
        if let SparseLayout::Paged { page_size } = self.sparse.layout {
            if !page_size.is_power_of_two() {
                return Err(StoreError::InvalidConfig(format!(
                    "sparse.layout.page_size must be a power of two, got {page_size}"
                )));
            }
        }
        Ok(())
    }
}

/// Settings for the recycling handle allocator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
    /// Fixed capacity of the recent-release buffer, in handles.
    pub recent_capacity: usize,
    /// Capacity the overflow buffer never shrinks below, in handles.
    pub min_overflow_capacity: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        let recent_capacity = RECENT_BUFFER_BYTES / std::mem::size_of::<Entity>();
        Self {
            recent_capacity,
            min_overflow_capacity: recent_capacity * 2,
        }
    }
}

/// Settings for the indirection table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SparseConfig {
    /// Memory layout of the table.
    pub layout: SparseLayout,
}

/// Memory layout of an indirection table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SparseLayout {
    /// One contiguous array, reallocated as handles grow.
    #[default]
    Flat,
    /// Fixed-size pages allocated only when touched.
    Paged {
        /// Entries per page. Must be a power of two.
        page_size: usize,
    },
}

/// Settings for per-schema columnar storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Records reserved in every storage at construction.
    pub initial_capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.allocator.recent_capacity, 4096);
        assert_eq!(config.allocator.min_overflow_capacity, 8192);
        assert_eq!(config.sparse.layout, SparseLayout::Flat);
        assert_eq!(config.storage.initial_capacity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = StoreConfig::from_toml_str(
            r#"
            [allocator]
            recent_capacity = 16

            [sparse.layout]
            kind = "paged"
            page_size = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.allocator.recent_capacity, 16);
        assert_eq!(config.allocator.min_overflow_capacity, 8192);
        assert_eq!(config.sparse.layout, SparseLayout::Paged { page_size: 64 });
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_rejects_bad_page_size() {
        let err = StoreConfig::from_toml_str(
            r#"
            [sparse.layout]
            kind = "paged"
            page_size = 100
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = StoreConfig::from_toml_str("[storage]\ngrowth = 2\n").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = StoreConfig::default();
        config.storage.initial_capacity = 32;
        config.sparse.layout = SparseLayout::Paged { page_size: 256 };

        let text = config.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = StoreConfig::from_toml_file("/nonexistent/tessera.toml").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }
}
