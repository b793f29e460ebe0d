//! Store configuration.
//!
//! All fields have defaults, so a partial JSON document is enough:
//!
//! ```ignore
//! let config = StoreConfig::from_json(r#"{ "reducer_capacity": 16 }"#)?;
//! let store = StoreBuilder::<LoginModel>::new(LoginState::default())
//!     .with_config(config)
//!     .build()?;
//! ```
//!
//! Actions and single events travel on unbounded queues, so neither has a
//! capacity to tune. The only bounded queue is the one between finished
//! pipelines and the fold.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Default capacity of the queue between pipelines and the fold.
pub const DEFAULT_REDUCER_CAPACITY: usize = 256;

/// Tunables for one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How many finished pipeline outcomes may wait for the fold.
    ///
    /// When full, pipeline tasks suspend until the fold catches up. Nothing
    /// is dropped.
    pub reducer_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reducer_capacity: DEFAULT_REDUCER_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_str(json).map_err(|e| StoreError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the channels cannot be built with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.reducer_capacity == 0 {
            return Err(StoreError::InvalidConfig {
                message: "reducer_capacity must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reducer_capacity, DEFAULT_REDUCER_CAPACITY);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());

        let config = StoreConfig::from_json(r#"{ "reducer_capacity": 8 }"#).unwrap();
        assert_eq!(config.reducer_capacity, 8);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = StoreConfig::from_json(r#"{ "reducer_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig { .. }));
        assert!(err.to_string().contains("reducer_capacity"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = StoreConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig { .. }));
    }
}
