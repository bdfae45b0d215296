//! Mapper Configuration
//!
//! Options shared by every entity of a mapper. Loadable from JSON so they can
//! live next to the rest of an application's settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or checking options
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse mapper options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid mapper options: {0}")]
    Invalid(String),
}

/// Mapper-wide options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperOptions {
    /// Document key for discriminator values when a model declares none
    pub discriminator_key: String,
    /// Write null properties instead of omitting them
    pub store_nulls: bool,
    /// Write empty arrays and maps instead of omitting them
    pub store_empties: bool,
    /// Reject criteria on paths the entity model cannot resolve
    pub validate_queries: bool,
    /// Assign a fresh `ObjectId` to null ids of top-level entities
    pub generate_ids: bool,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            discriminator_key: "_t".to_string(),
            store_nulls: false,
            store_empties: false,
            validate_queries: true,
            generate_ids: true,
        }
    }
}

impl MapperOptions {
    /// Parse options from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: MapperOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discriminator_key.is_empty() {
            return Err(ConfigError::Invalid(
                "discriminator_key must not be empty".to_string(),
            ));
        }
        if self.discriminator_key.contains('.') || self.discriminator_key.starts_with('$') {
            return Err(ConfigError::Invalid(format!(
                "discriminator_key '{}' is not a valid field name",
                self.discriminator_key
            )));
        }
        Ok(())
    }

    pub fn with_discriminator_key(mut self, key: &str) -> Self {
        self.discriminator_key = key.to_string();
        self
    }

    pub fn with_store_nulls(mut self, enabled: bool) -> Self {
        self.store_nulls = enabled;
        self
    }

    pub fn with_store_empties(mut self, enabled: bool) -> Self {
        self.store_empties = enabled;
        self
    }

    pub fn with_validate_queries(mut self, enabled: bool) -> Self {
        self.validate_queries = enabled;
        self
    }

    pub fn with_generate_ids(mut self, enabled: bool) -> Self {
        self.generate_ids = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MapperOptions::default();
        assert_eq!(options.discriminator_key, "_t");
        assert!(!options.store_nulls);
        assert!(!options.store_empties);
        assert!(options.validate_queries);
        assert!(options.generate_ids);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = MapperOptions::from_json(r#"{ "store_nulls": true }"#).unwrap();
        assert!(options.store_nulls);
        assert_eq!(options.discriminator_key, "_t");
    }

    #[test]
    fn test_json_roundtrip() {
        let options = MapperOptions::default()
            .with_discriminator_key("className")
            .with_store_empties(true);
        let json = options.to_json().unwrap();
        assert_eq!(MapperOptions::from_json(&json).unwrap(), options);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            MapperOptions::from_json(r#"{ "discriminator_key": "" }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(MapperOptions::default().with_discriminator_key("a.b").validate().is_err());
        assert!(matches!(
            MapperOptions::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
