use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CacheFsError, Result};

pub const DEFAULT_SIZE_IN_BYTES: u64 = 1024 * 1024;

/// What a directory load does when one child's metadata cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildErrorPolicy {
    /// Leave the child out of the listing and log a warning.
    #[default]
    Skip,
    /// Fail the whole directory load.
    Fail,
}

/// Settings for a [`CacheFs`](crate::CacheFs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Names the cache group. Instances that should not share records need
    /// distinct names.
    pub group_name: String,
    /// Upper bound on cached bytes, keys included.
    pub size_in_bytes: u64,
    /// Approximate lifetime of a cached record. Zero keeps records until
    /// they are evicted for space.
    #[serde(rename = "expiration_secs", with = "duration_secs")]
    pub expiration: Duration,
    /// Skip the per-child stat when loading a directory.
    pub no_stat: bool,
    pub child_errors: ChildErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_name: Uuid::new_v4().to_string(),
            size_in_bytes: DEFAULT_SIZE_IN_BYTES,
            expiration: Duration::ZERO,
            no_stat: false,
            child_errors: ChildErrorPolicy::Skip,
        }
    }
}

impl Config {
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|error| {
            CacheFsError::Config(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::from_json(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_name.trim().is_empty() {
            return Err(CacheFsError::Config("group_name must not be empty".to_string()));
        }
        if self.size_in_bytes == 0 {
            return Err(CacheFsError::Config(
                "size_in_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = name.into();
        self
    }

    pub fn with_size_in_bytes(mut self, size: u64) -> Self {
        self.size_in_bytes = size;
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_no_stat(mut self, no_stat: bool) -> Self {
        self.no_stat = no_stat;
        self
    }

    pub fn with_child_errors(mut self, policy: ChildErrorPolicy) -> Self {
        self.child_errors = policy;
        self
    }
}

/// Durations as fractional seconds.
mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.size_in_bytes, DEFAULT_SIZE_IN_BYTES);
        assert_eq!(config.expiration, Duration::ZERO);
        assert!(!config.no_stat);
        assert_eq!(config.child_errors, ChildErrorPolicy::Skip);
        assert!(Uuid::parse_str(&config.group_name).is_ok());
        assert_ne!(config.group_name, Config::default().group_name);
    }

    #[test]
    fn parses_partial_json() {
        let config = Config::from_json(
            r#"{ "group_name": "assets", "expiration_secs": 1.5, "child_errors": "fail" }"#,
        )
        .unwrap();
        assert_eq!(config.group_name, "assets");
        assert_eq!(config.expiration, Duration::from_millis(1500));
        assert_eq!(config.child_errors, ChildErrorPolicy::Fail);
        assert_eq!(config.size_in_bytes, DEFAULT_SIZE_IN_BYTES);
    }

    #[test]
    fn json_round_trip() {
        let config = Config::default()
            .with_group_name("g")
            .with_expiration(Duration::from_secs(30))
            .with_no_stat(true);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"expiration_secs\":30.0"));
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = Config::from_json(r#"{ "group_name": "" }"#).unwrap_err();
        assert!(matches!(err, CacheFsError::Config(_)));

        let err = Config::from_json(r#"{ "size_in_bytes": 0 }"#).unwrap_err();
        assert!(matches!(err, CacheFsError::Config(_)));

        let err = Config::from_json(r#"{ "expiration_secs": -1.0 }"#).unwrap_err();
        assert!(matches!(err, CacheFsError::Config(_)));

        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn loads_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cachefs.json");
        std::fs::write(&path, r#"{ "group_name": "disk", "no_stat": true }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.group_name, "disk");
        assert!(config.no_stat);

        let err = Config::load(&temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CacheFsError::Config(_)));
    }
}
