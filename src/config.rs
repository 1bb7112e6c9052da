//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::entry::{HashSetConfig, OrderedSetConfig};
use crate::memory::HeapMemoryConfig;

const ENV_PREFIX: &str = "OXIOAK__";

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OxioakConfig {
    /// Ordered entry set configuration.
    pub ordered: Option<OrderedConfigSpec>,
    /// Hash entry set configuration.
    pub hash: Option<HashConfigSpec>,
    /// Heap memory manager configuration.
    pub memory: Option<MemoryConfigSpec>,
}

impl OxioakConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `OXIOAK_CONFIG` env var (if set),
    /// then apply `OXIOAK__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("OXIOAK_CONFIG").ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path = path.to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim();

            match parts.as_slice() {
                ["ordered", "capacity"] => {
                    self.ordered_mut().capacity = Some(parse_value(&key, value)?);
                }
                ["hash", "capacity"] => {
                    self.hash_mut().capacity = Some(parse_value(&key, value)?);
                }
                ["hash", "default_collision_escapes"] => {
                    self.hash_mut().default_collision_escapes = Some(parse_value(&key, value)?);
                }
                ["hash", "max_collision_factor"] => {
                    self.hash_mut().max_collision_factor = Some(parse_value(&key, value)?);
                }
                ["hash", "max_allocate_retries"] => {
                    self.hash_mut().max_allocate_retries = Some(parse_value(&key, value)?);
                }
                ["memory", "capacity_bytes"] => {
                    self.memory_mut().capacity_bytes = Some(parse_value(&key, value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build an `OrderedSetConfig` using defaults plus overrides.
    pub fn to_ordered_set_config(&self) -> Result<OrderedSetConfig, ConfigError> {
        let mut config = OrderedSetConfig::default();
        if let Some(ordered) = &self.ordered {
            ordered.apply_to(&mut config);
        }
        if config.capacity == 0 || config.capacity as u64 > u64::from(u32::MAX) {
            return Err(invalid("ordered.capacity", config.capacity));
        }
        Ok(config)
    }

    /// Build a `HashSetConfig` using defaults plus overrides.
    pub fn to_hash_set_config(&self) -> Result<HashSetConfig, ConfigError> {
        let mut config = HashSetConfig::default();
        if let Some(hash) = &self.hash {
            hash.apply_to(&mut config);
        }
        if config.capacity == 0 {
            return Err(invalid("hash.capacity", config.capacity));
        }
        if config.default_collision_escapes == 0 {
            return Err(invalid(
                "hash.default_collision_escapes",
                config.default_collision_escapes,
            ));
        }
        if config.max_collision_factor == 0 {
            return Err(invalid("hash.max_collision_factor", config.max_collision_factor));
        }
        if config.max_allocate_retries == 0 {
            return Err(invalid("hash.max_allocate_retries", config.max_allocate_retries));
        }
        Ok(config)
    }

    /// Build a `HeapMemoryConfig` using defaults plus overrides.
    pub fn to_heap_memory_config(&self) -> HeapMemoryConfig {
        let mut config = HeapMemoryConfig::default();
        if let Some(memory) = &self.memory {
            memory.apply_to(&mut config);
        }
        config
    }

    fn ordered_mut(&mut self) -> &mut OrderedConfigSpec {
        self.ordered.get_or_insert_with(Default::default)
    }

    fn hash_mut(&mut self) -> &mut HashConfigSpec {
        self.hash.get_or_insert_with(Default::default)
    }

    fn memory_mut(&mut self) -> &mut MemoryConfigSpec {
        self.memory.get_or_insert_with(Default::default)
    }
}

/// Ordered entry set overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderedConfigSpec {
    /// Declared number of entries, including the dummy entry.
    pub capacity: Option<usize>,
}

impl OrderedConfigSpec {
    fn apply_to(&self, config: &mut OrderedSetConfig) {
        if let Some(value) = self.capacity {
            config.capacity = value;
        }
    }
}

/// Hash entry set overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashConfigSpec {
    /// Number of slots.
    pub capacity: Option<usize>,
    /// Initial probe bound.
    pub default_collision_escapes: Option<usize>,
    /// Probe bound growth limit, as a multiple of the initial bound.
    pub max_collision_factor: Option<usize>,
    /// Allocation retry cap.
    pub max_allocate_retries: Option<usize>,
}

impl HashConfigSpec {
    fn apply_to(&self, config: &mut HashSetConfig) {
        if let Some(value) = self.capacity {
            config.capacity = value;
        }
        if let Some(value) = self.default_collision_escapes {
            config.default_collision_escapes = value;
        }
        if let Some(value) = self.max_collision_factor {
            config.max_collision_factor = value;
        }
        if let Some(value) = self.max_allocate_retries {
            config.max_allocate_retries = value;
        }
    }
}

/// Heap memory manager overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfigSpec {
    /// Payload byte budget.
    pub capacity_bytes: Option<usize>,
}

impl MemoryConfigSpec {
    fn apply_to(&self, config: &mut HeapMemoryConfig) {
        if let Some(value) = self.capacity_bytes {
            config.capacity_bytes = Some(value);
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn invalid(key: &str, value: usize) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
