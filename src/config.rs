//! Resolver settings

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable holding the layer download parallelism
pub const PARALLELISM_ENV: &str = "ECR_PULL_PARALLEL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Number of concurrent range requests per layer download; 0 downloads sequentially
    pub layer_download_parallelism: usize,
}

impl ResolverConfig {
    /// Read settings from the process environment, keeping defaults for unset values
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup(PARALLELISM_ENV).filter(|v| !v.trim().is_empty()) {
            config.layer_download_parallelism = value.trim().parse().map_err(|e| {
                RegistryError::Configuration(format!("{} must be a non-negative integer, got {:?}: {}", PARALLELISM_ENV, value, e))
            })?;
        }
        Ok(config)
    }
}
