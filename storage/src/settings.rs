//! Tunables that deployments set from a file or the environment rather than in code.

use crate::configuration::{DEFAULT_BLOOM_FILTER_CAPACITY, DEFAULT_PAGE_SIZE};
use crate::Result;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of the environment variables that override file settings,
/// e.g. `ORDEX_PAGE_SIZE`.
pub const ENV_PREFIX: &str = "ORDEX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub page_size: usize,
    pub bloom_filter_capacity: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            bloom_filter_capacity: DEFAULT_BLOOM_FILTER_CAPACITY,
        }
    }
}

impl IndexSettings {
    /// Loads defaults, then `path` (any format the `config` crate detects from
    /// the extension), then `ORDEX_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        log::debug!("Loaded index settings {:?}", settings);
        Ok(settings)
    }
}
