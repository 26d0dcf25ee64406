//! Engine configuration: JSON file plus environment overrides.
//!
//! | Variable                     | Effect                                  |
//! |------------------------------|-----------------------------------------|
//! | `HYPERTUNE_CONFIG`           | path of a JSON config file to start from|
//! | `HYPERTUNE_SEED`             | default seed for session RNGs           |
//! | `HYPERTUNE_ID_SCHEME`        | `uuid` or `sequential`                  |
//! | `HYPERTUNE_STORE_DIR`        | directory for the JSON file store       |
//! | `HYPERTUNE_WARM_START_TOP_K` | evaluations taken per warm start        |

use ht_store::{JsonFileStore, MemoryStore, TuningStore};
use ht_types::{config_error, IdGenerator, SequentialIdGenerator, TuneResult, UuidIdGenerator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ht_optimizer::DEFAULT_TOP_K;

pub const ENV_CONFIG: &str = "HYPERTUNE_CONFIG";
pub const ENV_SEED: &str = "HYPERTUNE_SEED";
pub const ENV_ID_SCHEME: &str = "HYPERTUNE_ID_SCHEME";
pub const ENV_STORE_DIR: &str = "HYPERTUNE_STORE_DIR";
pub const ENV_WARM_START_TOP_K: &str = "HYPERTUNE_WARM_START_TOP_K";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    #[default]
    Uuid,
    Sequential,
}

impl FromStr for IdScheme {
    type Err = ht_types::TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(Self::Uuid),
            "sequential" => Ok(Self::Sequential),
            other => Err(config_error!("unknown id scheme '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file store root. `None` keeps everything in memory.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed used when a start request carries none. Entropy otherwise.
    pub seed: Option<u64>,
    pub id_scheme: IdScheme,
    pub storage: StorageConfig,
    pub warm_start_top_k: usize,
    /// Generation attempts per suggestion when constraints are enforced.
    pub max_constraint_attempts: usize,
    /// Used for duration estimates when a start request carries none.
    pub default_seconds_per_evaluation: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            id_scheme: IdScheme::Uuid,
            storage: StorageConfig::default(),
            warm_start_top_k: DEFAULT_TOP_K,
            max_constraint_attempts: 10,
            default_seconds_per_evaluation: 60.0,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> TuneResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| config_error!("cannot parse {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the file named by `HYPERTUNE_CONFIG`, with the remaining
    /// variables applied on top.
    pub fn from_env() -> TuneResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> TuneResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup(ENV_CONFIG) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(lookup)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> TuneResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(seed) = lookup(ENV_SEED) {
            self.seed = Some(
                seed.trim()
                    .parse()
                    .map_err(|e| config_error!("{ENV_SEED}='{seed}': {e}"))?,
            );
        }
        if let Some(scheme) = lookup(ENV_ID_SCHEME) {
            self.id_scheme = scheme.parse()?;
        }
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.storage.directory = Some(PathBuf::from(dir));
        }
        if let Some(k) = lookup(ENV_WARM_START_TOP_K) {
            self.warm_start_top_k = k
                .trim()
                .parse()
                .map_err(|e| config_error!("{ENV_WARM_START_TOP_K}='{k}': {e}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> TuneResult<()> {
        if self.warm_start_top_k == 0 {
            return Err(config_error!("warm_start_top_k must be at least 1"));
        }
        if self.max_constraint_attempts == 0 {
            return Err(config_error!("max_constraint_attempts must be at least 1"));
        }
        if !(self.default_seconds_per_evaluation > 0.0) {
            return Err(config_error!(
                "default_seconds_per_evaluation must be positive, got {}",
                self.default_seconds_per_evaluation
            ));
        }
        Ok(())
    }

    pub fn id_generator(&self) -> Arc<dyn IdGenerator> {
        match self.id_scheme {
            IdScheme::Uuid => Arc::new(UuidIdGenerator),
            IdScheme::Sequential => Arc::new(SequentialIdGenerator::new()),
        }
    }

    pub fn open_store(&self) -> TuneResult<Arc<dyn TuningStore>> {
        Ok(match &self.storage.directory {
            Some(dir) => Arc::new(JsonFileStore::new(dir)?),
            None => Arc::new(MemoryStore::new()),
        })
    }
}
