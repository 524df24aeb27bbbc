// ⚙️ Configuration - JSON file + defaults
//
// Every field has a default, so a config file only needs the keys it changes.
// CLI flags / env vars override what the file says.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Result cap for the similarity ranking
    pub similarity_top_k: usize,

    /// Opportunity thresholds used when a request omits them
    pub default_min_profile_pct: f64,
    pub default_max_votes_pct: f64,

    /// Smallest electorate considered by the opportunity scorer
    pub default_min_registered_voters: u64,

    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            similarity_top_k: 10,
            default_min_profile_pct: 20.0,
            default_max_votes_pct: 10.0,
            default_min_registered_voters: 1_000,
            cache_enabled: true,
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("eleicoes.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// File config when a path is given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.similarity_top_k == 0 {
            anyhow::bail!("engine.similarity_top_k must be at least 1");
        }
        if !self.engine.default_min_profile_pct.is_finite()
            || !self.engine.default_max_votes_pct.is_finite()
        {
            anyhow::bail!("opportunity thresholds must be finite numbers");
        }
        Ok(())
    }
}
