//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_CHUNKING__MAX_CHUNK_SIZE=800`).
//! Paths from the config expand `~` and `${VAR}`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::loader::LoaderConfig;
use crate::logging::LoggingConfig;
use crate::types::Metric;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Wrap an already assembled figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Typed view of the whole configuration with defaults filled in.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub loader: LoaderConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        if self.retrieval.system_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(crate::error::Error::InvalidConfig(
                "retrieval.system_prompt must not be blank".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "retrieval.top_k must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub docs_dir: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { docs_dir: "./course_materials".to_string(), index_dir: "./course_index".to_string() }
    }
}

impl DataSettings {
    pub fn docs_path(&self) -> PathBuf {
        expand_path(&self.docs_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.index_dir)
    }
}

/// Which embedding provider to construct.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProvider {
    #[default]
    Hashed,
    BgeM3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Output dimensionality of the hashed provider.
    pub dim: usize,
    pub model_dir: Option<String>,
    pub batch_size: usize,
    /// Fraction of chunks that may be dropped before an ingest aborts.
    pub max_failure_ratio: f32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashed,
            dim: 1024,
            model_dir: None,
            batch_size: 32,
            max_failure_ratio: 0.1,
        }
    }
}

impl EmbeddingSettings {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;
        if self.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.max_failure_ratio) {
            return Err(Error::InvalidConfig(format!(
                "embedding.max_failure_ratio must be within [0, 1], got {}",
                self.max_failure_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub metric: Metric,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 4, metric: Metric::Cosine, system_prompt: None }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
