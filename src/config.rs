use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docpipe server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores chunk vectors.
    pub qdrant_url: String,
    /// Name of the vector index (Qdrant collection) for document chunks.
    pub qdrant_index_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the external text-extraction service.
    pub extractor_url: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Base URL for the OpenAI-compatible embeddings endpoint.
    pub embedding_url: Option<String>,
    /// Optional API key passed to the embedding provider.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors; must match the index.
    pub embedding_dimension: usize,
    /// Directory where uploaded documents and thumbnails are stored.
    pub storage_path: String,
    /// Directory where run journals are appended.
    pub journal_path: String,
    /// Target chunk size in characters.
    pub chunk_target_size: usize,
    /// Chunk overlap hint in characters (zero disables boundary overlap).
    pub chunk_overlap: usize,
    /// Concurrency ceilings for the per-stage worker queues.
    pub queues: QueueCeilings,
    /// Retry policy applied to every stage dispatch.
    pub retry: RetrySettings,
    /// Bounded attempts for the index bootstrap at startup.
    pub index_bootstrap_attempts: u32,
    /// Fixed delay in seconds between index bootstrap attempts.
    pub index_bootstrap_delay_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Per-stage worker pool concurrency ceilings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QueueCeilings {
    /// Maximum concurrent thumbnail activities.
    pub thumbnail: usize,
    /// Maximum concurrent page-parse activities.
    pub page_parse: usize,
    /// Maximum concurrent chunk activities.
    pub chunk: usize,
    /// Maximum concurrent embed-and-index activities.
    pub embed_index: usize,
    /// Maximum concurrent pipeline runs.
    pub runs: usize,
}

impl Default for QueueCeilings {
    fn default() -> Self {
        Self {
            thumbnail: 5,
            page_parse: 20,
            chunk: 10,
            embed_index: 15,
            runs: 5,
        }
    }
}

/// Retry policy parameters applied to stage dispatches.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrySettings {
    /// Initial backoff interval in seconds.
    pub initial_backoff_secs: u64,
    /// Maximum backoff interval in seconds.
    pub max_backoff_secs: u64,
    /// Maximum attempt count per stage dispatch.
    pub max_attempts: u32,
    /// Per-attempt execution timeout in seconds.
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 5,
            max_backoff_secs: 60,
            max_attempts: 3,
            attempt_timeout_secs: 300,
        }
    }
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic local embeddings for development and tests.
    Local,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_index_name: load_env("QDRANT_INDEX_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            extractor_url: load_env("EXTRACTOR_URL")?,
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", None)?,
            storage_path: load_env_optional("STORAGE_PATH").unwrap_or_else(|| "storage".into()),
            journal_path: load_env_optional("JOURNAL_PATH").unwrap_or_else(|| "journal".into()),
            chunk_target_size: parse_env("CHUNK_TARGET_SIZE", Some(1000))?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", Some(200))?,
            queues: QueueCeilings {
                thumbnail: parse_env("THUMBNAIL_CONCURRENCY", Some(5))?,
                page_parse: parse_env("PAGE_PARSE_CONCURRENCY", Some(20))?,
                chunk: parse_env("CHUNK_CONCURRENCY", Some(10))?,
                embed_index: parse_env("EMBED_CONCURRENCY", Some(15))?,
                runs: parse_env("MAX_CONCURRENT_RUNS", Some(5))?,
            },
            retry: RetrySettings {
                initial_backoff_secs: parse_env("RETRY_INITIAL_BACKOFF_SECS", Some(5))?,
                max_backoff_secs: parse_env("RETRY_MAX_BACKOFF_SECS", Some(60))?,
                max_attempts: parse_env("RETRY_MAX_ATTEMPTS", Some(3))?,
                attempt_timeout_secs: parse_env("ACTIVITY_TIMEOUT_SECS", Some(300))?,
            },
            index_bootstrap_attempts: parse_env("INDEX_BOOTSTRAP_ATTEMPTS", Some(5))?,
            index_bootstrap_delay_secs: parse_env("INDEX_BOOTSTRAP_DELAY_SECS", Some(5))?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: Option<T>) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVariable(key.to_string())),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        index = %config.qdrant_index_name,
        extractor_url = %config.extractor_url,
        embedding_provider = ?config.embedding_provider,
        embedding_dimension = config.embedding_dimension,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_provider_parses_known_values() {
        assert!(matches!(
            "openai".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::OpenAI)
        ));
        assert!(matches!(
            "LOCAL".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Local)
        ));
        assert!("pinecone".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn queue_ceilings_default_to_stage_profile() {
        let ceilings = QueueCeilings::default();
        assert_eq!(ceilings.thumbnail, 5);
        assert_eq!(ceilings.page_parse, 20);
        assert_eq!(ceilings.chunk, 10);
        assert_eq!(ceilings.embed_index, 15);
        assert_eq!(ceilings.runs, 5);
    }

    #[test]
    fn retry_defaults_match_pipeline_policy() {
        let retry = RetrySettings::default();
        assert_eq!(retry.initial_backoff_secs, 5);
        assert_eq!(retry.max_backoff_secs, 60);
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.attempt_timeout_secs, 300);
    }
}
