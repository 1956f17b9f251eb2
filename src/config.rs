use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("Missing required setting: {0}")]
    Missing(String),
}

/// Which family of model runner answers embedding and generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLMProvider {
    HuggingFace,
    OpenAI,
}

impl Default for LLMProvider {
    fn default() -> Self {
        LLMProvider::HuggingFace
    }
}

impl FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(LLMProvider::HuggingFace),
            "openai" => Ok(LLMProvider::OpenAI),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
    Mps,
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            "mps" => Ok(Device::Mps),
            other => Err(format!("unknown device '{}'", other)),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
            Device::Mps => write!(f, "mps"),
        }
    }
}

/// Where chunk vectors live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite file inside the persistence directory.
    Local,
    Qdrant { url: String, collection: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub embedding_model_name: String,
    pub llm_checkpoint: String,
    pub provider: LLMProvider,
    pub persist_directory: PathBuf,
    pub docs_directory: PathBuf,
    pub device: Device,
    pub use_8bit: bool,
    pub huggingface_api_key: Option<String>,
    pub huggingface_api_url: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub store: StoreBackend,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_length: u16,
    pub temperature: f32,
    pub top_p: f32,
    pub embedding_batch_size: usize,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            embedding_model_name: "sentence-transformers/all-mpnet-base-v2".to_string(),
            llm_checkpoint: "google/flan-t5-large".to_string(),
            provider: LLMProvider::default(),
            persist_directory: cwd.join("db"),
            docs_directory: cwd.join("docs"),
            device: Device::default(),
            use_8bit: false,
            huggingface_api_key: None,
            huggingface_api_url: "https://api-inference.huggingface.co".to_string(),
            openai_api_key: None,
            openai_api_base: "https://api.openai.com/v1".to_string(),
            store: StoreBackend::Local,
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 4,
            max_length: 256,
            temperature: 0.3,
            top_p: 0.95,
            embedding_batch_size: 20,
            max_upload_bytes: 50 * 1024 * 1024,
            request_timeout: Duration::from_secs(120),
            max_concurrent_requests: 64,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to defaults
    /// for anything unset or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let store = match get("QDRANT_URL") {
            Some(url) => StoreBackend::Qdrant {
                url,
                collection: get("QDRANT_COLLECTION")
                    .unwrap_or_else(|| "infogenie_chunks".to_string()),
            },
            None => StoreBackend::Local,
        };

        let settings = Self {
            embedding_model_name: get("EMBEDDING_MODEL_NAME")
                .unwrap_or(defaults.embedding_model_name),
            llm_checkpoint: get("LLM_CHECKPOINT").unwrap_or(defaults.llm_checkpoint),
            provider: parse_or(&get, "LLM_PROVIDER", defaults.provider)?,
            persist_directory: get("PERSIST_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_directory),
            docs_directory: get("DOCS_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or(defaults.docs_directory),
            device: parse_or(&get, "DEVICE", defaults.device)?,
            use_8bit: parse_bool(&get, "USE_8BIT", defaults.use_8bit)?,
            huggingface_api_key: get("HUGGINGFACE_API_KEY"),
            huggingface_api_url: get("HUGGINGFACE_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.huggingface_api_url),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_api_base: get("OPENAI_API_BASE")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_api_base),
            store,
            chunk_size: parse_or(&get, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: parse_or(&get, "RETRIEVER_TOP_K", defaults.top_k)?,
            max_length: parse_or(&get, "LLM_MAX_LENGTH", defaults.max_length)?,
            temperature: parse_or(&get, "LLM_TEMPERATURE", defaults.temperature)?,
            top_p: parse_or(&get, "LLM_TOP_P", defaults.top_p)?,
            embedding_batch_size: parse_or(
                &get,
                "EMBEDDING_BATCH_SIZE",
                defaults.embedding_batch_size,
            )?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_concurrent_requests: parse_or(
                &get,
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE", self.chunk_size, "must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid(
                "CHUNK_OVERLAP",
                self.chunk_overlap,
                "must be smaller than CHUNK_SIZE",
            ));
        }
        if self.top_k == 0 {
            return Err(invalid("RETRIEVER_TOP_K", self.top_k, "must be positive"));
        }
        if self.embedding_batch_size == 0 {
            return Err(invalid(
                "EMBEDDING_BATCH_SIZE",
                self.embedding_batch_size,
                "must be positive",
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(invalid(
                "MAX_CONCURRENT_REQUESTS",
                self.max_concurrent_requests,
                "must be positive",
            ));
        }
        if self.temperature.is_nan() || self.temperature < 0.0 {
            return Err(invalid(
                "LLM_TEMPERATURE",
                self.temperature,
                "must be a non-negative number",
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid("LLM_TOP_P", self.top_p, "must be within 0.0..=1.0"));
        }
        if self.provider == LLMProvider::OpenAI && self.openai_api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY".to_string()));
        }
        Ok(())
    }

    /// Location of the SQLite index inside the persistence directory.
    pub fn index_path(&self) -> PathBuf {
        self.persist_directory.join("index.sqlite3")
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool<F>(get: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &raw, "expected a boolean")),
        },
        None => Ok(default),
    }
}

fn invalid(key: &str, value: impl fmt::Display, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
