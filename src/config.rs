use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use anyhow::{bail, Result};

/// Server variables read by older deployments, with the settings key each one feeds.
/// `SERVER__*` wins when both are set.
pub const LEGACY_SERVER_VARS: [(&str, &str); 4] = [
    ("UVICORN_HOST", "server.host"),
    ("UVICORN_PORT", "server.port"),
    ("UVICORN_RELOAD", "server.reload"),
    ("UVICORN_WORKERS", "server.workers"),
];

/// A legacy variable found in the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyVar {
    pub name: &'static str,
    pub key: &'static str,
    pub value: String,
}

/// Non-empty legacy server variables present in `vars`
pub fn legacy_server_vars<I>(vars: I) -> Vec<LegacyVar>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars.into_iter().collect();
    LEGACY_SERVER_VARS
        .iter()
        .filter_map(|&(name, key)| {
            vars.get(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| LegacyVar {
                    name,
                    key,
                    value: value.clone(),
                })
        })
        .collect()
}

/// Legacy server variables set in the process environment
pub fn process_legacy_vars() -> Vec<LegacyVar> {
    legacy_server_vars(
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    )
}

/// Deployment flavour, mostly affects logging defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub inference: InferenceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Accepted for compatibility with existing deployments; hot reload is not supported
    #[serde(default)]
    pub reload: bool,
    /// Tokio worker threads, 0 keeps the runtime default
    #[serde(default)]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reload: false,
            workers: 0,
        }
    }
}

/// Where the Marian model lives and how to run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Directory holding config.json and model.safetensors
    #[serde(default = "default_model_path")]
    pub path: String,

    /// Defaults to `<path>/tokenizer-source.json`
    #[serde(default)]
    pub source_tokenizer: Option<String>,

    /// Defaults to `<path>/tokenizer-target.json`
    #[serde(default)]
    pub target_tokenizer: Option<String>,

    #[serde(default = "default_source_language")]
    pub source_language: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// "cpu", "cuda" or "auto"
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default)]
    pub device_index: usize,

    /// Maximum number of generated tokens
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Independent decoding sessions, each one can serve a request at a time
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    #[serde(default = "default_warmup")]
    pub warmup: bool,
}

fn default_model_path() -> String {
    "models/opus-mt-en-ru".to_string()
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "ru".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

const fn default_max_length() -> usize {
    512
}

const fn default_replicas() -> usize {
    1
}

const fn default_warmup() -> bool {
    true
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            source_tokenizer: None,
            target_tokenizer: None,
            source_language: default_source_language(),
            target_language: default_target_language(),
            device: default_device(),
            device_index: 0,
            max_length: default_max_length(),
            replicas: default_replicas(),
            warmup: default_warmup(),
        }
    }
}

impl ModelSettings {
    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn source_tokenizer_path(&self) -> PathBuf {
        self.source_tokenizer
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.model_dir().join("tokenizer-source.json"))
    }

    pub fn target_tokenizer_path(&self) -> PathBuf {
        self.target_tokenizer
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.model_dir().join("tokenizer-target.json"))
    }

    /// Model identifier reported by the health endpoint, e.g. "opus-mt-en-ru"
    pub fn model_id(&self) -> String {
        self.model_dir()
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.path.clone())
    }

    pub fn normalized_device(&self) -> String {
        self.device.to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// Upper bound on translations running at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// 0 disables the per-request timeout
    #[serde(default)]
    pub timeout_secs: u64,
}

const fn default_max_concurrency() -> usize {
    1
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// EnvFilter directive; falls back to a per-environment default
    #[serde(default)]
    pub filter: Option<String>,
    /// Rotated daily log files kept on disk
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const fn default_max_files() -> usize {
    31
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            filter: None,
            max_files: default_max_files(),
        }
    }
}

impl LoggingSettings {
    pub fn filter_for(&self, environment: Environment) -> String {
        if let Some(filter) = self.filter.as_ref().filter(|f| !f.trim().is_empty()) {
            return filter.clone();
        }
        match environment {
            Environment::Local => "marian_gateway=debug,tower_http=debug".to_string(),
            Environment::Production => "marian_gateway=info,tower_http=info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Nested keys use `__` as separator (`SERVER__PORT=9000`). Call
    /// `dotenvy::dotenv()` beforehand to pick up a `.env` file.
    /// `UVICORN_HOST`, `UVICORN_PORT`, `UVICORN_RELOAD` and `UVICORN_WORKERS`
    /// are honoured as fallbacks for the matching `SERVER__*` keys.
    pub fn load() -> Result<Self> {
        Self::from_sources(::config::Environment::default(), &process_legacy_vars())
    }

    /// Load from an explicit environment source, used by tests to avoid
    /// touching process-wide variables.
    pub fn from_source(source: ::config::Environment) -> Result<Self> {
        Self::from_sources(source, &[])
    }

    /// Like [`Settings::from_source`], with legacy variables applied below the source
    pub fn from_sources(source: ::config::Environment, legacy: &[LegacyVar]) -> Result<Self> {
        let source = source
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true);

        let mut builder = ::config::Config::builder();
        for var in legacy {
            builder = builder.set_default(var.key, var.value.as_str())?;
        }

        let settings: Settings = builder
            .add_source(source)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }

        let model = &self.model;
        if model.max_length == 0 || model.max_length > 4096 {
            bail!("model.max_length must be between 1 and 4096, got {}", model.max_length);
        }
        if model.replicas == 0 {
            bail!("model.replicas must be at least 1");
        }
        let valid_devices = ["cpu", "cuda", "auto"];
        if !valid_devices.contains(&model.normalized_device().as_str()) {
            bail!(
                "Invalid model.device '{}'. Must be one of: {:?}",
                model.device, valid_devices
            );
        }
        if model.source_language == model.target_language {
            bail!(
                "model.source_language and model.target_language must differ, both are '{}'",
                model.source_language
            );
        }

        if self.inference.max_concurrency == 0 {
            bail!("inference.max_concurrency must be at least 1");
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
