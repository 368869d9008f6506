//! Translation interface - one loaded model serves one fixed language pair

use serde::Serialize;
use thiserror::Error;

/// What the loaded model translates, reported by `/health` and startup logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("model is still loading")]
    NotLoaded,

    #[error("model failed to load: {0}")]
    LoadFailed(String),

    #[error("a model is already installed")]
    AlreadyInstalled,

    #[error("failed to read model files: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),

    #[error("translation timed out after {0}s")]
    Timeout(u64),

    #[error("translation task aborted: {0}")]
    Aborted(String),
}

/// Blocking translation capability.
///
/// Implementations must be safe to call from several threads at once; the
/// caller never passes language tags, the pair is fixed when the model is
/// loaded.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> Result<String, TranslateError>;

    fn info(&self) -> &ModelInfo;
}
