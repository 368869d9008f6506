use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::interface::{ModelInfo, TranslateError, Translator};
use crate::config::InferenceSettings;

const WARMUP_TEXT: &str = "Hello.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed,
}

/// Shared handle to the process-wide translation model.
///
/// The model is installed exactly once and never replaced or torn down.
/// Blocking inference runs on tokio's blocking pool, at most
/// `max_concurrency` calls at a time.
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<Inner>,
}

struct Inner {
    translator: OnceLock<Arc<dyn Translator>>,
    load_error: OnceLock<String>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl TranslationService {
    pub fn new(settings: &InferenceSettings) -> Self {
        let timeout = (settings.timeout_secs > 0).then(|| Duration::from_secs(settings.timeout_secs));
        Self {
            inner: Arc::new(Inner {
                translator: OnceLock::new(),
                load_error: OnceLock::new(),
                permits: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
                timeout,
            }),
        }
    }

    /// Service with a translator already installed
    pub fn with_translator(translator: Arc<dyn Translator>, settings: &InferenceSettings) -> Self {
        let service = Self::new(settings);
        // A fresh OnceLock is always empty
        let _ = service.inner.translator.set(translator);
        service
    }

    pub fn install(&self, translator: Arc<dyn Translator>) -> Result<(), TranslateError> {
        self.inner
            .translator
            .set(translator)
            .map_err(|_| TranslateError::AlreadyInstalled)
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        let _ = self.inner.load_error.set(reason.into());
    }

    pub fn status(&self) -> ModelStatus {
        if self.inner.translator.get().is_some() {
            ModelStatus::Ready
        } else if self.inner.load_error.get().is_some() {
            ModelStatus::Failed
        } else {
            ModelStatus::Loading
        }
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.inner.translator.get().map(|t| t.info().clone())
    }

    /// Run `loader` on the blocking pool and install its result.
    ///
    /// A failed load is remembered so requests report it instead of "loading".
    pub async fn load_with<F>(&self, loader: F, warmup: bool) -> Result<(), TranslateError>
    where
        F: FnOnce() -> Result<Arc<dyn Translator>, TranslateError> + Send + 'static,
    {
        let started = Instant::now();
        let loaded = match tokio::task::spawn_blocking(loader).await {
            Ok(result) => result,
            Err(e) => Err(TranslateError::Aborted(e.to_string())),
        };

        let translator = match loaded {
            Ok(translator) => translator,
            Err(e) => {
                error!("Model load failed after {}ms: {}", started.elapsed().as_millis(), e);
                self.mark_failed(e.to_string());
                return Err(e);
            }
        };

        let info = translator.info().clone();
        self.install(translator)?;
        info!(
            "Translation model {} ready ({} -> {})",
            info.model_id, info.source_language, info.target_language
        );

        if warmup {
            self.warmup().await;
        }
        Ok(())
    }

    /// Translate one text. Waits for a free inference slot first.
    pub async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let translator = match self.inner.translator.get() {
            Some(translator) => Arc::clone(translator),
            None => {
                return Err(match self.inner.load_error.get() {
                    Some(reason) => TranslateError::LoadFailed(reason.clone()),
                    None => TranslateError::NotLoaded,
                })
            }
        };

        let permits = Arc::clone(&self.inner.permits);
        let text = text.to_owned();
        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|e| TranslateError::Aborted(e.to_string()))?;
            // The permit travels with the blocking call so a timed out
            // request keeps its slot until inference actually ends.
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                translator.translate(&text)
            })
            .await
            .map_err(|e| TranslateError::Aborted(e.to_string()))?
        };

        match self.inner.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| TranslateError::Timeout(limit.as_secs()))?,
            None => work.await,
        }
    }

    async fn warmup(&self) {
        let started = Instant::now();
        match self.translate(WARMUP_TEXT).await {
            Ok(output) => info!(
                "Warmup translation completed in {}ms: {} → {}",
                started.elapsed().as_millis(),
                WARMUP_TEXT,
                output
            ),
            Err(e) => warn!(
                "Warmup translation failed in {}ms: {}",
                started.elapsed().as_millis(),
                e
            ),
        }
    }
}
