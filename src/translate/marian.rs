//! MarianMT (Helsinki-NLP OPUS-MT) inference on candle.
//!
//! Expected model directory layout:
//! - `config.json` - Marian config as published with the model
//! - `model.safetensors` - weights
//! - source/target tokenizer JSON files (see `ModelSettings`)

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::marian;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::interface::{ModelInfo, TranslateError, Translator};
use crate::config::ModelSettings;

pub struct MarianTranslator {
    sessions: Vec<Mutex<marian::MTModel>>,
    next_session: AtomicUsize,
    config: marian::Config,
    source_tokenizer: Tokenizer,
    target_tokenizer: Tokenizer,
    device: Device,
    max_length: usize,
    info: ModelInfo,
}

impl MarianTranslator {
    /// Load config, weights and tokenizers. Blocking, call from a blocking context.
    pub fn load(settings: &ModelSettings) -> Result<Self, TranslateError> {
        let started = Instant::now();
        let model_dir = settings.model_dir();
        let device = select_device(&settings.normalized_device(), settings.device_index)?;

        let config_json = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: marian::Config = serde_json::from_str(&config_json)?;

        let max_length = effective_max_length(settings.max_length, config.max_position_embeddings);
        if max_length < settings.max_length {
            warn!(
                "model.max_length {} exceeds the model's {} positions, capping",
                settings.max_length, config.max_position_embeddings
            );
        }

        let source_tokenizer = load_tokenizer(&settings.source_tokenizer_path())?;
        let target_tokenizer = load_tokenizer(&settings.target_tokenizer_path())?;

        let weights = candle_core::safetensors::load(model_dir.join("model.safetensors"), &device)?;

        let mut sessions = Vec::with_capacity(settings.replicas);
        for _ in 0..settings.replicas {
            // Tensors are reference counted, replicas share the weight storage
            let vb = VarBuilder::from_tensors(clone_weights(&weights), DType::F32, &device);
            sessions.push(Mutex::new(marian::MTModel::new(&config, vb)?));
        }

        let info = ModelInfo {
            model_id: settings.model_id(),
            source_language: settings.source_language.clone(),
            target_language: settings.target_language.clone(),
        };

        info!(
            "Loaded {} ({} -> {}) on {:?} with {} replica(s) in {}ms",
            info.model_id,
            info.source_language,
            info.target_language,
            device,
            sessions.len(),
            started.elapsed().as_millis()
        );

        Ok(Self {
            sessions,
            next_session: AtomicUsize::new(0),
            config,
            source_tokenizer,
            target_tokenizer,
            device,
            max_length,
            info,
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>, TranslateError> {
        let encoding = self
            .source_tokenizer
            .encode(text, false)
            .map_err(|e| TranslateError::Tokenizer(e.to_string()))?;

        let mut ids = encoding.get_ids().to_vec();
        // The encoder expects an EOS terminator regardless of tokenizer post-processing
        if ids.last().copied() != Some(self.config.eos_token_id) {
            ids.push(self.config.eos_token_id);
        }
        let limit = self.config.max_position_embeddings;
        if ids.len() > limit {
            warn!("Input of {} tokens truncated to {}", ids.len(), limit);
            truncate_input(&mut ids, limit, self.config.eos_token_id);
        }
        Ok(ids)
    }

    /// Greedy decoding, feeding only the newest token since the KV cache holds the rest.
    fn generate(&self, model: &mut marian::MTModel, input_ids: &[u32]) -> Result<Vec<u32>, TranslateError> {
        let eos = self.config.eos_token_id;
        let pad = self.config.pad_token_id;

        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encoder().forward(&input, 0)?;

        let mut tokens = vec![self.config.decoder_start_token_id];
        for step in 0..self.max_length {
            let last = tokens[tokens.len() - 1];
            let decoder_input = Tensor::new(&[last], &self.device)?.unsqueeze(0)?;
            let logits = model.decode(&decoder_input, &encoder_output, step)?;

            let seq_len = logits.dim(1)?;
            let next = logits
                .i((.., seq_len - 1, ..))?
                .argmax(D::Minus1)?
                .squeeze(0)?
                .to_scalar::<u32>()?;

            if next == eos || next == pad {
                break;
            }
            tokens.push(next);
        }

        Ok(tokens.into_iter().skip(1).collect())
    }
}

impl Translator for MarianTranslator {
    fn translate(&self, text: &str) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let started = Instant::now();
        let input_ids = self.encode(text)?;

        let index = self.next_session.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let output_ids = {
            let mut model = lock_session(&self.sessions[index]);
            model.reset_kv_cache();
            self.generate(&mut model, &input_ids)?
        };

        let decoded = self
            .target_tokenizer
            .decode(&output_ids, true)
            .map_err(|e| TranslateError::Tokenizer(e.to_string()))?;

        debug!(
            "session {} translated {} -> {} tokens in {}ms",
            index,
            input_ids.len(),
            output_ids.len(),
            started.elapsed().as_millis()
        );

        Ok(decoded.trim().to_string())
    }

    fn info(&self) -> &ModelInfo {
        &self.info
    }
}

fn select_device(device: &str, index: usize) -> Result<Device, TranslateError> {
    match device {
        "cuda" => Ok(Device::new_cuda(index)?),
        "auto" => Ok(Device::cuda_if_available(index)?),
        _ => Ok(Device::Cpu),
    }
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer, TranslateError> {
    Tokenizer::from_file(path)
        .map_err(|e| TranslateError::Tokenizer(format!("{}: {}", path.display(), e)))
}

/// Decode steps allowed, bounded by the positional embedding table
fn effective_max_length(requested: usize, max_positions: usize) -> usize {
    requested.min(max_positions)
}

/// Keep at most `limit` ids, the last one being `eos`
fn truncate_input(ids: &mut Vec<u32>, limit: usize, eos: u32) {
    if ids.len() > limit && limit > 0 {
        ids.truncate(limit - 1);
        ids.push(eos);
    }
}

/// The KV cache is reset before every use, so a session left behind by a
/// panicking holder is still usable.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clone_weights(weights: &HashMap<String, Tensor>) -> HashMap<String, Tensor> {
    weights
        .iter()
        .map(|(name, tensor)| (name.clone(), tensor.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_missing_model_dir() {
        let settings = ModelSettings {
            path: "/nonexistent/opus-mt-en-ru".to_string(),
            ..Default::default()
        };
        let err = MarianTranslator::load(&settings).err().unwrap();
        assert!(matches!(err, TranslateError::Io(_)));
    }

    #[test]
    fn test_select_cpu_device() {
        assert!(matches!(select_device("cpu", 0).unwrap(), Device::Cpu));
    }

    #[test]
    fn test_max_length_capped_by_positions() {
        assert_eq!(effective_max_length(4096, 512), 512);
        assert_eq!(effective_max_length(128, 512), 128);
        assert_eq!(effective_max_length(512, 512), 512);
    }

    #[test]
    fn test_truncate_input_keeps_eos() {
        let mut ids = vec![5, 6, 7, 8, 0];
        truncate_input(&mut ids, 3, 0);
        assert_eq!(ids, vec![5, 6, 0]);

        let mut short = vec![5, 0];
        truncate_input(&mut short, 3, 0);
        assert_eq!(short, vec![5, 0]);
    }

    #[test]
    fn test_poisoned_session_is_recovered() {
        let session = std::sync::Arc::new(Mutex::new(vec![1u32]));
        let holder = session.clone();
        let result = std::thread::spawn(move || {
            let mut guard = holder.lock().unwrap();
            guard.push(2);
            panic!("decode panicked");
        })
        .join();
        assert!(result.is_err());
        assert!(session.is_poisoned());

        let mut guard = lock_session(&session);
        guard.clear();
        guard.push(3);
        drop(guard);
        assert_eq!(*lock_session(&session), vec![3]);
    }

    #[test]
    #[ignore = "requires a converted opus-mt model in ./models/opus-mt-en-ru"]
    fn test_translate_smoke() {
        let model_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/opus-mt-en-ru");
        let settings = ModelSettings {
            path: model_dir.to_string_lossy().to_string(),
            max_length: 64,
            ..Default::default()
        };

        let translator = MarianTranslator::load(&settings).unwrap();
        let output = translator.translate("Hello, world!").unwrap();
        assert!(!output.trim().is_empty());
        assert_eq!(translator.translate("   ").unwrap(), "");
    }
}
