//! Local Qwen3 inference through candle.

use crate::core::{AssistError, ChatMessage, DeviceProfile, Engine, Result};
use crate::template::{chat_template, END_OF_TEXT, IM_END};
use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::qwen3::{Config as Qwen3Config, ModelForCausalLM};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;

/// User overrides for sampling. Unset fields fall back to the checkpoint's
/// `generation_config.json`, and to greedy decoding when that is absent too.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SamplingConfig {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationDefaults {
    #[serde(default)]
    do_sample: Option<bool>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    top_p: Option<f64>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    eos_token_id: Option<TokenIds>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenIds {
    One(u32),
    Many(Vec<u32>),
}

impl TokenIds {
    fn to_vec(&self) -> Vec<u32> {
        match self {
            TokenIds::One(id) => vec![*id],
            TokenIds::Many(ids) => ids.clone(),
        }
    }
}

fn resolve_sampling(user: &SamplingConfig, defaults: &GenerationDefaults) -> Sampling {
    let greedy_checkpoint = defaults.do_sample == Some(false);
    let temperature = match user.temperature {
        Some(t) => Some(t),
        None if greedy_checkpoint => None,
        None => defaults.temperature,
    };

    let temperature = match temperature {
        Some(t) if t > 0.0 => t,
        _ => return Sampling::ArgMax,
    };

    let top_k = user.top_k.or(defaults.top_k).filter(|k| *k > 0);
    let top_p = user.top_p.or(defaults.top_p).filter(|p| *p > 0.0 && *p < 1.0);

    match (top_k, top_p) {
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (None, None) => Sampling::All { temperature },
    }
}

fn weight_files(checkpoint: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let single = checkpoint.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }

    let index_path = checkpoint.join("model.safetensors.index.json");
    let index: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&index_path)
            .with_context(|| format!("no weights found in {}", checkpoint.display()))?,
    )?;
    let shards: BTreeSet<&str> = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .context("weight index has no weight_map")?
        .values()
        .filter_map(|v| v.as_str())
        .collect();

    Ok(shards.into_iter().map(|shard| checkpoint.join(shard)).collect())
}

pub struct CandleEngine {
    model: ModelForCausalLM,
    tokenizer: Tokenizer,
    device: Device,
    eos_tokens: Vec<u32>,
    logits_processor: LogitsProcessor,
}

impl CandleEngine {
    /// Loads tokenizer, config and weights from a Hugging Face style checkpoint directory.
    pub fn load(checkpoint: &Path, profile: &DeviceProfile, sampling: &SamplingConfig) -> Result<Self> {
        if !checkpoint.is_dir() {
            return Err(AssistError::CheckpointNotFound(checkpoint.to_path_buf()));
        }

        let started = Instant::now();
        let engine = Self::load_checkpoint(checkpoint, profile, sampling)
            .map_err(|e| AssistError::EngineLoad(format!("{:#}", e)))?;

        tracing::info!(
            checkpoint = %checkpoint.display(),
            device = %profile,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(engine)
    }

    fn load_checkpoint(
        checkpoint: &Path,
        profile: &DeviceProfile,
        sampling: &SamplingConfig,
    ) -> anyhow::Result<Self> {
        let device = profile.device()?;

        let tokenizer = Tokenizer::from_file(checkpoint.join("tokenizer.json"))
            .map_err(anyhow::Error::msg)
            .context("failed to read tokenizer.json")?;

        let config: Qwen3Config = serde_json::from_str(
            &std::fs::read_to_string(checkpoint.join("config.json"))
                .context("failed to read config.json")?,
        )
        .context("unsupported config.json")?;

        let defaults: GenerationDefaults = match std::fs::read_to_string(checkpoint.join("generation_config.json")) {
            Ok(raw) => serde_json::from_str(&raw).context("invalid generation_config.json")?,
            Err(_) => GenerationDefaults::default(),
        };

        let files = weight_files(checkpoint)?;
        // SAFETY: the weight files are memory mapped read-only and must not be
        // modified while the engine is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, profile.dtype(), &device)? };
        let model = ModelForCausalLM::new(&config, vb)?;

        let mut eos_tokens: Vec<u32> = defaults
            .eos_token_id
            .as_ref()
            .map(TokenIds::to_vec)
            .unwrap_or_default();
        for special in [IM_END, END_OF_TEXT] {
            if let Some(id) = tokenizer.token_to_id(special) {
                if !eos_tokens.contains(&id) {
                    eos_tokens.push(id);
                }
            }
        }

        let sampling_mode = resolve_sampling(sampling, &defaults);
        tracing::debug!(sampling = ?sampling_mode, eos = ?eos_tokens, "generation settings");

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_tokens,
            logits_processor: LogitsProcessor::from_sampling(sampling.seed, sampling_mode),
        })
    }

    fn run(&mut self, messages: &[ChatMessage], max_new_tokens: usize) -> anyhow::Result<String> {
        let prompt = chat_template(messages);
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(anyhow::Error::msg)?;
        let mut tokens = encoding.get_ids().to_vec();
        let prompt_len = tokens.len();

        self.model.clear_kv_cache();
        let started = Instant::now();
        let mut generated = Vec::new();

        for step in 0..max_new_tokens {
            let (context, offset) = if step == 0 {
                (&tokens[..], 0)
            } else {
                (&tokens[tokens.len() - 1..], tokens.len() - 1)
            };

            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, offset)?;
            let logits = logits.flatten_all()?.to_dtype(DType::F32)?;

            let next = self.logits_processor.sample(&logits)?;
            if self.eos_tokens.contains(&next) {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }

        let elapsed = started.elapsed().as_secs_f64();
        tracing::debug!(
            prompt_tokens = prompt_len,
            generated_tokens = generated.len(),
            tokens_per_sec = generated.len() as f64 / elapsed.max(f64::EPSILON),
            "generation finished"
        );

        self.tokenizer
            .decode(&generated, true)
            .map_err(anyhow::Error::msg)
    }
}

impl Engine for CandleEngine {
    fn generate(&mut self, messages: &[ChatMessage], max_new_tokens: usize) -> Result<String> {
        self.run(messages, max_new_tokens)
            .map_err(|e| AssistError::Inference(format!("{:#}", e)))
    }
}
