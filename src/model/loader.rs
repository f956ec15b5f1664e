use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;
use tch::{Device, Kind, Tensor, no_grad};
use tokenizers::Tokenizer;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{
        GenerationRequest, GenerationResult, ModelMetadata, ModelSpec, adapter,
        generator::{Generator, ModelLoader},
        sampling::Sampler,
        window,
    },
};

pub const MODULE_FILE: &str = "model.ts";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
const END_OF_TEXT: &str = "<|endoftext|>";

/// Loads TorchScript causal language models traced from Hugging Face checkpoints.
pub struct TorchLoader {
    device: Device,
    context_window: usize,
    eos_token_id: i64,
    sampling_seed: Option<u64>,
}

impl TorchLoader {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            device: config.device,
            context_window: config.context_window,
            eos_token_id: config.eos_token_id,
            sampling_seed: config.sampling_seed,
        }
    }
}

impl ModelLoader for TorchLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Generator>, ServiceError> {
        let model = TorchGenerator::new(
            spec,
            self.device,
            self.context_window,
            self.eos_token_id,
            self.sampling_seed,
        )?;
        Ok(Arc::new(model))
    }
}

pub struct TorchGenerator {
    name: String,
    adapter: Option<String>,
    size_bytes: u64,
    device: Device,
    context_window: usize,
    eos_token_id: i64,
    tokenizer: Tokenizer,
    module: Mutex<tch::CModule>,
    sampler: Mutex<Sampler>,
}

impl TorchGenerator {
    pub fn new(
        spec: &ModelSpec,
        device: Device,
        context_window: usize,
        eos_token_id: i64,
        sampling_seed: Option<u64>,
    ) -> Result<Self, ServiceError> {
        let module_path = require(spec.path.join(MODULE_FILE))?;
        let tokenizer_path = require(spec.path.join(TOKENIZER_FILE))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path.as_path())
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let eos_token_id = tokenizer
            .token_to_id(END_OF_TEXT)
            .map(i64::from)
            .unwrap_or(eos_token_id);

        let size_bytes = fs::metadata(&module_path)?.len();
        let mut module = tch::CModule::load_on_device(&module_path, device)
            .map_err(|e| ServiceError::ModelLoad(e.to_string()))?;
        module.set_eval();

        let adapter = match &spec.adapter {
            Some(dir) => {
                let merged = adapter::merge_into(&module, dir)?;
                info!(adapter = %dir.display(), layers = merged, "merged LoRA adapter");
                Some(dir.display().to_string())
            }
            None => None,
        };

        info!(model = %spec, size_bytes, ?device, "model ready");

        Ok(Self {
            name: spec.path.display().to_string(),
            adapter,
            size_bytes,
            device,
            context_window,
            eos_token_id,
            tokenizer,
            module: Mutex::new(module),
            sampler: Mutex::new(Sampler::new(sampling_seed)),
        })
    }

    fn next_logits(&self, module: &tch::CModule, input_ids: &[i64]) -> Result<Vec<f32>, ServiceError> {
        let input_tensor = Tensor::from_slice(input_ids)
            .reshape([1, input_ids.len() as i64])
            .to(self.device);

        // traced models return either bare logits or (logits, past)
        let output = module
            .forward_is(&[tch::IValue::Tensor(input_tensor)])
            .map_err(|e| ServiceError::Generation(e.to_string()))?;
        let logits = match output {
            tch::IValue::Tensor(t) => t,
            tch::IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                tch::IValue::Tensor(t) => t.shallow_clone(),
                _ => {
                    return Err(ServiceError::Generation(
                        "expected tensor as first tuple element".into(),
                    ));
                }
            },
            _ => {
                return Err(ServiceError::Generation(
                    "unexpected model output format".into(),
                ));
            }
        };

        // [1, seq_len, vocab] -> [vocab]
        let last = logits
            .select(1, -1)
            .squeeze()
            .to_kind(Kind::Float)
            .to_device(Device::Cpu);
        Vec::<f32>::try_from(&last).map_err(|e| ServiceError::Generation(e.to_string()))
    }
}

impl Generator for TorchGenerator {
    fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ServiceError> {
        let prompt = request.prompt.as_str();
        let options = &request.options;
        if prompt.trim().is_empty() {
            return Err(ServiceError::BadRequest("prompt must not be empty".into()));
        }

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mut input_ids =
            window::fit_prompt(ids, self.eos_token_id, self.context_window, options.truncation)?;
        let prompt_token_len = input_ids.len();
        let budget = window::token_budget(options.max_length, self.context_window);
        let allowance = window::new_token_allowance(prompt_token_len, budget);

        let start = Instant::now();
        no_grad(|| {
            let module = self.module.lock();
            let mut sampler = self.sampler.lock();

            for _ in 0..allowance {
                if cancel.is_cancelled() {
                    return Err(ServiceError::Cancelled);
                }
                let logits = self.next_logits(&module, &input_ids)?;
                let Some(next) = sampler.next_token(&logits, options) else {
                    break;
                };
                let next = next as i64;
                input_ids.push(next);
                if next == self.eos_token_id {
                    break;
                }
            }
            Ok::<(), ServiceError>(())
        })?;

        let generated_ids: Vec<u32> = input_ids[prompt_token_len..]
            .iter()
            .map(|&id| id as u32)
            .collect();
        let completion = self
            .tokenizer
            .decode(&generated_ids, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;

        debug!(
            model = %self.name,
            prompt_tokens = prompt_token_len,
            new_tokens = generated_ids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );

        Ok(GenerationResult::new(format!("{prompt}{completion}")))
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.name.clone(),
            adapter: self.adapter.clone(),
            backend: "torchscript".to_string(),
            size_bytes: self.size_bytes,
        }
    }
}

fn require(path: PathBuf) -> Result<PathBuf, ServiceError> {
    if !path.exists() {
        return Err(ServiceError::ModelLoad(format!(
            "model artifact missing: {}",
            path.display()
        )));
    }
    Ok(path)
}
