//! LoRA adapters in the PEFT on-disk layout, merged into base weights at load time.

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;

use crate::error::ServiceError;

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

const PEFT_PREFIX: &str = "base_model.model.";

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub r: usize,
    pub lora_alpha: f64,
    /// Base layers store weights as `[in, out]` (GPT-2 `Conv1D`).
    #[serde(default)]
    pub fan_in_fan_out: bool,
}

impl AdapterConfig {
    pub fn from_dir(dir: &Path) -> Result<Self, ServiceError> {
        let path = dir.join(ADAPTER_CONFIG_FILE);
        let raw = fs::read_to_string(&path)?;
        let config: AdapterConfig = serde_json::from_str(&raw).map_err(|e| {
            ServiceError::ModelLoad(format!("invalid adapter config {}: {e}", path.display()))
        })?;
        if config.r == 0 {
            return Err(ServiceError::ModelLoad(format!(
                "adapter rank must be positive in {}",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn scaling(&self) -> f64 {
        self.lora_alpha / self.r as f64
    }
}

/// The two low-rank factors that update one base weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoraPair {
    pub target: String,
    pub a: String,
    pub b: String,
}

/// Groups adapter tensor names into A/B pairs keyed by the base weight they update.
/// Names missing their partner are skipped.
pub fn pair_lora_tensors<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<LoraPair> {
    let mut halves: BTreeMap<String, (Option<String>, Option<String>)> = BTreeMap::new();
    for name in names {
        let stripped = name.strip_prefix(PEFT_PREFIX).unwrap_or(name);
        let (module, is_a) = if let Some((module, _)) = stripped.split_once(".lora_A.") {
            (module, true)
        } else if let Some((module, _)) = stripped.split_once(".lora_B.") {
            (module, false)
        } else {
            continue;
        };
        let entry = halves.entry(format!("{module}.weight")).or_default();
        if is_a {
            entry.0 = Some(name.to_string());
        } else {
            entry.1 = Some(name.to_string());
        }
    }

    halves
        .into_iter()
        .filter_map(|(target, halves)| match halves {
            (Some(a), Some(b)) => Some(LoraPair { target, a, b }),
            _ => None,
        })
        .collect()
}

/// Whether a parameter of the traced module is the base weight `target`.
/// Traced wrappers may add leading path segments.
pub fn matches_target(parameter: &str, target: &str) -> bool {
    parameter == target
        || parameter
            .strip_suffix(target)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(feature = "tch-backend")]
pub fn merge_into(module: &tch::CModule, dir: &Path) -> Result<usize, ServiceError> {
    use std::collections::HashMap;

    use tch::Tensor;

    let config = AdapterConfig::from_dir(dir)?;
    let weights = Tensor::read_safetensors(dir.join(ADAPTER_WEIGHTS_FILE))
        .map_err(|e| ServiceError::ModelLoad(format!("adapter weights: {e}")))?;
    let weights: HashMap<String, Tensor> = weights.into_iter().collect();
    let pairs = pair_lora_tensors(weights.keys().map(String::as_str));
    if pairs.is_empty() {
        return Err(ServiceError::ModelLoad(format!(
            "adapter {} holds no LoRA weight pairs",
            dir.display()
        )));
    }

    let parameters = module
        .named_parameters()
        .map_err(|e| ServiceError::ModelLoad(e.to_string()))?;
    let scale = config.scaling();

    tch::no_grad(|| {
        let mut merged = 0;
        for pair in &pairs {
            let Some((_, weight)) = parameters
                .iter()
                .find(|(name, _)| matches_target(name, &pair.target))
            else {
                tracing::warn!(target = %pair.target, "adapter layer has no base weight");
                continue;
            };
            let (Some(a), Some(b)) = (weights.get(&pair.a), weights.get(&pair.b)) else {
                continue;
            };
            let a = a.to_device(weight.device()).to_kind(weight.kind());
            let b = b.to_device(weight.device()).to_kind(weight.kind());

            let mut delta = b.matmul(&a) * scale;
            if config.fan_in_fan_out || delta.size() != weight.size() {
                delta = delta.transpose(0, 1);
            }
            if delta.size() != weight.size() {
                return Err(ServiceError::ModelLoad(format!(
                    "adapter update for {} has shape {:?}, base weight is {:?}",
                    pair.target,
                    delta.size(),
                    weight.size()
                )));
            }

            let mut weight = weight.shallow_clone();
            weight
                .f_add_(&delta)
                .map_err(|e| ServiceError::ModelLoad(e.to_string()))?;
            merged += 1;
        }
        Ok(merged)
    })
}
