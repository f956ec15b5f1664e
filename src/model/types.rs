use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Sampling and length controls for a single generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Token budget, prompt included.
    pub max_length: usize,
    pub temperature: f64,
    pub do_sample: bool,
    pub top_k: usize,
    pub top_p: f64,
    /// Cut prompts that exceed the model context window instead of rejecting them.
    pub truncation: bool,
}

impl GenerationOptions {
    pub fn sampled(max_length: usize, temperature: f64, top_k: usize, top_p: f64) -> Self {
        Self {
            max_length,
            temperature,
            do_sample: temperature > 0.0,
            top_k,
            top_p,
            truncation: true,
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.max_length == 0 {
            return Err(ServiceError::BadRequest(
                "max_length must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ServiceError::BadRequest(format!(
                "temperature {} outside [0, 1]",
                self.temperature
            )));
        }
        if self.top_k == 0 {
            return Err(ServiceError::BadRequest("top_k must be positive".into()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ServiceError::BadRequest(format!(
                "top_p {} outside (0, 1]",
                self.top_p
            )));
        }
        Ok(())
    }

    /// Whether the call should draw from the distribution rather than take the arg-max.
    pub fn is_sampling(&self) -> bool {
        self.do_sample && self.temperature > 0.0
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::sampled(50, 0.7, 50, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            prompt: prompt.into(),
            options,
        }
    }
}

/// Raw generator output. `generated_text` starts with the prompt it was asked to continue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub generated_text: String,
}

impl GenerationResult {
    pub fn new(generated_text: impl Into<String>) -> Self {
        Self {
            generated_text: generated_text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub adapter: Option<String>,
    pub backend: String,
    pub size_bytes: u64,
}

/// Identifies a model artifact: a base model directory plus an optional LoRA adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub adapter: Option<PathBuf>,
}

impl ModelSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            adapter: None,
        }
    }

    pub fn with_adapter(mut self, adapter: impl Into<PathBuf>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.adapter {
            Some(adapter) => write!(f, "{}+{}", self.path.display(), adapter.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_temperature_disables_sampling() {
        let options = GenerationOptions::sampled(50, 0.0, 50, 0.9);
        assert!(!options.do_sample);
        assert!(!options.is_sampling());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_options() {
        let mut options = GenerationOptions::default();
        options.temperature = 1.5;
        assert!(matches!(options.validate(), Err(ServiceError::BadRequest(_))));

        let mut options = GenerationOptions::default();
        options.top_p = 0.0;
        assert!(options.validate().is_err());

        let mut options = GenerationOptions::default();
        options.max_length = 0;
        assert!(options.validate().is_err());

        let mut options = GenerationOptions::default();
        options.top_k = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn spec_display_includes_adapter() {
        let spec = ModelSpec::new("models/base").with_adapter("models/lora");
        assert_eq!(spec.to_string(), "models/base+models/lora");
        assert_eq!(ModelSpec::new("models/base").to_string(), "models/base");
    }
}
