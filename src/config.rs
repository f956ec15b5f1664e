use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

#[cfg(feature = "tch-backend")]
use tch::Device;

use crate::model::ModelSpec;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub riddle_model: ModelSpec,
    pub meme_model: ModelSpec,
    pub emoji_model: ModelSpec,
    pub context_window: usize,
    pub eos_token_id: i64,
    pub generation_timeout: Duration,
    pub sampling_seed: Option<u64>,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        let riddle_path = PathBuf::from(
            env::var("RIDDLE_MODEL_PATH")
                .unwrap_or_else(|_| "models/math_riddle_generator".to_string()),
        );
        let meme_path = env::var("MEME_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| riddle_path.clone());
        let emoji_path = env::var("EMOJI_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| riddle_path.clone());

        let mut emoji_model = ModelSpec::new(emoji_path);
        if let Ok(adapter) = env::var("EMOJI_ADAPTER_PATH") {
            emoji_model = emoji_model.with_adapter(adapter);
        }

        let context_window = env::var("CONTEXT_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);
        let eos_token_id = env::var("EOS_TOKEN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50256);
        let generation_timeout = env::var("GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));
        let sampling_seed = env::var("SAMPLING_SEED").ok().and_then(|v| v.parse().ok());

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = env::var("DEVICE").unwrap_or_else(|_| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            riddle_model: ModelSpec::new(riddle_path),
            meme_model: ModelSpec::new(meme_path),
            emoji_model,
            context_window,
            eos_token_id,
            generation_timeout,
            sampling_seed,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }

    /// Every distinct model the service may load, in task order.
    pub fn model_specs(&self) -> Vec<ModelSpec> {
        let mut specs: Vec<ModelSpec> = Vec::with_capacity(3);
        for spec in [&self.riddle_model, &self.meme_model, &self.emoji_model] {
            if !specs.contains(spec) {
                specs.push(spec.clone());
            }
        }
        specs
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let riddle_model = ModelSpec::new("models/math_riddle_generator");
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            meme_model: riddle_model.clone(),
            emoji_model: riddle_model.clone(),
            riddle_model,
            context_window: 1024,
            eos_token_id: 50256,
            generation_timeout: Duration::from_secs(60),
            sampling_seed: None,
            #[cfg(feature = "tch-backend")]
            device: Device::Cpu,
        }
    }
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            tracing::warn!(requested = %raw, "CUDA unavailable, falling back to CPU");
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}
