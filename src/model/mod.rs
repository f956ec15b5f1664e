pub mod adapter;
mod generator;
mod provider;
pub mod sampling;
mod types;
pub mod window;

#[cfg(feature = "tch-backend")]
mod loader;

use std::sync::Arc;

use crate::config::AppConfig;

pub use generator::{Generator, ModelLoader};
#[cfg(feature = "tch-backend")]
pub use loader::{TorchGenerator, TorchLoader};
pub use provider::{ModelHandle, ModelProvider};
pub use types::{GenerationOptions, GenerationRequest, GenerationResult, ModelMetadata, ModelSpec};

/// The loader for whichever inference backend this build carries.
pub fn default_loader(config: &AppConfig) -> Arc<dyn ModelLoader> {
    #[cfg(feature = "tch-backend")]
    {
        Arc::new(TorchLoader::from_config(config))
    }
    #[cfg(not(feature = "tch-backend"))]
    {
        let _ = config;
        Arc::new(generator::UnsupportedLoader)
    }
}
