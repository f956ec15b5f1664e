use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::ServiceError,
    model::{GenerationRequest, GenerationResult, ModelMetadata, ModelSpec},
};

/// A loaded model that continues prompts.
///
/// `generate` blocks the calling thread. Implementations must check `cancel`
/// between decoding steps and return [`ServiceError::Cancelled`] once it fires.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ServiceError>;

    fn metadata(&self) -> ModelMetadata;
}

/// Builds generators from on-disk artifacts.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Generator>, ServiceError>;
}

/// Loader used when the crate is compiled without an inference backend.
#[cfg(not(feature = "tch-backend"))]
pub struct UnsupportedLoader;

#[cfg(not(feature = "tch-backend"))]
impl ModelLoader for UnsupportedLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Generator>, ServiceError> {
        Err(ServiceError::ModelLoad(format!(
            "cannot load {spec}: built without the tch backend"
        )))
    }
}
