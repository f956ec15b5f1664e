use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::ServiceError,
    model::{
        GenerationRequest, GenerationResult, ModelMetadata, ModelSpec,
        generator::{Generator, ModelLoader},
    },
};

type Slot = Arc<OnceCell<Arc<dyn Generator>>>;

/// Outcome of asking the provider for a model.
#[derive(Clone)]
pub enum ModelHandle {
    Ready(Arc<dyn Generator>),
    /// The load failed; the reason has already been logged.
    Unavailable(String),
}

impl ModelHandle {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelHandle::Ready(_))
    }

    pub fn into_generator(self) -> Result<Arc<dyn Generator>, ServiceError> {
        match self {
            ModelHandle::Ready(generator) => Ok(generator),
            ModelHandle::Unavailable(reason) => Err(ServiceError::ModelUnavailable(reason)),
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHandle::Ready(generator) => f
                .debug_tuple("Ready")
                .field(&generator.metadata().name)
                .finish(),
            ModelHandle::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Process-wide model cache. Each spec is loaded at most once and kept for the
/// lifetime of the provider; failed loads leave the slot empty so a later call retries.
pub struct ModelProvider {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<ModelSpec, Slot>>,
    timeout: Duration,
}

impl ModelProvider {
    pub fn new(loader: Arc<dyn ModelLoader>, timeout: Duration) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the cached generator for `spec`, loading it on first use.
    ///
    /// Blocks while another caller is loading the same spec.
    pub fn load(&self, spec: &ModelSpec) -> ModelHandle {
        let slot = self.slots.lock().entry(spec.clone()).or_default().clone();

        let loaded = slot.get_or_try_init(|| {
            info!(model = %spec, "loading model artifacts");
            self.loader.load(spec)
        });

        match loaded {
            Ok(generator) => ModelHandle::Ready(generator.clone()),
            Err(err) => {
                error!(model = %spec, error = %err, "model failed to load");
                ModelHandle::Unavailable(err.to_string())
            }
        }
    }

    /// [`ModelProvider::load`] off the async executor.
    pub async fn acquire(self: &Arc<Self>, spec: &ModelSpec) -> ModelHandle {
        let provider = self.clone();
        let owned = spec.clone();
        match task::spawn_blocking(move || provider.load(&owned)).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(model = %spec, error = %err, "model load task failed");
                ModelHandle::Unavailable(format!("load task failed: {err}"))
            }
        }
    }

    pub fn loaded(&self) -> Vec<ModelMetadata> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| slot.get().map(|generator| generator.metadata()))
            .collect()
    }

    /// Runs one generation on the blocking pool, bounded by the provider timeout.
    pub async fn generate(
        &self,
        generator: Arc<dyn Generator>,
        request: GenerationRequest,
    ) -> Result<GenerationResult, ServiceError> {
        request.options.validate()?;

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let worker = task::spawn_blocking(move || generator.generate(&request, &worker_cancel));
        // dropping this future (client gone, outer timeout) stops the worker too
        let _stop_on_drop = cancel.clone().drop_guard();

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(joined) => joined
                .map_err(|err| ServiceError::Generation(format!("inference task failed: {err}")))?,
            Err(_) => {
                cancel.cancel();
                warn!(timeout = ?self.timeout, "generation timed out");
                Err(ServiceError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::model::GenerationOptions;

    struct Echo;

    impl Generator for Echo {
        fn generate(
            &self,
            request: &GenerationRequest,
            _cancel: &CancellationToken,
        ) -> Result<GenerationResult, ServiceError> {
            Ok(GenerationResult::new(format!("{} 42", request.prompt)))
        }

        fn metadata(&self) -> ModelMetadata {
            ModelMetadata {
                name: "echo".into(),
                adapter: None,
                backend: "test".into(),
                size_bytes: 0,
            }
        }
    }

    struct Stall;

    impl Generator for Stall {
        fn generate(
            &self,
            _request: &GenerationRequest,
            cancel: &CancellationToken,
        ) -> Result<GenerationResult, ServiceError> {
            let started = Instant::now();
            while started.elapsed() < Duration::from_secs(5) {
                if cancel.is_cancelled() {
                    return Err(ServiceError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(GenerationResult::new("too late"))
        }

        fn metadata(&self) -> ModelMetadata {
            Echo.metadata()
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Generator>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::ModelLoad(format!("{spec} is corrupt")));
            }
            Ok(Arc::new(Echo))
        }
    }

    #[test]
    fn same_spec_yields_same_instance() {
        let loader = Arc::new(CountingLoader::default());
        let provider = ModelProvider::new(loader.clone(), Duration::from_secs(1));
        let spec = ModelSpec::new("models/riddles");

        let first = provider.load(&spec).into_generator().unwrap();
        let second = provider.load(&spec).into_generator().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.loaded().len(), 1);
    }

    #[test]
    fn adapter_is_part_of_the_key() {
        let loader = Arc::new(CountingLoader::default());
        let provider = ModelProvider::new(loader.clone(), Duration::from_secs(1));

        provider.load(&ModelSpec::new("models/base"));
        provider.load(&ModelSpec::new("models/base").with_adapter("models/lora"));

        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_load_is_reported_and_retried() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..Default::default()
        });
        let provider = ModelProvider::new(loader.clone(), Duration::from_secs(1));
        let spec = ModelSpec::new("models/missing");

        let handle = provider.load(&spec);
        assert!(!handle.is_ready());
        assert!(matches!(
            handle.into_generator(),
            Err(ServiceError::ModelUnavailable(reason)) if reason.contains("corrupt")
        ));

        provider.load(&spec);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert!(provider.loaded().is_empty());
    }

    #[tokio::test]
    async fn generate_runs_on_blocking_pool() {
        let provider = Arc::new(ModelProvider::new(
            Arc::new(CountingLoader::default()),
            Duration::from_secs(1),
        ));
        let generator = provider
            .acquire(&ModelSpec::new("models/riddles"))
            .await
            .into_generator()
            .unwrap();

        let result = provider
            .generate(
                generator,
                GenerationRequest::new("Riddle:", GenerationOptions::default()),
            )
            .await
            .unwrap();
        assert_eq!(result.generated_text, "Riddle: 42");
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_generation() {
        let provider = ModelProvider::new(Arc::new(CountingLoader::default()), Duration::from_secs(1));
        let mut options = GenerationOptions::default();
        options.top_p = 2.0;

        let err = provider
            .generate(Arc::new(Echo), GenerationRequest::new("Riddle:", options))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let provider = ModelProvider::new(
            Arc::new(CountingLoader::default()),
            Duration::from_millis(50),
        );

        let err = provider
            .generate(
                Arc::new(Stall),
                GenerationRequest::new("Riddle:", GenerationOptions::default()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(limit) if limit == Duration::from_millis(50)));
    }

    /// Waits on the token and records whether it fired.
    struct Watcher {
        saw_cancel: Arc<AtomicBool>,
    }

    impl Generator for Watcher {
        fn generate(
            &self,
            _request: &GenerationRequest,
            cancel: &CancellationToken,
        ) -> Result<GenerationResult, ServiceError> {
            let started = Instant::now();
            while started.elapsed() < Duration::from_millis(500) {
                if cancel.is_cancelled() {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Err(ServiceError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(GenerationResult::new("finished"))
        }

        fn metadata(&self) -> ModelMetadata {
            Echo.metadata()
        }
    }

    #[tokio::test]
    async fn dropping_the_call_cancels_the_worker() {
        let provider = ModelProvider::new(
            Arc::new(CountingLoader::default()),
            Duration::from_secs(30),
        );
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let generator = Arc::new(Watcher {
            saw_cancel: saw_cancel.clone(),
        });

        let call = provider.generate(
            generator,
            GenerationRequest::new("Riddle:", GenerationOptions::default()),
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(50), call)
                .await
                .is_err()
        );

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    struct SlowLoader {
        calls: AtomicUsize,
    }

    impl ModelLoader for SlowLoader {
        fn load(&self, _spec: &ModelSpec) -> Result<Arc<dyn Generator>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(Echo))
        }
    }

    #[test]
    fn concurrent_loads_share_one_instance() {
        let loader = Arc::new(SlowLoader {
            calls: AtomicUsize::new(0),
        });
        let provider = ModelProvider::new(loader.clone(), Duration::from_secs(1));
        let spec = ModelSpec::new("models/riddles");

        let generators: Vec<Arc<dyn Generator>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| provider.load(&spec).into_generator().unwrap()))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect()
        });

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(generators.iter().all(|g| Arc::ptr_eq(g, &generators[0])));
    }
}
