mod types;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use tracing::warn;

use crate::{
    batch,
    config::AppConfig,
    error::ServiceError,
    extract,
    model::{GenerationOptions, GenerationRequest, Generator, ModelProvider, ModelSpec},
    prompt,
};

pub use types::{EmojiExample, ExtractedAnswer, MemeExample, RiddleExample};

/// The user-facing operations: prompt, generate, extract.
pub struct MathTasks {
    config: Arc<AppConfig>,
    provider: Arc<ModelProvider>,
    rng: Mutex<StdRng>,
}

impl MathTasks {
    pub fn new(config: Arc<AppConfig>, provider: Arc<ModelProvider>) -> Self {
        let rng = match config.sampling_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            provider,
            rng: Mutex::new(rng),
        }
    }

    pub fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    pub async fn generate_riddles(&self, count: usize) -> Result<Vec<RiddleExample>, ServiceError> {
        batch::validate_count(count)?;
        let generator = self.generator(&self.config.riddle_model).await?;
        batch::collect(count, |_| self.generate_riddle(generator.clone())).await
    }

    pub async fn solve_riddle(&self, riddle: &str) -> Result<RiddleExample, ServiceError> {
        let prompt = prompt::riddle_solving(riddle)?;
        let generator = self.generator(&self.config.riddle_model).await?;
        let generated = self
            .run(generator, prompt.clone(), solve_riddle_options())
            .await?;
        Ok(RiddleExample {
            riddle: riddle.trim().to_string(),
            solution: Some(extract::extract_answer(
                &prompt,
                &generated,
                prompt::SOLUTION_MARKER,
            )),
        })
    }

    pub async fn repair_meme(&self, meme: &str) -> Result<MemeExample, ServiceError> {
        let meme = prompt::normalize_meme(meme)?;
        let generator = self.generator(&self.config.meme_model).await?;
        self.repair_with(generator, meme).await
    }

    pub async fn meme_examples(&self, count: usize) -> Result<Vec<MemeExample>, ServiceError> {
        batch::validate_count(count)?;
        let generator = self.generator(&self.config.meme_model).await?;
        batch::collect(count, |_| {
            let meme = prompt::random_meme(&mut *self.rng.lock()).to_string();
            self.repair_with(generator.clone(), meme)
        })
        .await
    }

    pub async fn solve_emoji(&self, problem: &str) -> Result<EmojiExample, ServiceError> {
        let prompt = prompt::emoji_solving(problem)?;
        let generator = self.generator(&self.config.emoji_model).await?;
        let generated = self.run(generator, prompt.clone(), emoji_options()).await?;
        Ok(EmojiExample {
            problem: problem.trim().to_string(),
            solution: Some(extract::extract_answer(
                &prompt,
                &generated,
                prompt::ARROW_MARKER,
            )),
        })
    }

    pub async fn emoji_riddles(&self, count: usize) -> Result<Vec<EmojiExample>, ServiceError> {
        batch::validate_count(count)?;
        let generator = self.generator(&self.config.emoji_model).await?;
        batch::collect(count, |_| {
            let seed = prompt::emoji_generation(&mut *self.rng.lock());
            self.generate_emoji(generator.clone(), seed)
        })
        .await
    }

    async fn generate_riddle(
        &self,
        generator: Arc<dyn Generator>,
    ) -> Result<RiddleExample, ServiceError> {
        let prompt = prompt::riddle_generation();
        let generated = self
            .run(generator, prompt.clone(), riddle_options())
            .await?;
        Ok(extract::riddle_example(&prompt, &generated))
    }

    async fn repair_with(
        &self,
        generator: Arc<dyn Generator>,
        meme: String,
    ) -> Result<MemeExample, ServiceError> {
        let prompt = prompt::meme_repair(&meme);
        let generated = self.run(generator, prompt.clone(), meme_options()).await?;
        let answer = extract::meme_answer(&meme, &prompt, &generated, prompt::CORRECT_MARKER);
        Ok(MemeExample {
            before: answer.before.unwrap_or(meme),
            after: answer.after,
        })
    }

    async fn generate_emoji(
        &self,
        generator: Arc<dyn Generator>,
        seed: String,
    ) -> Result<EmojiExample, ServiceError> {
        let generated = self.run(generator, seed, emoji_options()).await?;
        Ok(extract::emoji_example(&generated))
    }

    async fn generator(&self, spec: &ModelSpec) -> Result<Arc<dyn Generator>, ServiceError> {
        self.provider.acquire(spec).await.into_generator()
    }

    async fn run(
        &self,
        generator: Arc<dyn Generator>,
        prompt: String,
        options: GenerationOptions,
    ) -> Result<String, ServiceError> {
        let request = GenerationRequest::new(prompt, options);
        match self.provider.generate(generator, request).await {
            Ok(result) => Ok(result.generated_text),
            Err(err) => {
                warn!(error = %err, "generation failed");
                Err(err)
            }
        }
    }
}

fn riddle_options() -> GenerationOptions {
    GenerationOptions::sampled(50, 0.8, 50, 0.95)
}

fn solve_riddle_options() -> GenerationOptions {
    GenerationOptions::sampled(100, 0.2, 50, 0.9)
}

fn meme_options() -> GenerationOptions {
    GenerationOptions::sampled(64, 0.3, 50, 0.9)
}

fn emoji_options() -> GenerationOptions {
    GenerationOptions::sampled(48, 0.5, 40, 0.9)
}
