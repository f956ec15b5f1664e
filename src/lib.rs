pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod prompt;
pub mod server;
pub mod tasks;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{GenerationOptions, GenerationRequest, GenerationResult, ModelProvider};
pub use server::build_router;
pub use tasks::{EmojiExample, MathTasks, MemeExample, RiddleExample};
