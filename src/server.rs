use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{ModelMetadata, ModelProvider},
    tasks::{EmojiExample, MathTasks, MemeExample, RiddleExample},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tasks: Arc<MathTasks>,
}

/// `Json` whose rejections render as [`ServiceError::BadRequest`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServiceError))]
struct ApiJson<T>(T);

#[derive(Debug, Deserialize)]
pub struct CountRequest {
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct SolveRiddleRequest {
    pub riddle: String,
}

#[derive(Debug, Deserialize)]
pub struct RepairMemeRequest {
    pub meme: String,
}

#[derive(Debug, Deserialize)]
pub struct SolveEmojiRequest {
    pub problem: String,
}

#[derive(Debug, Serialize)]
pub struct RiddlesResponse {
    pub riddles: Vec<RiddleExample>,
}

#[derive(Debug, Serialize)]
pub struct ExamplesResponse<T> {
    pub examples: Vec<T>,
}

#[derive(Serialize)]
struct MetadataResponse {
    models: Vec<ModelMetadata>,
    generation_timeout_secs: u64,
}

pub fn build_router(config: Arc<AppConfig>, provider: Arc<ModelProvider>) -> Router {
    let tasks = Arc::new(MathTasks::new(config.clone(), provider));
    let state = AppState { config, tasks };

    Router::new()
        .route("/health", get(health))
        .route("/metadata", get(metadata))
        .route("/riddles", post(generate_riddles))
        .route("/riddles/solve", post(solve_riddle))
        .route("/memes/repair", post(repair_meme))
        .route("/memes/examples", post(meme_examples))
        .route("/emoji/solve", post(solve_emoji))
        .route("/emoji/riddles", post(emoji_riddles))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn metadata(State(state): State<AppState>) -> Json<MetadataResponse> {
    Json(MetadataResponse {
        models: state.tasks.provider().loaded(),
        generation_timeout_secs: state.config.generation_timeout.as_secs(),
    })
}

async fn generate_riddles(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CountRequest>,
) -> Result<Json<RiddlesResponse>, ServiceError> {
    info!(count = request.count, "generating riddles");
    let riddles = state.tasks.generate_riddles(request.count).await?;
    Ok(Json(RiddlesResponse { riddles }))
}

async fn solve_riddle(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SolveRiddleRequest>,
) -> Result<Json<RiddleExample>, ServiceError> {
    let example = state.tasks.solve_riddle(&request.riddle).await?;
    Ok(Json(example))
}

async fn repair_meme(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RepairMemeRequest>,
) -> Result<Json<MemeExample>, ServiceError> {
    let example = state.tasks.repair_meme(&request.meme).await?;
    Ok(Json(example))
}

async fn meme_examples(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CountRequest>,
) -> Result<Json<ExamplesResponse<MemeExample>>, ServiceError> {
    info!(count = request.count, "generating meme examples");
    let examples = state.tasks.meme_examples(request.count).await?;
    Ok(Json(ExamplesResponse { examples }))
}

async fn solve_emoji(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SolveEmojiRequest>,
) -> Result<Json<EmojiExample>, ServiceError> {
    let example = state.tasks.solve_emoji(&request.problem).await?;
    Ok(Json(example))
}

async fn emoji_riddles(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CountRequest>,
) -> Result<Json<ExamplesResponse<EmojiExample>>, ServiceError> {
    info!(count = request.count, "generating emoji riddles");
    let examples = state.tasks.emoji_riddles(request.count).await?;
    Ok(Json(ExamplesResponse { examples }))
}
