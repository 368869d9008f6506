use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{ChatCompletion, EmptyTranslation, FlatTranslation, IncomingPayload, TranslateReply};
use crate::error::AppError;
use crate::state::AppState;
use crate::translate::ModelStatus;
use crate::utils::logging::pretty_json;

/// Input of the `/test` smoke route
pub const TEST_TEXT: &str = "Hello, world!";

const UI_PAGE: &str = include_str!("../static/ui.html");

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/translate", post(translate_text))
        .route("/test", get(test_translation))
        .route("/ui", get(ui))
        .route("/interactive", get(interactive_translation))
        .route("/health", get(health_check))
}

/// Translate `text` unless it is empty; empty input never reaches the model.
async fn translate_logged(state: &AppState, text: &str, label: &str) -> Result<String, AppError> {
    if text.is_empty() {
        debug!("{}: empty source, skipping model", label);
        return Ok(String::new());
    }

    let translation = state.translation.translate(text).await?;
    info!("{}: {} → {}", label, text, translation);
    Ok(translation)
}

fn log_language_tags(state: &AppState, payload: &IncomingPayload) {
    let model = &state.settings.model;
    let (source_language, target_language) = payload.language_tags();
    let mismatch = source_language.is_some_and(|l| l != model.source_language)
        || target_language.is_some_and(|l| l != model.target_language);
    if mismatch {
        debug!(
            "Requested {:?} -> {:?}, but this deployment translates {} -> {}",
            source_language, target_language, model.source_language, model.target_language
        );
    }
}

async fn translate_text(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TranslateReply>, AppError> {
    let (raw, payload) = IncomingPayload::from_slice(&body)?;
    info!("Incoming translation request:\n{}", pretty_json(&raw));

    let Some(text) = payload.source_text() else {
        info!("No recognized text in payload, returning empty translation");
        return Ok(Json(TranslateReply::Empty(EmptyTranslation::default())));
    };
    log_language_tags(&state, &payload);

    let translation = translate_logged(&state, text, "Translation").await?;
    let reply = TranslateReply::Completion(ChatCompletion::from_translation(translation));
    info!("Response (chat completion):\n{}", pretty_json(&reply));

    Ok(Json(reply))
}

async fn test_translation(State(state): State<AppState>) -> Result<Json<FlatTranslation>, AppError> {
    let translation = translate_logged(&state, TEST_TEXT, "Test translation").await?;
    Ok(Json(FlatTranslation::new(TEST_TEXT, translation)))
}

async fn ui() -> Html<&'static str> {
    Html(UI_PAGE)
}

#[derive(Debug, Deserialize)]
struct InteractiveParams {
    text: Option<String>,
}

async fn interactive_translation(
    State(state): State<AppState>,
    Query(params): Query<InteractiveParams>,
) -> Result<Json<FlatTranslation>, AppError> {
    let text = params.text.ok_or(AppError::MissingParameter("text"))?;
    let translation = translate_logged(&state, &text, "Interactive translation").await?;
    Ok(Json(FlatTranslation::new(text, translation)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model: ModelStatus,
    pub model_id: String,
    pub source_language: String,
    pub target_language: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let model = &state.settings.model;
    let info = state.translation.model_info();

    Json(HealthReport {
        status: "ok".to_string(),
        model: state.translation.status(),
        model_id: info
            .as_ref()
            .map(|i| i.model_id.clone())
            .unwrap_or_else(|| model.model_id()),
        source_language: info
            .as_ref()
            .map(|i| i.source_language.clone())
            .unwrap_or_else(|| model.source_language.clone()),
        target_language: info
            .map(|i| i.target_language)
            .unwrap_or_else(|| model.target_language.clone()),
    })
}
