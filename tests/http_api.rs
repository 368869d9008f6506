use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use marian_gateway::api::{ChatCompletion, FlatTranslation};
use marian_gateway::config::Settings;
use marian_gateway::routes::HealthReport;
use marian_gateway::state::AppState;
use marian_gateway::translate::{ModelInfo, ModelStatus, TranslateError, TranslationService, Translator};

/// Prefixes the input with the target language and remembers every call
struct RecordingTranslator {
    info: ModelInfo,
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingTranslator {
    fn new() -> Self {
        Self {
            info: ModelInfo {
                model_id: "opus-mt-en-ru".to_string(),
                source_language: "en".to_string(),
                target_language: "ru".to_string(),
            },
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Translator for RecordingTranslator {
    fn translate(&self, text: &str) -> Result<String, TranslateError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(TranslateError::Tokenizer("unknown token".to_string()));
        }
        Ok(format!("[ru] {}", text))
    }

    fn info(&self) -> &ModelInfo {
        &self.info
    }
}

fn app_with(translator: Arc<RecordingTranslator>) -> Router {
    let settings = Settings::default();
    let service = TranslationService::with_translator(translator, &settings.inference);
    marian_gateway::build_app(AppState::with_translation(settings, service))
}

fn app_without_model() -> Router {
    marian_gateway::build_app(AppState::new(Settings::default()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_direct_payload_gets_chat_completion() {
    let translator = Arc::new(RecordingTranslator::new());
    let (status, body) = send(
        app_with(translator.clone()),
        post_json("/translate", &json!({"source": "Hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let completion: ChatCompletion = serde_json::from_slice(&body).unwrap();
    assert_eq!(completion.id, "test");
    assert_eq!(completion.object, "chat.completion");
    assert_eq!(completion.choices[0].index, 0);
    assert_eq!(completion.choices[0].message.role, "assistant");
    assert_eq!(completion.choices[0].finish_reason, "stop");
    assert_eq!(completion.content(), Some("[ru] Hello"));
    assert_eq!(translator.calls(), vec!["Hello"]);
}

#[tokio::test]
async fn test_chat_payload_translates_last_user_message() {
    let translator = Arc::new(RecordingTranslator::new());
    let payload = json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "system", "content": "x"},
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "y"}
        ]
    });
    let (status, body) = send(app_with(translator.clone()), post_json("/translate", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    let completion: ChatCompletion = serde_json::from_slice(&body).unwrap();
    assert_eq!(completion.content(), Some("[ru] Hi"));
    assert_eq!(translator.calls(), vec!["Hi"]);
}

#[tokio::test]
async fn test_unrecognized_payload_short_circuits() {
    let translator = Arc::new(RecordingTranslator::new());
    let (status, body) = send(app_with(translator.clone()), post_json("/translate", &json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({"translation": ""}));
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn test_unrecognized_payload_works_without_model() {
    let (status, body) = send(app_without_model(), post_json("/translate", &json!({"text": "Hi"}))).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({"translation": ""}));
}

#[tokio::test]
async fn test_chat_without_user_messages_skips_model() {
    let translator = Arc::new(RecordingTranslator::new());
    let payload = json!({"messages": [{"role": "system", "content": "only system"}]});
    let (status, body) = send(app_with(translator.clone()), post_json("/translate", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    let completion: ChatCompletion = serde_json::from_slice(&body).unwrap();
    assert_eq!(completion.content(), Some(""));
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn test_unusable_last_user_turn_does_not_translate_older_turn() {
    let translator = Arc::new(RecordingTranslator::new());
    let payload = json!({
        "messages": [
            {"role": "user", "content": "old question"},
            {"role": "assistant", "content": "answer"},
            {"role": "user", "content": 42}
        ]
    });
    let (status, body) = send(app_with(translator.clone()), post_json("/translate", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    let completion: ChatCompletion = serde_json::from_slice(&body).unwrap();
    assert_eq!(completion.content(), Some(""));
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn test_language_tags_are_not_forwarded() {
    let translator = Arc::new(RecordingTranslator::new());
    let payload = json!({"source": "Hello", "source_language": "de", "target_language": "fr"});
    let (status, body) = send(app_with(translator.clone()), post_json("/translate", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    let completion: ChatCompletion = serde_json::from_slice(&body).unwrap();
    assert_eq!(completion.content(), Some("[ru] Hello"));
    assert_eq!(translator.calls(), vec!["Hello"]);
}

#[tokio::test]
async fn test_identical_requests_render_identically() {
    let translator = Arc::new(RecordingTranslator::new());
    let payload = json!({"source": "Hello"});
    let (_, first) = send(app_with(translator.clone()), post_json("/translate", &payload)).await;
    let (_, second) = send(app_with(translator), post_json("/translate", &payload)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_invalid_bodies_are_rejected() {
    let translator = Arc::new(RecordingTranslator::new());

    let request = Request::builder()
        .method("POST")
        .uri("/translate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app_with(translator.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], 400);
    assert!(value["error"].as_str().unwrap().starts_with("Invalid payload"));

    let (status, _) = send(app_with(translator.clone()), post_json("/translate", &json!(["Hello"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn test_model_not_loaded_is_unavailable() {
    let (status, body) = send(app_without_model(), post_json("/translate", &json!({"source": "Hello"}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], 503);
}

#[tokio::test]
async fn test_translator_failure_is_unavailable() {
    let translator = Arc::new(RecordingTranslator::failing());
    let (status, _) = send(app_with(translator.clone()), get("/test")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(translator.calls(), vec!["Hello, world!"]);
}

#[tokio::test]
async fn test_fixed_test_route() {
    let translator = Arc::new(RecordingTranslator::new());
    let (status, body) = send(app_with(translator), get("/test")).await;

    assert_eq!(status, StatusCode::OK);
    let flat: FlatTranslation = serde_json::from_slice(&body).unwrap();
    assert_eq!(flat, FlatTranslation::new("Hello, world!", "[ru] Hello, world!"));
}

#[tokio::test]
async fn test_interactive_route() {
    let translator = Arc::new(RecordingTranslator::new());
    let (status, body) = send(app_with(translator), get("/interactive?text=Hello")).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({"source": "Hello", "translation": "[ru] Hello"}));
}

#[tokio::test]
async fn test_interactive_route_decodes_query() {
    let translator = Arc::new(RecordingTranslator::new());
    let (status, body) = send(
        app_with(translator.clone()),
        get("/interactive?text=Good%20morning%2C%20%D0%BC%D0%B8%D1%80"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let flat: FlatTranslation = serde_json::from_slice(&body).unwrap();
    assert_eq!(flat.source, "Good morning, мир");
    assert_eq!(translator.calls(), vec!["Good morning, мир"]);
}

#[tokio::test]
async fn test_interactive_requires_text() {
    let translator = Arc::new(RecordingTranslator::new());
    let (status, body) = send(app_with(translator.clone()), get("/interactive")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"], "Missing parameter: text");
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn test_ui_page() {
    let response = app_without_model().oneshot(get("/ui")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains(r#"action="/interactive""#));
    assert!(html.contains(r#"method="get""#));
    assert!(html.contains(r#"name="text""#));
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let (status, body) = send(app_without_model(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let report: HealthReport = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.status, "ok");
    assert_eq!(report.model, ModelStatus::Loading);
    assert_eq!(report.model_id, "opus-mt-en-ru");

    let (_, body) = send(app_with(Arc::new(RecordingTranslator::new())), get("/health")).await;
    let report: HealthReport = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.model, ModelStatus::Ready);
    assert_eq!(report.source_language, "en");
    assert_eq!(report.target_language, "ru");
}
