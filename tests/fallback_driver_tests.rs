use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use coursegen::providers::{ChatSpec, PerplexityProvider};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const SUCCESS_CONTENT: &str = r#"{"questions":[{"question":"Q"}]}"#;

/// Stand-in for the Perplexity chat-completions endpoint. Records the model
/// named by each request and fails every model except `succeed_on`.
#[derive(Clone)]
struct MockUpstream {
    seen_models: Arc<Mutex<Vec<String>>>,
    succeed_on: Option<String>,
}

impl MockUpstream {
    fn new(succeed_on: Option<&str>) -> Self {
        Self {
            seen_models: Arc::new(Mutex::new(Vec::new())),
            succeed_on: succeed_on.map(str::to_string),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen_models.lock().unwrap().clone()
    }
}

async fn chat_completions(
    State(upstream): State<MockUpstream>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    upstream.seen_models.lock().unwrap().push(model.clone());

    if upstream.succeed_on.as_deref() == Some(model.as_str()) {
        (
            StatusCode::OK,
            Json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": SUCCESS_CONTENT}}
                ]
            })),
        )
    } else {
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": {"message": format!("{model} unavailable")}})),
        )
    }
}

async fn start_mock(upstream: MockUpstream) -> String {
    let app = Router::new()
        .route("/chat/completions", post(chat_completions))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn quiz_spec() -> ChatSpec<'static> {
    ChatSpec {
        system: "You output strict JSON only.",
        prompt: "Generate a quiz about testing.",
        max_tokens: 500,
        schema_name: "quiz_schema",
        schema: json!({"type": "object"}),
    }
}

#[tokio::test]
async fn driver_walks_models_in_order_until_the_last_succeeds() {
    let upstream = MockUpstream::new(Some("model-c"));
    let base_url = start_mock(upstream.clone()).await;
    let provider = PerplexityProvider::new(Some(base_url));

    let content = provider
        .complete_with_fallback("test-key", &["model-a", "model-b", "model-c"], &quiz_spec())
        .await
        .unwrap();

    assert_eq!(content, SUCCESS_CONTENT);
    assert_eq!(upstream.seen(), vec!["model-a", "model-b", "model-c"]);
}

#[tokio::test]
async fn driver_stops_at_the_first_success() {
    let upstream = MockUpstream::new(Some("model-a"));
    let base_url = start_mock(upstream.clone()).await;
    let provider = PerplexityProvider::new(Some(base_url));

    let content = provider
        .complete_with_fallback("test-key", &["model-a", "model-b", "model-c"], &quiz_spec())
        .await
        .unwrap();

    assert_eq!(content, SUCCESS_CONTENT);
    assert_eq!(upstream.seen(), vec!["model-a"]);
}

#[tokio::test]
async fn driver_surfaces_the_last_error_after_exhausting_the_list() {
    let upstream = MockUpstream::new(None);
    let base_url = start_mock(upstream.clone()).await;
    let provider = PerplexityProvider::new(Some(base_url));

    let err = provider
        .complete_with_fallback("test-key", &["model-a", "model-b", "model-c"], &quiz_spec())
        .await
        .unwrap_err();

    assert_eq!(upstream.seen().len(), 3);
    assert_eq!(err.model, "model-c");
    assert_eq!(err.status, Some(502));
    assert!(err.message.contains("model-c unavailable"));
}

#[tokio::test]
async fn unreachable_upstream_is_recorded_per_model_not_fatal() {
    // Nothing listens on this port; every attempt fails at transport level
    // and the driver still walks the whole list.
    let provider = PerplexityProvider::new(Some("http://127.0.0.1:9".to_string()));

    let err = provider
        .complete_with_fallback("test-key", &["model-a", "model-b"], &quiz_spec())
        .await
        .unwrap_err();

    assert_eq!(err.model, "model-b");
    assert_eq!(err.status, None);
}
