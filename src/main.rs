use axum::{
    extract::{DefaultBodyLimit, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

pub mod assistant;
pub mod config;
pub mod extractor;
pub mod gemini;
pub mod media;
pub mod models;
pub mod resolver;

use assistant::{Assistant, AssistantError};
use config::AppConfig;
use gemini::GeminiClient;
use models::{DocumentRequest, DraftRequest, DraftResponse, GeneratedText, ModelStatus, PhotoRequest};
use resolver::{ModelResolver, ResolverPolicy};

// Photos arrive base64-encoded inside JSON.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

// filename* carries 起草稿.txt percent-encoded; filename is the ASCII fallback.
const DRAFT_CONTENT_DISPOSITION: &str =
    "attachment; filename=\"draft.txt\"; filename*=UTF-8''%E8%B5%B7%E8%8D%89%E7%A8%BF.txt";

const BANNER: &str = r#"
   /\        /\        /\
  /  \      /  \      /  \       林业办公智能助手
 /    \    /    \    /    \      Forestry Office Assistant
/______\  /______\  /______\
   ||        ||        ||        公文润色 · 拍照识物 · 填空起草
"#;

#[derive(Clone)]
struct AppState {
    assistant: Assistant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\x1b[32m{}\x1b[0m", BANNER);
    println!("\x1b[1;30m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");
    println!(" 🔧 \x1b[1mSYSTEM CHECK\x1b[0m");

    let config = match AppConfig::from_env() {
        Ok(config) => {
            println!("    ├─ 🧠 Gemini AI    : \x1b[32m✅ READY\x1b[0m");
            config
        }
        Err(e) => {
            println!("    └─ 🧠 Gemini AI    : \x1b[31m❌ {}\x1b[0m", e);
            return Err(e.into());
        }
    };

    println!("    ├─ 🌐 Endpoint     : {}", config.base_url);
    println!("    ├─ 📋 Preferences  : {}", config.model_preferences.join(", "));
    println!(
        "    └─ 🧩 Model        : \x1b[33mresolved on first request\x1b[0m (strip prefix: {})",
        config.strip_prefix.as_deref().unwrap_or("off")
    );

    let state = build_state(&config)?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    println!("\x1b[1;30m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");
    println!(" 🚀 \x1b[1;32mASSISTANT IS ONLINE!\x1b[0m");
    println!("    📡 Listening on   : \x1b[36mhttp://0.0.0.0:{}\x1b[0m", config.port);
    println!("\x1b[1;30m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let gemini = Arc::new(GeminiClient::new(
        &config.base_url,
        &config.api_key,
        config.request_timeout,
    )?);
    let policy = ResolverPolicy::from_config(config)?;
    let resolver = Arc::new(ModelResolver::new(gemini.clone(), policy));

    Ok(AppState {
        assistant: Assistant::new(gemini, resolver),
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/model", get(model_status))
        .route("/api/documents", post(process_document))
        .route("/api/photos", post(identify_photo))
        .route("/api/drafts", post(draft))
        .route("/api/drafts/download", post(download_draft))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn model_status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.assistant.model_status().await)
}

async fn process_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<GeneratedText>, AssistantError> {
    state.assistant.process_document(request).await.map(Json)
}

async fn identify_photo(
    State(state): State<AppState>,
    Json(request): Json<PhotoRequest>,
) -> Result<Json<GeneratedText>, AssistantError> {
    state.assistant.identify_photo(request).await.map(Json)
}

async fn draft(
    State(state): State<AppState>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<DraftResponse>, AssistantError> {
    state.assistant.draft(request).await.map(Json)
}

async fn download_draft(
    State(state): State<AppState>,
    Json(request): Json<DraftRequest>,
) -> Result<Response, AssistantError> {
    let draft = state.assistant.draft(request).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONTENT_DISPOSITION, DRAFT_CONTENT_DISPOSITION),
        ],
        draft.text,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_for(server: &MockServer) -> Router {
        let base_url = server.uri();
        let config = AppConfig::from_lookup(|name| match name {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "GEMINI_BASE_URL" => Some(base_url.clone()),
            _ => None,
        })
        .unwrap();
        router(build_state(&config).unwrap())
    }

    async fn mount_listing(server: &MockServer, names: &[&str], expected_calls: u64) {
        let models: Vec<Value> = names
            .iter()
            .map(|n| json!({"name": n, "supportedGenerationMethods": ["generateContent"]}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_generation(server: &MockServer, model: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", model)))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}, "finishReason": "STOP"}]
        }))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        let response = app_for(&server)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_document_requests_share_one_resolution() {
        let server = MockServer::start().await;
        mount_listing(&server, &["models/gemini-1.5-flash", "models/gemini-2.0-flash"], 1).await;
        mount_generation(&server, "gemini-1.5-flash", text_response("润色后的公文")).await;

        let app = app_for(&server);

        for task in ["polish", "summarize"] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/documents",
                    json!({"task": task, "text": "关于加强森林防火工作的报告"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = body_json(response).await;
            assert_eq!(body["model"], "gemini-1.5-flash");
            assert_eq!(body["text"], "润色后的公文");
        }
    }

    #[tokio::test]
    async fn test_document_without_content_is_rejected() {
        let server = MockServer::start().await;
        mount_listing(&server, &["models/gemini-1.5-flash"], 0).await;

        let response = app_for(&server)
            .oneshot(post_json("/api/documents", json!({"task": "polish", "text": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "请先提供内容哦");
    }

    #[tokio::test]
    async fn test_rate_limited_generation_returns_friendly_message() {
        let server = MockServer::start().await;
        mount_listing(&server, &["models/gemini-2.0-flash"], 1).await;
        mount_generation(
            &server,
            "gemini-2.0-flash",
            ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })),
        )
        .await;

        let response = app_for(&server)
            .oneshot(post_json("/api/documents", json!({"task": "summarize", "text": "内容"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("等一分钟"));
    }

    #[tokio::test]
    async fn test_failed_listing_falls_back_to_first_preference() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let response = app_for(&server)
            .oneshot(Request::builder().uri("/api/model").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["model"], "gemini-1.5-flash");
        assert_eq!(body["resolution"]["kind"], "guessed");
    }

    #[tokio::test]
    async fn test_photo_identification_sends_inline_image() {
        let server = MockServer::start().await;
        mount_listing(&server, &["gemini-2.0-flash"], 1).await;
        mount_generation(&server, "gemini-2.0-flash", text_response("这是一只黑鹳。")).await;

        let response = app_for(&server)
            .oneshot(post_json(
                "/api/photos",
                json!({"mime_type": "image/jpeg", "data": "data:image/jpeg;base64,/9j/4AAQ"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["text"], "这是一只黑鹳。");

        let requests = server.received_requests().await.unwrap();
        let generation = requests
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .unwrap();
        let sent: Value = serde_json::from_slice(&generation.body).unwrap();
        assert_eq!(sent["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
    }

    #[tokio::test]
    async fn test_draft_download_is_an_attachment() {
        let server = MockServer::start().await;
        mount_listing(&server, &["models/gemini-1.5-flash"], 1).await;
        mount_generation(&server, "gemini-1.5-flash", text_response("春季防火通知正文")).await;

        let response = app_for(&server)
            .oneshot(post_json("/api/drafts/download", json!({"template": "spring_fire_notice"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            DRAFT_CONTENT_DISPOSITION
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "春季防火通知正文");
    }

    #[tokio::test]
    async fn test_draft_returns_filename() {
        let server = MockServer::start().await;
        mount_listing(&server, &["models/gemini-1.5-flash"], 1).await;
        mount_generation(&server, "gemini-1.5-flash", text_response("巡护日志正文")).await;

        let response = app_for(&server)
            .oneshot(post_json(
                "/api/drafts",
                json!({"template": "wetland_patrol_log", "location": "西溪湿地"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: DraftResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.filename, "起草稿.txt");
        assert_eq!(body.text, "巡护日志正文");

        let requests = server.received_requests().await.unwrap();
        let generation = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
        let sent: Value = serde_json::from_slice(&generation.body).unwrap();
        let prompt = sent["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("地点：西溪湿地"));
        assert!(prompt.contains("物种：黑鹳、天鹅等"));
    }
}
