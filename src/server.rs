//! HTTP API.
//!
//! Pipeline endpoints answer `{success, ...}`; lookup endpoints answer
//! their payload directly and `{error}` on failure. Malformed JSON bodies
//! are rejected with a JSON error body on every route.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::FallbackKeys;
use crate::context::ServiceContext;
use crate::error::TatttyError;
use crate::fonts::{generate_fonts, FONT_FAILURE, FONT_TIMEOUT};
use crate::gallery::{
    fetch_catalogs, fetch_description, list_search_data, load_page, search_gallery, Catalogs,
    PAGE_SIZE,
};
use crate::image_synthesis::synthesize_image;
use crate::orchestrator::{GenerationForm, Orchestrator, Pipeline};
use crate::ports::blob_store::UploadFile;
use crate::ports::BlobStore;
use crate::prompt_synthesis::{synthesize_prompt, TattooBrief};
use crate::request_log::{new_request_id, RequestLog};
use crate::selection::SelectionState;
use crate::settings::{Settings, SettingsStore};
use crate::upload::{upload_all, validate_batch};

/// Largest multipart body accepted by `/api/upload`.
const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Shared state behind every handler.
pub struct AppState {
    /// Provider ports.
    pub ctx: ServiceContext,
    /// Operator settings.
    pub settings: SettingsStore,
    /// Request log.
    pub log: RequestLog,
    /// Keys used when the settings file has none.
    pub fallback: FallbackKeys,
    /// Reject uploads.
    pub demo_mode: bool,
    /// Cancelled on shutdown; aborts running uploads.
    pub shutdown: CancellationToken,
}

/// Error body plus status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<TatttyError> for ApiError {
    fn from(err: TatttyError) -> Self {
        let status = match &err {
            TatttyError::Validation(_)
            | TatttyError::InvalidArgument(_)
            | TatttyError::MissingCredential(_) => StatusCode::BAD_REQUEST,
            TatttyError::Busy => StatusCode::CONFLICT,
            TatttyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TatttyError::Provider(_) | TatttyError::NoOutput(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// JSON body extractor whose rejections are answered as [`ApiError`]s.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "rejected request body");
                Err(TatttyError::Validation(rejection.body_text()).into())
            }
        }
    }
}

fn blob_store(state: &AppState) -> Result<&dyn BlobStore, ApiError> {
    state.ctx.blobs.as_deref().ok_or_else(|| {
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Blob storage is not configured")
    })
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/baddie", post(baddie))
        .route("/api/generate", post(generate))
        .route("/api/tattty", post(tattty))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/logs", get(get_logs).delete(clear_logs))
        .route("/api/gallery", get(gallery))
        .route("/api/gallery/search", get(gallery_search))
        .route("/api/catalogs", get(catalogs))
        .route("/api/search-data", get(search_data))
        .route("/api/fetch-description", post(description))
        .route("/api/generate-fonts", post(fonts))
        .route("/api/upload", post(upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<(), TatttyError> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

async fn baddie(
    State(state): State<Arc<AppState>>,
    ApiJson(brief): ApiJson<TattooBrief>,
) -> ApiResult {
    let settings = state.settings.load().await;
    let request_id = new_request_id();
    let prompt = synthesize_prompt(
        state.ctx.chat.as_ref(),
        &settings,
        &state.fallback,
        &state.log,
        &brief,
        &request_id,
    )
    .await?;
    Ok(Json(json!({ "success": true, "prompt": prompt })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    prompt: String,
    #[serde(default)]
    aspect_ratio: Option<String>,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<GenerateBody>,
) -> ApiResult {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Prompt is required"));
    }
    let settings = state.settings.load().await;
    let aspect_ratio = body.aspect_ratio.unwrap_or_else(|| settings.tattty.aspect_ratio.clone());
    let output = synthesize_image(
        state.ctx.images.as_ref(),
        &settings,
        &state.fallback,
        &state.log,
        &body.prompt,
        &aspect_ratio,
        &new_request_id(),
    )
    .await?;
    Ok(Json(json!({ "success": true, "output": output })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TatttyBody {
    #[serde(default)]
    selections: Vec<String>,
    #[serde(default)]
    q1_answer: String,
    #[serde(default)]
    q2_answer: String,
}

async fn tattty(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<TatttyBody>,
) -> ApiResult {
    let settings = state.settings.load().await;
    let mut selections = SelectionState::with_defaults();
    for id in &body.selections {
        selections.select(id);
    }
    let pipeline = Pipeline {
        chat: state.ctx.chat.as_ref(),
        images: state.ctx.images.as_ref(),
        settings: &settings,
        fallback: &state.fallback,
        log: &state.log,
    };
    let form = GenerationForm { selections, q1_answer: body.q1_answer, q2_answer: body.q2_answer };
    let outcome = Orchestrator::new().generate(&pipeline, form).await?;
    Ok(Json(json!({
        "success": true,
        "requestId": outcome.request_id,
        "prompt": outcome.prompt,
        "output": outcome.urls,
    })))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.settings.load().await)
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult {
    let settings = Settings::from_json_overrides(&body.to_string())
        .map_err(|e| TatttyError::Validation(format!("Invalid settings: {e}")))?;
    state.settings.save(&settings).await?;
    Ok(Json(json!({ "success": true })))
}

async fn get_logs(State(state): State<Arc<AppState>>) -> ApiResult {
    let entries = state.log.entries().await;
    Ok(Json(serde_json::to_value(entries).map_err(TatttyError::from)?))
}

async fn clear_logs(State(state): State<Arc<AppState>>) -> ApiResult {
    state.log.clear().await.map_err(TatttyError::from)?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct GalleryQuery {
    cursor: Option<String>,
}

async fn gallery(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GalleryQuery>,
) -> ApiResult {
    let blobs = blob_store(&state)?;
    let cursor = query.cursor.filter(|c| !c.is_empty());
    let page = load_page(blobs, cursor, PAGE_SIZE).await?;
    Ok(Json(serde_json::to_value(page).map_err(TatttyError::from)?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn gallery_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult {
    let items = match state.ctx.search.as_deref() {
        Some(search) => search_gallery(search, &params.q).await,
        None => Vec::new(),
    };
    Ok(Json(serde_json::to_value(items).map_err(TatttyError::from)?))
}

async fn catalogs(State(state): State<Arc<AppState>>) -> ApiResult {
    let catalogs = match state.ctx.search.as_deref() {
        Some(search) => fetch_catalogs(search).await,
        None => Catalogs::default(),
    };
    Ok(Json(serde_json::to_value(catalogs).map_err(TatttyError::from)?))
}

async fn search_data(State(state): State<Arc<AppState>>) -> Response {
    let Some(search) = state.ctx.search.as_deref() else {
        let message = "Search index is not configured";
        return lookup_error(StatusCode::INTERNAL_SERVER_ERROR, message);
    };
    match list_search_data(search).await {
        Ok(docs) => Json(docs).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list search data");
            lookup_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct DescriptionBody {
    #[serde(default)]
    pathname: String,
}

async fn description(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<DescriptionBody>,
) -> Response {
    if body.pathname.trim().is_empty() {
        return lookup_error(StatusCode::BAD_REQUEST, "No pathname provided");
    }
    let Some(search) = state.ctx.search.as_deref() else {
        return Json(json!({ "description": null })).into_response();
    };
    match fetch_description(search, &body.pathname).await {
        Ok(description) => Json(json!({ "description": description })).into_response(),
        Err(e) => lookup_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct FontsBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    style: Option<String>,
}

async fn fonts(State(state): State<Arc<AppState>>, ApiJson(body): ApiJson<FontsBody>) -> Response {
    let settings = state.settings.load().await;
    let result = generate_fonts(
        state.ctx.chat.as_ref(),
        &settings,
        &state.fallback,
        &body.text,
        body.style.as_deref(),
        FONT_TIMEOUT,
    )
    .await;
    match result {
        Ok(fonts) => Json(json!({ "fonts": fonts })).into_response(),
        Err(TatttyError::Validation(message)) => lookup_error(StatusCode::BAD_REQUEST, &message),
        Err(e) => {
            tracing::error!(error = %e, "font generation failed");
            lookup_error(StatusCode::INTERNAL_SERVER_ERROR, FONT_FAILURE)
        }
    }
}

fn lookup_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> ApiResult {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
            .to_vec();
        files.push(UploadFile { name, content_type, data });
    }

    validate_batch(&files, state.demo_mode)?;
    let blobs = blob_store(&state)?;

    let cancel = state.shutdown.child_token();
    let report = upload_all(blobs, &files, &cancel, |p| {
        tracing::debug!(completed = p.completed, total = p.total, "upload progress");
    })
    .await;

    Ok(Json(json!({
        "success": report.failed.is_empty(),
        "message": report.summary(),
        "uploaded": report.uploaded,
        "failed": report.failed,
    })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::image_synthesis::tests::FakeImages;
    use crate::ports::image_generator::{OutputItem, RawOutput};
    use crate::ports::search_index::{FetchQuery, SearchDocument, SearchFuture, SearchQuery};
    use crate::ports::SearchIndex;
    use crate::prompt_synthesis::tests::FakeChat;

    struct OneDocIndex;

    impl SearchIndex for OneDocIndex {
        fn search(&self, _query: &SearchQuery) -> SearchFuture<'_> {
            Box::pin(async { Ok(vec![koi_doc()]) })
        }

        fn fetch(&self, query: &FetchQuery) -> SearchFuture<'_> {
            let hit = query.ids.iter().any(|id| id == "koi.webp");
            Box::pin(async move { Ok(if hit { vec![koi_doc()] } else { Vec::new() }) })
        }
    }

    fn koi_doc() -> SearchDocument {
        let metadata = json!({ "url": "https://blob.example/koi.webp", "style_name": "Irezumi" });
        SearchDocument {
            id: "koi.webp".into(),
            score: None,
            content: json!({ "text": "a koi" }).as_object().cloned().unwrap(),
            metadata: metadata.as_object().cloned().unwrap(),
        }
    }

    fn state(dir: &tempfile::TempDir, chat: FakeChat, demo_mode: bool) -> Arc<AppState> {
        let mut settings = Settings::default();
        settings.providers.openai.api_key = "sk-test".into();
        settings.providers.openai.enabled = true;
        settings.providers.replicate.api_key = "r8_test".into();
        settings.providers.replicate.enabled = true;
        let raw = serde_json::to_string(&settings).unwrap();
        std::fs::write(dir.path().join("settings.json"), raw).unwrap();

        let url = "https://replicate.delivery/koi.webp";
        let output = RawOutput::Single(OutputItem::Url(url.into()));
        Arc::new(AppState {
            ctx: ServiceContext {
                chat: Box::new(chat),
                images: Box::new(FakeImages::returning(output)),
                search: Some(Box::new(OneDocIndex)),
                blobs: None,
            },
            settings: SettingsStore::new(dir.path().join("settings.json")),
            log: RequestLog::new(dir.path().join("logs.json")),
            fallback: FallbackKeys::default(),
            demo_mode,
            shutdown: CancellationToken::new(),
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn call(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
        send(app, method, uri, body).await
    }

    #[tokio::test]
    async fn full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(&dir, FakeChat::replying("koi rising from waves"), false));

        let (status, body) = call(
            app,
            "POST",
            "/api/tattty",
            Some(json!({ "selections": ["styles-2"], "q1Answer": "a storm", "q2Answer": "calm" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["prompt"], "koi rising from waves");
        assert_eq!(body["output"][0], "https://replicate.delivery/koi.webp");
    }

    #[tokio::test]
    async fn blank_answers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(&dir, FakeChat::replying("unused"), false));

        let body = json!({ "q1Answer": " ", "q2Answer": "calm" });
        let (status, body) = call(app, "POST", "/api/tattty", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Your soul is required for the ink.");
    }

    #[tokio::test]
    async fn prompt_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(&dir, FakeChat::failing(401, "bad key"), false));

        let body = json!({ "q1Answer": "x" });
        let (status, body) = call(app, "POST", "/api/baddie", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "🚨 LLM API KEY INVALID! Check the provider key in settings.");
    }

    #[tokio::test]
    async fn settings_and_logs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, FakeChat::replying("p"), false);

        let (status, _) = call(
            router(Arc::clone(&state)),
            "PUT",
            "/api/settings",
            Some(json!({ "tattty": { "aspect_ratio": "16:9" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(router(Arc::clone(&state)), "GET", "/api/settings", None).await;
        assert_eq!(body["tattty"]["aspect_ratio"], "16:9");
        assert!(body["lists"]["styles"].as_array().is_some_and(|s| !s.is_empty()));

        call(router(Arc::clone(&state)), "POST", "/api/baddie", Some(json!({}))).await;
        let (_, logs) = call(router(Arc::clone(&state)), "GET", "/api/logs", None).await;
        assert!(!logs.as_array().unwrap().is_empty());

        call(router(Arc::clone(&state)), "DELETE", "/api/logs", None).await;
        let (_, logs) = call(router(state), "GET", "/api/logs", None).await;
        assert_eq!(logs, json!([]));
    }

    #[tokio::test]
    async fn settings_type_mismatch_is_a_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, FakeChat::replying("p"), false);

        let (status, body) = call(
            router(Arc::clone(&state)),
            "PUT",
            "/api/settings",
            Some(json!({ "tattty": { "aspect_ratio": 5 } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| e.starts_with("Invalid settings")));

        let (_, body) = call(router(state), "GET", "/api/settings", None).await;
        assert_eq!(body["tattty"]["aspect_ratio"], "1:1");
    }

    #[tokio::test]
    async fn description_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, FakeChat::replying("p"), false);

        let (status, body) = call(
            router(Arc::clone(&state)),
            "POST",
            "/api/fetch-description",
            Some(json!({ "pathname": "koi.webp" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "a koi");

        let (_, body) = call(
            router(Arc::clone(&state)),
            "POST",
            "/api/fetch-description",
            Some(json!({ "pathname": "nope.webp" })),
        )
        .await;
        assert_eq!(body["description"], Value::Null);

        let (status, body) =
            call(router(state), "POST", "/api/fetch-description", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No pathname provided");
    }

    #[tokio::test]
    async fn fonts_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, FakeChat::replying("𝕂𝕠𝕚\nⓀⓞⓘ"), false);

        let (status, body) = call(
            router(Arc::clone(&state)),
            "POST",
            "/api/generate-fonts",
            Some(json!({ "text": "Koi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fonts"], json!(["𝕂𝕠𝕚", "Ⓚⓞⓘ"]));

        let (status, body) = call(
            router(state),
            "POST",
            "/api/generate-fonts",
            Some(json!({ "style": "gothic" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Text is required");
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, FakeChat::replying("p"), false);

        for (uri, body) in [
            ("/api/generate-fonts", r#"{"text":5}"#),
            ("/api/generate-fonts", "not json"),
            ("/api/fetch-description", r#"{"pathname":5}"#),
            ("/api/fetch-description", "not json"),
            ("/api/tattty", "not json"),
        ] {
            let app = router(Arc::clone(&state));
            let (status, reply) = send(app, "POST", uri, Body::from(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
            assert!(
                reply["error"].as_str().is_some_and(|e| !e.is_empty()),
                "{uri} {body}: {reply}"
            );
        }
    }

    #[tokio::test]
    async fn gallery_search_and_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, FakeChat::replying("p"), false);

        let uri = "/api/gallery/search?q=koi";
        let (_, items) = call(router(Arc::clone(&state)), "GET", uri, None).await;
        assert_eq!(items[0]["name"], "koi");
        assert_eq!(items[0]["description"], "a koi");

        let (_, catalogs) = call(router(Arc::clone(&state)), "GET", "/api/catalogs", None).await;
        assert_eq!(catalogs["styles"], json!(["Irezumi"]));

        let (status, _) = call(router(state), "GET", "/api/gallery", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn uploads_rejected_in_demo_mode() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(&dir, FakeChat::replying("p"), true));

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"koi.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Uploads are disabled in demo mode");
    }
}
