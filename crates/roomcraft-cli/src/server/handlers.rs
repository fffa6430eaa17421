//! Pipeline routes: upload, analyze, analysis lookup, inspiration.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use roomcraft_engine::pipeline::MISSING_IMAGE_FILE;
use roomcraft_engine::PipelineError;
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::json_error;

pub(crate) const UPLOAD_TOO_LARGE: &str = "Image exceeds the upload size limit";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalyzeBody {
    image_url: Option<String>,
    /// Numeric or string; stored as text.
    user_id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GenerateBody {
    image_url: Option<String>,
    suggestions: Option<String>,
}

/// Unparseable bodies behave like empty ones so the pipeline's own
/// validation produces the 400.
fn body_or_default<T: Default + serde::de::DeserializeOwned>(
    body: Result<Json<Value>, JsonRejection>,
) -> T {
    body.ok()
        .and_then(|Json(value)| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

fn pipeline_error(err: &PipelineError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        eprintln!("roomcraft: {} failure: {err}", err.kind());
    }
    json_error(status, &err.to_string())
}

/// Bodies past the request limit answer 413; other multipart faults are 400.
fn upload_error(err: MultipartError) -> Response {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return json_error(StatusCode::PAYLOAD_TOO_LARGE, UPLOAD_TOO_LARGE);
    }
    json_error(StatusCode::BAD_REQUEST, &format!("invalid upload: {err}"))
}

fn join_error(err: tokio::task::JoinError) -> Response {
    eprintln!("roomcraft: worker task failed: {err}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "worker task failed")
}

pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /
pub(crate) async fn handle_root() -> impl IntoResponse {
    Json(json!({ "message": "roomcraft backend is running!", "status": "ok" }))
}

/// GET /ping
pub(crate) async fn handle_ping() -> impl IntoResponse {
    Json(json!({ "message": "pong", "status": "ok" }))
}

/// GET /api/test
pub(crate) async fn handle_test() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Backend running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// POST /api/upload
pub(crate) async fn handle_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let Ok(mut multipart) = multipart else {
        return json_error(StatusCode::BAD_REQUEST, MISSING_IMAGE_FILE);
    };

    let mut upload: Option<(Vec<u8>, Option<String>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return upload_error(err),
        };
        if field.name() != Some("image") {
            continue;
        }
        let mime = field.content_type().map(str::to_string);
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some((bytes.to_vec(), mime));
                break;
            }
            Err(err) => return upload_error(err),
        }
    }

    let Some((bytes, mime)) = upload.filter(|(bytes, _)| !bytes.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, MISSING_IMAGE_FILE);
    };
    let pipeline = state.pipeline.clone();
    match tokio::task::spawn_blocking(move || pipeline.upload(&bytes, mime.as_deref())).await {
        Ok(Ok(url)) => (StatusCode::OK, Json(json!({ "url": url }))).into_response(),
        Ok(Err(err)) => pipeline_error(&err),
        Err(err) => join_error(err),
    }
}

/// POST /api/analyze
pub(crate) async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body: AnalyzeBody = body_or_default(body);
    let user_ref = body.user_id.and_then(|value| match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    });
    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        pipeline.analyze(body.image_url.as_deref(), user_ref.as_deref())
    })
    .await;

    match result {
        Ok(Ok(analysis)) => (StatusCode::OK, Json(analysis.to_json())).into_response(),
        Ok(Err(err)) => pipeline_error(&err),
        Err(err) => join_error(err),
    }
}

/// GET /api/analysis/{id}
pub(crate) async fn handle_get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let pipeline = state.pipeline.clone();
    match tokio::task::spawn_blocking(move || pipeline.record(&id)).await {
        Ok(Ok(record)) => (StatusCode::OK, Json(record.to_json())).into_response(),
        Ok(Err(PipelineError::NotFound(_))) => {
            json_error(StatusCode::NOT_FOUND, "Analysis not found")
        }
        Ok(Err(err)) => pipeline_error(&err),
        Err(err) => join_error(err),
    }
}

/// POST /api/generate-room-image
pub(crate) async fn handle_generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body: GenerateBody = body_or_default(body);
    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        pipeline.generate_inspiration(body.image_url.as_deref(), body.suggestions.as_deref())
    })
    .await;

    match result {
        Ok(Ok(generated)) => (
            StatusCode::OK,
            Json(json!({ "generatedImageUrl": generated.generated_url })),
        )
            .into_response(),
        Ok(Err(err)) => pipeline_error(&err),
        Err(err) => join_error(err),
    }
}
