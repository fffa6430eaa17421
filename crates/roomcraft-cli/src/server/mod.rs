//! `roomcraft serve` -- HTTP JSON API for the room analysis backend.
//!
//! Endpoints:
//! - GET  /, /ping, /api/test           - Liveness
//! - POST /api/upload                   - Multipart `image` upload, returns `{url}`
//! - POST /api/analyze                  - Critique a room photo and store the record
//! - GET  /api/analysis/{id}            - Stored analysis record
//! - POST /api/generate-room-image      - Inspiration image from suggestions
//! - /api/appointments, /api/contact, /api/repairs - Booking CRUD
//!
//! Provider calls block, so every pipeline call runs under `spawn_blocking`.

mod bookings;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use self::bookings::{
    handle_create_appointment, handle_create_contact, handle_create_repair,
    handle_delete_appointment, handle_delete_contact, handle_delete_repair,
    handle_get_appointment, handle_get_contact, handle_get_repair, handle_list_appointments,
    handle_list_contacts, handle_list_repairs, handle_update_appointment, handle_update_contact,
    handle_update_repair,
};
use self::handlers::{
    handle_analyze, handle_generate, handle_get_analysis, handle_not_found, handle_ping,
    handle_root, handle_test, handle_upload,
};
pub use self::state::AppState;

/// Maximum request body size: 16 MB.
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Booking routes answer with a `message` key instead of `error`.
fn json_message(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/ping", get(handle_ping))
        .route("/api/test", get(handle_test))
        .route("/api/upload", post(handle_upload))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/analysis/{id}", get(handle_get_analysis))
        .route("/api/generate-room-image", post(handle_generate))
        .route(
            "/api/appointments",
            post(handle_create_appointment).get(handle_list_appointments),
        )
        .route(
            "/api/appointments/{id}",
            get(handle_get_appointment)
                .put(handle_update_appointment)
                .delete(handle_delete_appointment),
        )
        .route(
            "/api/contact",
            post(handle_create_contact).get(handle_list_contacts),
        )
        .route(
            "/api/contact/{id}",
            get(handle_get_contact)
                .put(handle_update_contact)
                .delete(handle_delete_contact),
        )
        .route(
            "/api/repairs",
            post(handle_create_repair).get(handle_list_repairs),
        )
        .route(
            "/api/repairs/{id}",
            get(handle_get_repair)
                .put(handle_update_repair)
                .delete(handle_delete_repair),
        )
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    eprintln!("roomcraft listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    eprintln!("roomcraft: server shut down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        eprintln!("roomcraft: failed to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
    eprintln!("roomcraft: received shutdown signal...");
}
