//! Booking CRUD: appointments, contact messages, repair requests.
//!
//! Plain single-table reads and writes; none of these touch the pipeline.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use roomcraft_contracts::bookings::{
    AppointmentUpdate, NewAppointment, NewContact, NewRepair, RepairUpdate,
};
use roomcraft_engine::{SqliteStore, StoreError};
use serde_json::{json, Map, Value};

use super::state::AppState;
use super::{json_error, json_message};

const REPAIR_SUBMITTED: &str =
    "Repair request submitted successfully. Our team will contact you on WhatsApp soon.";

enum StoreFailure {
    NotFound,
    Failed(String),
}

async fn store_call<T, F>(state: &Arc<AppState>, f: F) -> Result<T, StoreFailure>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.bookings.clone();
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(StoreError::NotFound(_))) => Err(StoreFailure::NotFound),
        Ok(Err(err)) => Err(StoreFailure::Failed(err.to_string())),
        Err(err) => Err(StoreFailure::Failed(format!("worker task failed: {err}"))),
    }
}

fn body_map(body: Result<Json<Value>, JsonRejection>) -> Map<String, Value> {
    match body {
        Ok(Json(Value::Object(map))) => map,
        _ => Map::new(),
    }
}

fn message_failure(failure: StoreFailure) -> Response {
    match failure {
        StoreFailure::NotFound => json_message(StatusCode::NOT_FOUND, "Not found"),
        StoreFailure::Failed(message) => {
            eprintln!("roomcraft: booking store error: {message}");
            json_message(StatusCode::INTERNAL_SERVER_ERROR, &message)
        }
    }
}

fn repair_failure(failure: StoreFailure) -> Response {
    match failure {
        StoreFailure::NotFound => json_error(StatusCode::NOT_FOUND, "Repair request not found"),
        StoreFailure::Failed(message) => {
            eprintln!("roomcraft: repair store error: {message}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &message)
        }
    }
}

/// POST /api/appointments
pub(crate) async fn handle_create_appointment(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let new = match NewAppointment::from_body(&body_map(body)) {
        Ok(new) => new,
        Err(field) => {
            return json_message(StatusCode::BAD_REQUEST, &format!("Missing field: {field}"))
        }
    };
    match store_call(&state, move |store| store.create_appointment(&new)).await {
        Ok(appointment) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Appointment booked successfully",
                "appointment": appointment.to_json(),
            })),
        )
            .into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// GET /api/appointments
pub(crate) async fn handle_list_appointments(State(state): State<Arc<AppState>>) -> Response {
    match store_call(&state, |store| store.list_appointments()).await {
        Ok(rows) => {
            let rows: Vec<Value> = rows.iter().map(|row| row.to_json()).collect();
            Json(json!({ "appointments": rows })).into_response()
        }
        Err(failure) => message_failure(failure),
    }
}

/// GET /api/appointments/{id}
pub(crate) async fn handle_get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match store_call(&state, move |store| store.get_appointment(&id)).await {
        Ok(appointment) => Json(appointment.to_json()).into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// PUT /api/appointments/{id}
pub(crate) async fn handle_update_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let update = AppointmentUpdate::from_body(&body_map(body));
    match store_call(&state, move |store| store.update_appointment(&id, &update)).await {
        Ok(appointment) => Json(json!({
            "message": "Updated",
            "appointment": appointment.to_json(),
        }))
        .into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// DELETE /api/appointments/{id}
pub(crate) async fn handle_delete_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match store_call(&state, move |store| store.delete_appointment(&id)).await {
        Ok(()) => Json(json!({ "message": "Deleted" })).into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// POST /api/contact
pub(crate) async fn handle_create_contact(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let new = match NewContact::from_body(&body_map(body)) {
        Ok(new) => new,
        Err(field) => {
            return json_message(StatusCode::BAD_REQUEST, &format!("Missing field: {field}"))
        }
    };
    match store_call(&state, move |store| store.create_contact(&new)).await {
        Ok(contact) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Message sent successfully",
                "contact": contact.to_json(),
            })),
        )
            .into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// GET /api/contact
pub(crate) async fn handle_list_contacts(State(state): State<Arc<AppState>>) -> Response {
    match store_call(&state, |store| store.list_contacts()).await {
        Ok(rows) => {
            let rows: Vec<Value> = rows.iter().map(|row| row.to_json()).collect();
            Json(json!({ "contacts": rows })).into_response()
        }
        Err(failure) => message_failure(failure),
    }
}

/// GET /api/contact/{id}
pub(crate) async fn handle_get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match store_call(&state, move |store| store.get_contact(&id)).await {
        Ok(contact) => Json(contact.to_json()).into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// PUT /api/contact/{id}
pub(crate) async fn handle_update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let status = body_map(body)
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);
    match store_call(&state, move |store| {
        store.update_contact_status(&id, status.as_deref())
    })
    .await
    {
        Ok(contact) => Json(json!({
            "message": "Updated",
            "contact": contact.to_json(),
        }))
        .into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// DELETE /api/contact/{id}
pub(crate) async fn handle_delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match store_call(&state, move |store| store.delete_contact(&id)).await {
        Ok(()) => Json(json!({ "message": "Deleted" })).into_response(),
        Err(failure) => message_failure(failure),
    }
}

/// POST /api/repairs
pub(crate) async fn handle_create_repair(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let new = match NewRepair::from_body(&body_map(body)) {
        Ok(new) => new,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, &message),
    };
    match store_call(&state, move |store| store.create_repair(&new)).await {
        Ok(repair) => (
            StatusCode::CREATED,
            Json(json!({
                "status": "success",
                "message": REPAIR_SUBMITTED,
                "repair": repair.to_json(),
            })),
        )
            .into_response(),
        Err(failure) => repair_failure(failure),
    }
}

/// GET /api/repairs
pub(crate) async fn handle_list_repairs(State(state): State<Arc<AppState>>) -> Response {
    match store_call(&state, |store| store.list_repairs()).await {
        Ok(rows) => {
            let rows: Vec<Value> = rows.iter().map(|row| row.to_json()).collect();
            Json(json!({
                "status": "success",
                "count": rows.len(),
                "repairs": rows,
            }))
            .into_response()
        }
        Err(failure) => repair_failure(failure),
    }
}

/// GET /api/repairs/{id}
pub(crate) async fn handle_get_repair(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match store_call(&state, move |store| store.get_repair(&id)).await {
        Ok(repair) => Json(json!({ "status": "success", "repair": repair.to_json() })).into_response(),
        Err(failure) => repair_failure(failure),
    }
}

/// PUT /api/repairs/{id}
pub(crate) async fn handle_update_repair(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let update = RepairUpdate::from_body(&body_map(body));
    match store_call(&state, move |store| store.update_repair(&id, &update)).await {
        Ok(repair) => Json(json!({
            "status": "success",
            "message": "Repair request updated",
            "repair": repair.to_json(),
        }))
        .into_response(),
        Err(failure) => repair_failure(failure),
    }
}

/// DELETE /api/repairs/{id}
pub(crate) async fn handle_delete_repair(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match store_call(&state, move |store| store.delete_repair(&id)).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": "Repair request deleted",
        }))
        .into_response(),
        Err(failure) => repair_failure(failure),
    }
}
