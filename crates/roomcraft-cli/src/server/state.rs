//! Shared state for the HTTP server.

use std::sync::Arc;

use roomcraft_engine::{RoomPipeline, SqliteStore};

/// Cloned into every handler through `State<Arc<AppState>>`.
pub struct AppState {
    pub pipeline: Arc<RoomPipeline>,
    /// Booking tables live in the same database file as analysis records.
    pub bookings: Arc<SqliteStore>,
}
