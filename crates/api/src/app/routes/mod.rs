use axum::{Router, routing::get, routing::post};

pub mod requests;
pub mod responses;
pub mod system;
pub mod ws;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/health/storage", get(system::storage_health))
        .route("/ws/health", get(system::socket_health))
        .route("/ws/devices/:device_id", get(ws::device_socket))
        .nest("/api/v2/requests", requests::router())
        .nest("/api/v2/responses", responses::router())
        .route("/api/v2/broadcast", post(system::broadcast))
}
