pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// One route table shared by the binary and the integration tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/buildings", get(handlers::public::get_buildings))
        .route("/api/rooms", get(handlers::public::get_rooms))
        .route("/api/availability", post(handlers::public::check_availability))
        .route("/api/bookings", post(handlers::public::submit_booking))
        .route(
            "/api/bookings/:id/verify",
            post(handlers::public::verify_booking),
        )
        .route(
            "/api/bookings/reference/:code",
            get(handlers::public::get_booking_by_reference),
        )
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/resend",
            post(handlers::admin::resend_verification),
        )
        .route(
            "/api/admin/buildings",
            get(handlers::admin::get_buildings).post(handlers::admin::create_building),
        )
        .route(
            "/api/admin/buildings/:id",
            post(handlers::admin::update_building),
        )
        .route(
            "/api/admin/buildings/:id/disable",
            post(handlers::admin::disable_building),
        )
        .route(
            "/api/admin/rooms",
            get(handlers::admin::get_rooms).post(handlers::admin::create_room),
        )
        .route("/api/admin/rooms/:id", post(handlers::admin::update_room))
        .route(
            "/api/admin/rooms/:id/disable",
            post(handlers::admin::disable_room),
        )
        .route("/api/admin/email-health", get(handlers::admin::email_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
