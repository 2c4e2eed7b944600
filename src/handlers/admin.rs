use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingStatus, Building, Contact, Room, RoomStatus};
use crate::services::booking_flow::{self, VerifyError};
use crate::state::AppState;

use super::public::BookingView;

const EMAIL_HEALTH_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";
const EMAIL_HEALTH_TIMEOUT_SECS: u64 = 10;

// SQLite reads a negative LIMIT as "no limit", so clamp before it ever
// reaches SQL.
const MAX_BOOKINGS_LIMIT: i64 = 500;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn map_verify_error(e: VerifyError) -> AppError {
    match e {
        VerifyError::NotFound => AppError::NotFound("booking".to_string()),
        VerifyError::Storage(msg) => AppError::Database(msg),
        other => AppError::Validation(other.to_string()),
    }
}

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    pending_bookings: i64,
    confirmed_bookings: i64,
    active_rooms: i64,
    active_buildings: i64,
    email_configured: bool,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let stats = {
        let db = state.db.lock().unwrap();
        queries::get_dashboard_stats(&db)?
    };

    Ok(Json(StatusResponse {
        pending_bookings: stats.pending_bookings,
        confirmed_bookings: stats.confirmed_bookings,
        active_rooms: stats.active_rooms,
        active_buildings: stats.active_buildings,
        email_configured: state.config.email_configured(),
    }))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50).clamp(1, MAX_BOOKINGS_LIMIT);
    let key = (query.status.clone(), limit);
    if let Some(bookings) = state.cache.bookings.get(&key) {
        return Ok(Json(bookings.into_iter().map(BookingView::from).collect()));
    }

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::get_all_bookings(&db, query.status.as_deref(), limit)?
    };
    state.cache.bookings.put(key, bookings.clone());

    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::update_booking_status(&db, &id, &BookingStatus::Cancelled)?
    };

    if updated {
        state.cache.invalidate_bookings();
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound("booking".to_string()))
    }
}

// POST /api/admin/bookings/:id/resend
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    booking_flow::resend_verification(&state, &id)
        .await
        .map_err(map_verify_error)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// ── Buildings ──

pub async fn get_buildings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Building>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if let Some(buildings) = state.cache.buildings.get(&true) {
        return Ok(Json(buildings));
    }
    let buildings = {
        let db = state.db.lock().unwrap();
        queries::list_buildings(&db, true)?
    };
    state.cache.buildings.put(true, buildings.clone());
    Ok(Json(buildings))
}

#[derive(Deserialize)]
pub struct CreateBuildingRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contacts: Option<Vec<Contact>>,
}

pub async fn create_building(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBuildingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("building name is required".to_string()));
    }
    let contacts_json = match &body.contacts {
        Some(contacts) => {
            Some(serde_json::to_string(contacts).map_err(|e| AppError::Validation(e.to_string()))?)
        }
        None => None,
    };

    let id = {
        let db = state.db.lock().unwrap();
        queries::create_building(&db, body.name.trim(), &body.address, contacts_json.as_deref())?
    };
    state.cache.invalidate_buildings();
    Ok(Json(serde_json::json!({"ok": true, "id": id})))
}

#[derive(Deserialize)]
pub struct UpdateBuildingRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub contacts: Option<Vec<Contact>>,
    pub active: Option<bool>,
}

pub async fn update_building(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBuildingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let mut building =
        queries::get_building(&db, id)?.ok_or(AppError::NotFound("building".to_string()))?;

    if let Some(name) = body.name {
        building.name = name;
    }
    if let Some(address) = body.address {
        building.address = address;
    }
    if let Some(contacts) = body.contacts {
        building.contacts = contacts;
    }
    if let Some(active) = body.active {
        building.active = active;
    }

    queries::save_building(&db, &building)?;
    drop(db);
    state.cache.invalidate_buildings();
    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn disable_building(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::set_building_active(&db, id, false)?
    };
    if updated {
        state.cache.invalidate_buildings();
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound("building".to_string()))
    }
}

// ── Rooms ──

#[derive(Deserialize)]
pub struct AdminRoomsQuery {
    pub building_id: Option<i64>,
}

pub async fn get_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AdminRoomsQuery>,
) -> Result<Json<Vec<Room>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let key = (query.building_id, true);
    if let Some(rooms) = state.cache.rooms.get(&key) {
        return Ok(Json(rooms));
    }
    let rooms = {
        let db = state.db.lock().unwrap();
        queries::list_rooms(&db, query.building_id, true)?
    };
    state.cache.rooms.put(key, rooms.clone());
    Ok(Json(rooms))
}

#[derive(Deserialize)]
pub struct CreateRoomRequest {
    pub building_id: i64,
    pub name: String,
    #[serde(default = "default_capacity")]
    pub capacity: i32,
}

fn default_capacity() -> i32 {
    1
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("room name is required".to_string()));
    }

    let id = {
        let db = state.db.lock().unwrap();
        if queries::get_building(&db, body.building_id)?.is_none() {
            return Err(AppError::Validation(format!(
                "building {} does not exist",
                body.building_id
            )));
        }
        queries::create_room(&db, body.building_id, body.name.trim(), body.capacity)?
    };
    state.cache.invalidate_rooms();
    Ok(Json(serde_json::json!({"ok": true, "id": id})))
}

#[derive(Deserialize)]
pub struct UpdateRoomRequest {
    pub building_id: Option<i64>,
    pub name: Option<String>,
    pub capacity: Option<i32>,
    pub status: Option<String>,
    pub active: Option<bool>,
}

pub async fn update_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateRoomRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let mut room = queries::get_room(&db, id)?.ok_or(AppError::NotFound("room".to_string()))?;

    if let Some(building_id) = body.building_id {
        room.building_id = building_id;
    }
    if let Some(name) = body.name {
        room.name = name;
    }
    if let Some(capacity) = body.capacity {
        room.capacity = capacity;
    }
    if let Some(status) = body.status {
        room.status = RoomStatus::parse(&status);
    }
    if let Some(active) = body.active {
        room.active = active;
    }

    queries::save_room(&db, &room)?;
    drop(db);
    state.cache.invalidate_rooms();
    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn disable_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::set_room_active(&db, id, false)?
    };
    if updated {
        state.cache.invalidate_rooms();
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound("room".to_string()))
    }
}

// GET /api/admin/email-health
#[derive(Serialize)]
pub struct EmailHealthResponse {
    pub configured: bool,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Ping the relay host with a hard 10-second abort so a wedged upstream
/// cannot hang the dashboard.
pub async fn email_health(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<EmailHealthResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let configured = state.config.email_configured();
    if !configured {
        return Ok(Json(EmailHealthResponse {
            configured: false,
            reachable: false,
            detail: Some("simulation mode: codes are logged, not emailed".to_string()),
        }));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(EMAIL_HEALTH_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Email(e.to_string()))?;

    match client.head(EMAIL_HEALTH_URL).send().await {
        // Any HTTP response means the relay is reachable; it rejects
        // credential-less probes with a 4xx.
        Ok(resp) => Ok(Json(EmailHealthResponse {
            configured,
            reachable: true,
            detail: Some(format!("relay responded with {}", resp.status())),
        })),
        Err(e) => Ok(Json(EmailHealthResponse {
            configured,
            reachable: false,
            detail: Some(e.to_string()),
        })),
    }
}
