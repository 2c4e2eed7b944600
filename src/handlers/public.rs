use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Building, Room};
use crate::services::booking_flow::{self, BookingRequest};
use crate::services::schedule::{self, RoomAvailability};
use crate::state::AppState;

/// Booking as shown to clients. The verification code never leaves the
/// server; it only travels by email.
#[derive(Serialize)]
pub struct BookingView {
    pub id: String,
    pub reference_code: String,
    pub room_id: i64,
    pub room_name: String,
    pub building_name: String,
    pub user_name: String,
    pub user_email: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub verification_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            reference_code: b.reference_code,
            room_id: b.room_id,
            room_name: b.room_name,
            building_name: b.building_name,
            user_name: b.user_name,
            user_email: b.user_email,
            booking_date: b.booking_date,
            start_time: b.start_time,
            end_time: b.end_time,
            duration_minutes: b.duration_minutes,
            purpose: b.purpose,
            notes: b.notes,
            status: b.status.as_str().to_string(),
            verification_status: b.verification_status.as_str().to_string(),
            created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: b.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

// GET /api/buildings
pub async fn get_buildings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Building>>, AppError> {
    if let Some(buildings) = state.cache.buildings.get(&false) {
        return Ok(Json(buildings));
    }
    let buildings = {
        let db = state.db.lock().unwrap();
        queries::list_buildings(&db, false)?
    };
    state.cache.buildings.put(false, buildings.clone());
    Ok(Json(buildings))
}

// GET /api/rooms
#[derive(Deserialize)]
pub struct RoomsQuery {
    pub building_id: Option<i64>,
}

pub async fn get_rooms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomsQuery>,
) -> Result<Json<Vec<Room>>, AppError> {
    let key = (query.building_id, false);
    if let Some(rooms) = state.cache.rooms.get(&key) {
        return Ok(Json(rooms));
    }
    let rooms = {
        let db = state.db.lock().unwrap();
        queries::list_rooms(&db, query.building_id, false)?
    };
    state.cache.rooms.put(key, rooms.clone());
    Ok(Json(rooms))
}

// POST /api/availability
#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub room_ids: Vec<i64>,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Serialize)]
pub struct RoomAvailabilityView {
    pub room_id: i64,
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictView>,
}

#[derive(Serialize)]
pub struct ConflictView {
    pub reference_code: String,
    pub start_time: String,
    pub end_time: String,
}

pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<Vec<RoomAvailabilityView>>, AppError> {
    let date = schedule::parse_date(&req.date).map_err(|e| AppError::Validation(e.to_string()))?;
    let start =
        schedule::parse_time(&req.start_time).map_err(|e| AppError::Validation(e.to_string()))?;
    let end =
        schedule::parse_time(&req.end_time).map_err(|e| AppError::Validation(e.to_string()))?;
    if start >= end {
        return Err(AppError::Validation(
            "start time must be before end time".to_string(),
        ));
    }

    let results = schedule::check_rooms(
        Arc::clone(&state.db),
        req.room_ids,
        date.format("%Y-%m-%d").to_string(),
        start.format("%H:%M").to_string(),
        end.format("%H:%M").to_string(),
    )
    .await;

    let views = results
        .into_iter()
        .map(|(room_id, availability)| {
            let conflict = match &availability {
                RoomAvailability::Conflict {
                    reference_code,
                    start_time,
                    end_time,
                } => Some(ConflictView {
                    reference_code: reference_code.clone(),
                    start_time: start_time.clone(),
                    end_time: end_time.clone(),
                }),
                _ => None,
            };
            RoomAvailabilityView {
                room_id,
                status: availability.status_str(),
                message: availability.message(),
                conflict,
            }
        })
        .collect();

    Ok(Json(views))
}

// POST /api/bookings
#[derive(Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn submit_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookingRequest>,
) -> Json<SubmitResponse> {
    match booking_flow::submit_booking(&state, &req).await {
        Ok(booking) => Json(SubmitResponse {
            success: true,
            booking: Some(booking.into()),
            error: None,
        }),
        Err(e) => Json(SubmitResponse {
            success: false,
            booking: None,
            error: Some(e.to_string()),
        }),
    }
}

// POST /api/bookings/:id/verify
#[derive(Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

pub async fn verify_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Json<SubmitResponse> {
    match booking_flow::verify_booking(&state, &id, &req.code).await {
        Ok(booking) => Json(SubmitResponse {
            success: true,
            booking: Some(booking.into()),
            error: None,
        }),
        Err(e) => Json(SubmitResponse {
            success: false,
            booking: None,
            error: Some(e.to_string()),
        }),
    }
}

// GET /api/bookings/reference/:code
pub async fn get_booking_by_reference(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_reference(&db, &code)?
    };
    match booking {
        Some(b) => Ok(Json(b.into())),
        None => Err(AppError::NotFound(format!("booking {code}"))),
    }
}
