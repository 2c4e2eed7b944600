use std::sync::{Arc, Mutex};

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::RoomStatus;

/// All wall-clock values in the system are interpreted in the campus zone.
pub const CAMPUS_TZ: Tz = chrono_tz::America::New_York;

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid date (expected YYYY-MM-DD): {s}"))
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| anyhow::anyhow!("invalid time (expected HH:MM): {s}"))
}

/// Project a naive campus wall-clock value onto the timeline.
///
/// Spring-forward gap times resolve forward to the next valid instant;
/// fall-back ambiguous times take the earlier offset. Both choices keep the
/// projection monotone in wall-clock time.
fn project_local(naive: NaiveDateTime) -> DateTime<Tz> {
    match CAMPUS_TZ.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            CAMPUS_TZ
                .from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| CAMPUS_TZ.from_utc_datetime(&naive))
        }
    }
}

#[derive(Debug, Clone)]
pub struct PastTimeCheck {
    pub is_past: bool,
    pub message: String,
}

/// Whether the candidate date + time-of-day, read as campus wall clock, is
/// at or before the current instant. Inclusive on purpose: a booking that
/// starts exactly now is already stale by the time it is stored.
pub fn is_past_time(date: &str, time: &str) -> anyhow::Result<PastTimeCheck> {
    let now = Utc::now().with_timezone(&CAMPUS_TZ);
    is_past_time_at(date, time, now)
}

pub fn is_past_time_at(date: &str, time: &str, now: DateTime<Tz>) -> anyhow::Result<PastTimeCheck> {
    let naive = parse_date(date)?.and_time(parse_time(time)?);
    let candidate = project_local(naive);

    let is_past = candidate <= now;
    let selected = candidate.format("%Y-%m-%d %H:%M");
    let current = now.format("%Y-%m-%d %H:%M");
    let message = if is_past {
        format!("Selected time {selected} is not after the current time {current} (US Eastern)")
    } else {
        format!("Selected time {selected} is after the current time {current} (US Eastern)")
    };

    Ok(PastTimeCheck { is_past, message })
}

/// Half-open interval overlap on zero-padded HH:MM strings. Bookings that
/// merely touch at a shared boundary do not conflict.
pub fn intervals_overlap(s1: &str, e1: &str, s2: &str, e2: &str) -> bool {
    s1 < e2 && s2 < e1
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomAvailability {
    Available,
    Conflict {
        reference_code: String,
        start_time: String,
        end_time: String,
    },
    Closed,
    Maintenance,
}

impl RoomAvailability {
    pub fn status_str(&self) -> &'static str {
        match self {
            RoomAvailability::Available => "available",
            RoomAvailability::Conflict { .. } => "conflict",
            RoomAvailability::Closed => "closed",
            RoomAvailability::Maintenance => "maintenance",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RoomAvailability::Available => "Room is available for the selected time.".to_string(),
            RoomAvailability::Conflict {
                start_time,
                end_time,
                reference_code,
            } => format!(
                "Room is already booked {start_time}-{end_time} (reference {reference_code})."
            ),
            RoomAvailability::Closed => "Room is not open for booking.".to_string(),
            RoomAvailability::Maintenance => "Room is closed for maintenance.".to_string(),
        }
    }
}

/// Check one room against the proposed interval. Errors propagate; callers
/// that want the advisory fail-open behavior go through
/// [`check_room_advisory`].
pub fn check_room(
    conn: &Connection,
    room_id: i64,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> anyhow::Result<RoomAvailability> {
    let Some(room) = queries::get_room(conn, room_id)? else {
        return Ok(RoomAvailability::Closed);
    };
    if !room.active {
        return Ok(RoomAvailability::Closed);
    }
    if let Some(building) = queries::get_building(conn, room.building_id)? {
        if !building.active {
            return Ok(RoomAvailability::Closed);
        }
    }
    if room.status == RoomStatus::Maintenance {
        return Ok(RoomAvailability::Maintenance);
    }

    let candidates = queries::conflict_candidates(conn, room_id, date)?;
    for booking in &candidates {
        if intervals_overlap(start_time, end_time, &booking.start_time, &booking.end_time) {
            return Ok(RoomAvailability::Conflict {
                reference_code: booking.reference_code.clone(),
                start_time: booking.start_time.clone(),
                end_time: booking.end_time.clone(),
            });
        }
    }

    Ok(RoomAvailability::Available)
}

/// Advisory variant: a failed read reports the room as available rather
/// than blocking the user on a transient fault. The transactional insert
/// guard is what actually prevents a double booking.
pub fn check_room_advisory(
    conn: &Connection,
    room_id: i64,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> RoomAvailability {
    match check_room(conn, room_id, date, start_time, end_time) {
        Ok(availability) => availability,
        Err(e) => {
            tracing::warn!(room_id, error = %e, "availability check failed, treating room as available");
            RoomAvailability::Available
        }
    }
}

/// Fan out one advisory check per room and join them all. Each room's
/// result is independent; a failure degrades only that room.
pub async fn check_rooms(
    db: Arc<Mutex<Connection>>,
    room_ids: Vec<i64>,
    date: String,
    start_time: String,
    end_time: String,
) -> Vec<(i64, RoomAvailability)> {
    let mut handles = Vec::with_capacity(room_ids.len());
    for room_id in room_ids {
        let db = Arc::clone(&db);
        let date = date.clone();
        let start_time = start_time.clone();
        let end_time = end_time.clone();
        handles.push((
            room_id,
            tokio::spawn(async move {
                let conn = db.lock().unwrap();
                check_room_advisory(&conn, room_id, &date, &start_time, &end_time)
            }),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (room_id, handle) in handles {
        let availability = match handle.await {
            Ok(availability) => availability,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "availability task panicked, treating room as available");
                RoomAvailability::Available
            }
        };
        results.push((room_id, availability));
    }
    results
}
