use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::room::parse_contacts;
use crate::models::{Booking, BookingStatus, Building, Room, RoomStatus, VerificationStatus};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str = "id, reference_code, verification_code, room_id, room_name, \
     building_name, user_name, user_email, booking_date, start_time, end_time, \
     duration_minutes, purpose, notes, status, verification_status, created_at, updated_at";

// ── Bookings ──

/// Outcome of the guarded insert: either the row went in, or another
/// qualifying booking already covered part of the interval.
pub enum InsertOutcome {
    Inserted,
    Overlap(Booking),
}

/// Insert a booking, re-checking for overlap inside the same transaction.
///
/// The advisory availability check runs earlier without any lock; this is
/// the authoritative guard that keeps two submissions racing for the same
/// interval from both landing.
pub fn insert_booking_checked(conn: &Connection, booking: &Booking) -> anyhow::Result<InsertOutcome> {
    let tx = conn.unchecked_transaction()?;

    let existing = find_overlapping(
        &tx,
        booking.room_id,
        &booking.booking_date,
        &booking.start_time,
        &booking.end_time,
    )?;
    if let Some(other) = existing {
        tx.rollback()?;
        return Ok(InsertOutcome::Overlap(other));
    }

    tx.execute(
        &format!("INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"),
        params![
            booking.id,
            booking.reference_code,
            booking.verification_code,
            booking.room_id,
            booking.room_name,
            booking.building_name,
            booking.user_name,
            booking.user_email,
            booking.booking_date,
            booking.start_time,
            booking.end_time,
            booking.duration_minutes,
            booking.purpose,
            booking.notes,
            booking.status.as_str(),
            booking.verification_status.as_str(),
            booking.created_at.format(DATETIME_FMT).to_string(),
            booking.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;

    tx.commit()?;
    Ok(InsertOutcome::Inserted)
}

/// First verified, confirmed/active booking overlapping the half-open
/// interval, if any. Time-of-day strings are zero-padded HH:MM so string
/// comparison matches chronological order.
pub fn find_overlapping(
    conn: &Connection,
    room_id: i64,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> anyhow::Result<Option<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE room_id = ?1 AND booking_date = ?2
           AND verification_status = 'verified'
           AND status IN ('confirmed', 'active')
           AND start_time < ?4 AND end_time > ?3
         ORDER BY start_time ASC LIMIT 1"
    ))?;

    let result = stmt
        .query_row(params![room_id, date, start_time, end_time], |row| {
            Ok(parse_booking_row(row))
        })
        .optional()?;

    match result {
        Some(booking) => Ok(Some(booking?)),
        None => Ok(None),
    }
}

/// All bookings that count for conflict detection on a given room and date:
/// verified, and confirmed (or legacy 'active') lifecycle.
pub fn conflict_candidates(
    conn: &Connection,
    room_id: i64,
    date: &str,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE room_id = ?1 AND booking_date = ?2
           AND verification_status = 'verified'
           AND status IN ('confirmed', 'active')
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![room_id, date], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    match result {
        Some(booking) => Ok(Some(booking?)),
        None => Ok(None),
    }
}

pub fn get_booking_by_reference(conn: &Connection, reference: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference_code = ?1"),
            params![reference],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    match result {
        Some(booking) => Ok(Some(booking?)),
        None => Ok(None),
    }
}

/// Flip a pending booking to confirmed/verified. The WHERE guard makes the
/// update a no-op if another request already consumed the code.
pub fn mark_verified(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc().format(DATETIME_FMT).to_string();
    let count = conn.execute(
        "UPDATE bookings SET status = 'confirmed', verification_status = 'verified', updated_at = ?1
         WHERE id = ?2 AND verification_status != 'verified'",
        params![now, id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: &BookingStatus,
) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc().format(DATETIME_FMT).to_string();
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1
                 ORDER BY booking_date DESC, start_time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 ORDER BY booking_date DESC, start_time DESC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let status_str: String = row.get(14)?;
    let verification_str: String = row.get(15)?;
    let created_at_str: String = row.get(16)?;
    let updated_at_str: String = row.get(17)?;

    let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT)
        .map_err(|e| anyhow::anyhow!("bad created_at in bookings row: {e}"))?;
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, DATETIME_FMT)
        .map_err(|e| anyhow::anyhow!("bad updated_at in bookings row: {e}"))?;

    Ok(Booking {
        id: row.get(0)?,
        reference_code: row.get(1)?,
        verification_code: row.get(2)?,
        room_id: row.get(3)?,
        room_name: row.get(4)?,
        building_name: row.get(5)?,
        user_name: row.get(6)?,
        user_email: row.get(7)?,
        booking_date: row.get(8)?,
        start_time: row.get(9)?,
        end_time: row.get(10)?,
        duration_minutes: row.get(11)?,
        purpose: row.get(12)?,
        notes: row.get(13)?,
        status: BookingStatus::parse(&status_str),
        verification_status: VerificationStatus::parse(&verification_str),
        created_at,
        updated_at,
    })
}

// ── Rooms ──

pub fn list_rooms(
    conn: &Connection,
    building_id: Option<i64>,
    include_inactive: bool,
) -> anyhow::Result<Vec<Room>> {
    let mut sql = String::from(
        "SELECT id, building_id, name, capacity, status, active FROM rooms WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];
    if let Some(bid) = building_id {
        sql.push_str(" AND building_id = ?1");
        params_vec.push(Box::new(bid));
    }
    if !include_inactive {
        sql.push_str(" AND active = 1");
    }
    sql.push_str(" ORDER BY building_id, name");

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_room_row)?;

    let mut rooms = vec![];
    for row in rows {
        rooms.push(row?);
    }
    Ok(rooms)
}

pub fn get_room(conn: &Connection, id: i64) -> anyhow::Result<Option<Room>> {
    let room = conn
        .query_row(
            "SELECT id, building_id, name, capacity, status, active FROM rooms WHERE id = ?1",
            params![id],
            parse_room_row,
        )
        .optional()?;
    Ok(room)
}

pub fn create_room(
    conn: &Connection,
    building_id: i64,
    name: &str,
    capacity: i32,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO rooms (building_id, name, capacity) VALUES (?1, ?2, ?3)",
        params![building_id, name, capacity],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn save_room(conn: &Connection, room: &Room) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE rooms SET building_id = ?1, name = ?2, capacity = ?3, status = ?4,
             active = ?5, updated_at = datetime('now')
         WHERE id = ?6",
        params![
            room.building_id,
            room.name,
            room.capacity,
            room.status.as_str(),
            room.active as i32,
            room.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_room_active(conn: &Connection, id: i64, active: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE rooms SET active = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![active as i32, id],
    )?;
    Ok(count > 0)
}

fn parse_room_row(row: &rusqlite::Row) -> rusqlite::Result<Room> {
    let status_str: String = row.get(4)?;
    Ok(Room {
        id: row.get(0)?,
        building_id: row.get(1)?,
        name: row.get(2)?,
        capacity: row.get(3)?,
        status: RoomStatus::parse(&status_str),
        active: row.get::<_, i32>(5)? != 0,
    })
}

// ── Buildings ──

pub fn list_buildings(conn: &Connection, include_inactive: bool) -> anyhow::Result<Vec<Building>> {
    let sql = if include_inactive {
        "SELECT id, name, address, contacts, active FROM buildings ORDER BY name"
    } else {
        "SELECT id, name, address, contacts, active FROM buildings WHERE active = 1 ORDER BY name"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        let contacts_raw: Option<String> = row.get(3)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            contacts_raw,
            row.get::<_, i32>(4)? != 0,
        ))
    })?;

    let mut buildings = vec![];
    for row in rows {
        let (id, name, address, contacts_raw, active) = row?;
        let contacts = parse_contacts(contacts_raw.as_deref())
            .map_err(|e| anyhow::anyhow!("building {id}: {e}"))?;
        buildings.push(Building {
            id,
            name,
            address,
            contacts,
            active,
        });
    }
    Ok(buildings)
}

pub fn get_building(conn: &Connection, id: i64) -> anyhow::Result<Option<Building>> {
    let result = conn
        .query_row(
            "SELECT id, name, address, contacts, active FROM buildings WHERE id = ?1",
            params![id],
            |row| {
                let contacts_raw: Option<String> = row.get(3)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    contacts_raw,
                    row.get::<_, i32>(4)? != 0,
                ))
            },
        )
        .optional()?;

    match result {
        Some((id, name, address, contacts_raw, active)) => {
            let contacts = parse_contacts(contacts_raw.as_deref())
                .map_err(|e| anyhow::anyhow!("building {id}: {e}"))?;
            Ok(Some(Building {
                id,
                name,
                address,
                contacts,
                active,
            }))
        }
        None => Ok(None),
    }
}

pub fn create_building(
    conn: &Connection,
    name: &str,
    address: &str,
    contacts_json: Option<&str>,
) -> anyhow::Result<i64> {
    // Validate up front so a malformed blob never lands in the table.
    parse_contacts(contacts_json)?;
    conn.execute(
        "INSERT INTO buildings (name, address, contacts) VALUES (?1, ?2, ?3)",
        params![name, address, contacts_json],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn save_building(conn: &Connection, building: &Building) -> anyhow::Result<bool> {
    let contacts_json = serde_json::to_string(&building.contacts)?;
    let count = conn.execute(
        "UPDATE buildings SET name = ?1, address = ?2, contacts = ?3, active = ?4,
             updated_at = datetime('now')
         WHERE id = ?5",
        params![
            building.name,
            building.address,
            contacts_json,
            building.active as i32,
            building.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_building_active(conn: &Connection, id: i64, active: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE buildings SET active = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![active as i32, id],
    )?;
    Ok(count > 0)
}

// ── Dashboard ──

pub struct DashboardStats {
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
    pub active_rooms: i64,
    pub active_buildings: i64,
}

pub fn get_dashboard_stats(conn: &Connection) -> anyhow::Result<DashboardStats> {
    let pending_bookings: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    let confirmed_bookings: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE status = 'confirmed'",
        [],
        |row| row.get(0),
    )?;
    let active_rooms: i64 =
        conn.query_row("SELECT COUNT(*) FROM rooms WHERE active = 1", [], |row| {
            row.get(0)
        })?;
    let active_buildings: i64 = conn.query_row(
        "SELECT COUNT(*) FROM buildings WHERE active = 1",
        [],
        |row| row.get(0),
    )?;

    Ok(DashboardStats {
        pending_bookings,
        confirmed_bookings,
        active_rooms,
        active_buildings,
    })
}
