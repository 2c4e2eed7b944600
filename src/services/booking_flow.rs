use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;

use crate::db::queries::{self, InsertOutcome};
use crate::models::{Booking, BookingStatus, VerificationStatus, VERIFICATION_WINDOW_MINUTES};
use crate::services::email::{ConfirmationEmail, VerificationEmail};
use crate::services::schedule::{self, RoomAvailability};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub room_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    InvalidField(&'static str),

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("{0}")]
    InvalidInterval(String),

    #[error("{0}")]
    PastTime(String),

    #[error("{}", .0.message())]
    Unavailable(RoomAvailability),

    #[error("Booking could not be saved: {0}")]
    Storage(String),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("Booking not found")]
    NotFound,

    #[error("Booking already verified")]
    AlreadyVerified,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification code expired")]
    Expired,

    #[error("Verification could not be saved: {0}")]
    Storage(String),
}

pub fn generate_reference_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..8)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

pub fn generate_verification_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000))
}

/// Light syntactic check; deliverability is the relay's problem.
pub fn is_valid_email(s: &str) -> bool {
    let s = s.trim();
    if s.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// `form -> pending_verification`: validate, run the advisory availability
/// check, then write the row under the transactional overlap guard and
/// dispatch the verification email. The email failing does not undo the
/// row; recovery is the admin resend action.
pub async fn submit_booking(state: &AppState, req: &BookingRequest) -> Result<Booking, SubmitError> {
    let user_name = req.user_name.trim();
    let user_email = req.user_email.trim();
    if user_name.is_empty() {
        return Err(SubmitError::MissingField("user_name"));
    }
    if user_email.is_empty() {
        return Err(SubmitError::MissingField("user_email"));
    }
    if req.booking_date.trim().is_empty() {
        return Err(SubmitError::MissingField("booking_date"));
    }
    if req.start_time.trim().is_empty() || req.end_time.trim().is_empty() {
        return Err(SubmitError::MissingField("start_time/end_time"));
    }
    if req.room_id <= 0 {
        return Err(SubmitError::InvalidField("room_id must be positive"));
    }
    if !is_valid_email(user_email) {
        return Err(SubmitError::InvalidEmail);
    }

    let date = schedule::parse_date(req.booking_date.trim())
        .map_err(|e| SubmitError::InvalidInterval(e.to_string()))?;
    let start = schedule::parse_time(req.start_time.trim())
        .map_err(|e| SubmitError::InvalidInterval(e.to_string()))?;
    let end = schedule::parse_time(req.end_time.trim())
        .map_err(|e| SubmitError::InvalidInterval(e.to_string()))?;
    if start >= end {
        return Err(SubmitError::InvalidInterval(
            "start time must be before end time".to_string(),
        ));
    }

    // Normalized zero-padded forms from here on.
    let booking_date = date.format("%Y-%m-%d").to_string();
    let start_time = start.format("%H:%M").to_string();
    let end_time = end.format("%H:%M").to_string();
    let duration_minutes = (end - start).num_minutes() as i32;

    let past = schedule::is_past_time(&booking_date, &start_time)
        .map_err(|e| SubmitError::InvalidInterval(e.to_string()))?;
    if past.is_past {
        return Err(SubmitError::PastTime(past.message));
    }

    let booking = {
        let conn = state.db.lock().unwrap();

        let availability =
            schedule::check_room_advisory(&conn, req.room_id, &booking_date, &start_time, &end_time);
        if availability != RoomAvailability::Available {
            return Err(SubmitError::Unavailable(availability));
        }

        let room = queries::get_room(&conn, req.room_id)
            .map_err(|e| SubmitError::Storage(e.to_string()))?
            .ok_or(SubmitError::Unavailable(RoomAvailability::Closed))?;
        let building_name = queries::get_building(&conn, room.building_id)
            .map_err(|e| SubmitError::Storage(e.to_string()))?
            .map(|b| b.name)
            .unwrap_or_default();

        let now = Utc::now().naive_utc();
        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            reference_code: generate_reference_code(),
            verification_code: generate_verification_code(),
            room_id: room.id,
            room_name: room.name,
            building_name,
            user_name: user_name.to_string(),
            user_email: user_email.to_string(),
            booking_date,
            start_time,
            end_time,
            duration_minutes,
            purpose: req.purpose.clone().filter(|s| !s.trim().is_empty()),
            notes: req.notes.clone().filter(|s| !s.trim().is_empty()),
            status: BookingStatus::Pending,
            verification_status: VerificationStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        match queries::insert_booking_checked(&conn, &booking)
            .map_err(|e| SubmitError::Storage(e.to_string()))?
        {
            InsertOutcome::Inserted => booking,
            InsertOutcome::Overlap(other) => {
                return Err(SubmitError::Unavailable(RoomAvailability::Conflict {
                    reference_code: other.reference_code,
                    start_time: other.start_time,
                    end_time: other.end_time,
                }));
            }
        }
    };
    state.cache.invalidate_bookings();

    let email = VerificationEmail {
        user_email: booking.user_email.clone(),
        to_name: booking.user_name.clone(),
        verification_code: booking.verification_code.clone(),
        booking_reference: booking.reference_code.clone(),
        expires_in: format!("{VERIFICATION_WINDOW_MINUTES} minutes"),
    };
    if let Err(e) = state.mailer.send_verification(&email).await {
        tracing::warn!(booking_id = %booking.id, error = %e, "verification email dispatch failed; booking kept");
    }

    Ok(booking)
}

/// `pending_verification -> confirmed`. Preconditions in order, first
/// failure wins: exists, not already verified, code matches, within the
/// expiry window. No mutation on any failure.
pub async fn verify_booking(
    state: &AppState,
    booking_id: &str,
    code: &str,
) -> Result<Booking, VerifyError> {
    let booking = {
        let conn = state.db.lock().unwrap();
        queries::get_booking_by_id(&conn, booking_id)
            .map_err(|e| VerifyError::Storage(e.to_string()))?
    }
    .ok_or(VerifyError::NotFound)?;

    if booking.verification_status == VerificationStatus::Verified {
        return Err(VerifyError::AlreadyVerified);
    }
    if booking.verification_code != code.trim() {
        return Err(VerifyError::InvalidCode);
    }
    let elapsed = Utc::now().naive_utc() - booking.created_at;
    if elapsed > Duration::minutes(VERIFICATION_WINDOW_MINUTES) {
        return Err(VerifyError::Expired);
    }

    let confirmed = {
        let conn = state.db.lock().unwrap();
        let updated = queries::mark_verified(&conn, &booking.id)
            .map_err(|e| VerifyError::Storage(e.to_string()))?;
        if !updated {
            // Another request consumed the code between our read and write.
            return Err(VerifyError::AlreadyVerified);
        }
        queries::get_booking_by_id(&conn, &booking.id)
            .map_err(|e| VerifyError::Storage(e.to_string()))?
            .ok_or(VerifyError::NotFound)?
    };
    state.cache.invalidate_bookings();

    let email = ConfirmationEmail {
        user_email: confirmed.user_email.clone(),
        to_name: confirmed.user_name.clone(),
        room_name: confirmed.room_name.clone(),
        building_name: confirmed.building_name.clone(),
        booking_date: confirmed.booking_date.clone(),
        start_time: confirmed.start_time.clone(),
        end_time: confirmed.end_time.clone(),
        booking_reference: confirmed.reference_code.clone(),
    };
    if let Err(e) = state.mailer.send_confirmation(&email).await {
        tracing::warn!(booking_id = %confirmed.id, error = %e, "confirmation email dispatch failed");
    }

    Ok(confirmed)
}

/// Manual recovery for a lost verification email: re-dispatch the existing
/// code if it can still be used.
pub async fn resend_verification(state: &AppState, booking_id: &str) -> Result<(), VerifyError> {
    let booking = {
        let conn = state.db.lock().unwrap();
        queries::get_booking_by_id(&conn, booking_id)
            .map_err(|e| VerifyError::Storage(e.to_string()))?
    }
    .ok_or(VerifyError::NotFound)?;

    if booking.verification_status == VerificationStatus::Verified {
        return Err(VerifyError::AlreadyVerified);
    }
    let elapsed = Utc::now().naive_utc() - booking.created_at;
    if elapsed > Duration::minutes(VERIFICATION_WINDOW_MINUTES) {
        return Err(VerifyError::Expired);
    }

    let email = VerificationEmail {
        user_email: booking.user_email.clone(),
        to_name: booking.user_name.clone(),
        verification_code: booking.verification_code.clone(),
        booking_reference: booking.reference_code.clone(),
        expires_in: format!("{VERIFICATION_WINDOW_MINUTES} minutes"),
    };
    state
        .mailer
        .send_verification(&email)
        .await
        .map_err(|e| VerifyError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::config::AppConfig;
    use crate::db;
    use crate::services::cache::AppCache;
    use crate::services::email::console::ConsoleMailer;

    fn test_state() -> AppState {
        let conn = db::init_db(":memory:").unwrap();
        conn.execute(
            "INSERT INTO buildings (id, name, address) VALUES (1, 'Mugar Library', '771 Commonwealth Ave')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO rooms (id, building_id, name, capacity) VALUES (5, 1, 'Study Room 505', 6)",
            [],
        )
        .unwrap();

        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: AppConfig {
                port: 0,
                database_url: ":memory:".to_string(),
                admin_token: "test-token".to_string(),
                emailjs_service_id: String::new(),
                emailjs_public_key: String::new(),
                emailjs_verify_template: String::new(),
                emailjs_confirm_template: String::new(),
            },
            mailer: Box::new(ConsoleMailer),
            cache: AppCache::new(),
        }
    }

    fn request() -> BookingRequest {
        BookingRequest {
            room_id: 5,
            user_name: "Terry Tester".to_string(),
            user_email: "terry@university.edu".to_string(),
            booking_date: "2099-06-01".to_string(),
            start_time: "14:00".to_string(),
            end_time: "15:00".to_string(),
            purpose: Some("group study".to_string()),
            notes: None,
        }
    }

    fn backdate(state: &AppState, booking_id: &str, seconds: i64) {
        let stamp = (Utc::now().naive_utc() - Duration::seconds(seconds))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let conn = state.db.lock().unwrap();
        conn.execute(
            "UPDATE bookings SET created_at = ?1 WHERE id = ?2",
            rusqlite::params![stamp, booking_id],
        )
        .unwrap();
    }

    #[test]
    fn test_generated_codes_shape() {
        let reference = generate_reference_code();
        assert_eq!(reference.len(), 8);
        assert!(reference
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let code = generate_verification_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("terry@university.edu"));
        assert!(is_valid_email("a.b+c@dept.university.edu"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@university.edu"));
        assert!(!is_valid_email("terry@nodot"));
        assert!(!is_valid_email("te rry@university.edu"));
    }

    #[tokio::test]
    async fn test_submit_creates_pending_booking() {
        let state = test_state();
        let booking = submit_booking(&state, &request()).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.verification_status, VerificationStatus::Pending);
        assert_eq!(booking.reference_code.len(), 8);
        assert_eq!(booking.verification_code.len(), 6);
        assert_eq!(booking.duration_minutes, 60);
        assert_eq!(booking.room_name, "Study Room 505");
        assert_eq!(booking.building_name, "Mugar Library");

        let conn = state.db.lock().unwrap();
        let stored = queries::get_booking_by_id(&conn, &booking.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_fields_and_bad_email() {
        let state = test_state();

        let mut req = request();
        req.user_name = "  ".to_string();
        assert!(matches!(
            submit_booking(&state, &req).await,
            Err(SubmitError::MissingField("user_name"))
        ));

        let mut req = request();
        req.user_email = "not-an-email".to_string();
        assert!(matches!(
            submit_booking(&state, &req).await,
            Err(SubmitError::InvalidEmail)
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_nonpositive_room_id() {
        let state = test_state();
        for bad_id in [0, -3] {
            let mut req = request();
            req.room_id = bad_id;
            match submit_booking(&state, &req).await {
                Err(SubmitError::InvalidField(msg)) => {
                    assert_eq!(msg, "room_id must be positive");
                }
                other => panic!("expected invalid-field rejection, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_inverted_interval() {
        let state = test_state();
        let mut req = request();
        req.start_time = "15:00".to_string();
        req.end_time = "14:00".to_string();
        assert!(matches!(
            submit_booking(&state, &req).await,
            Err(SubmitError::InvalidInterval(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_past_time() {
        let state = test_state();
        let mut req = request();
        req.booking_date = "2020-01-01".to_string();
        match submit_booking(&state, &req).await {
            Err(SubmitError::PastTime(msg)) => {
                assert!(msg.contains("2020-01-01 14:00"));
            }
            other => panic!("expected past-time rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_conflicting_interval() {
        let state = test_state();
        let first = submit_booking(&state, &request()).await.unwrap();
        verify_booking(&state, &first.id, &first.verification_code)
            .await
            .unwrap();

        let mut req = request();
        req.start_time = "14:30".to_string();
        req.end_time = "15:30".to_string();
        match submit_booking(&state, &req).await {
            Err(SubmitError::Unavailable(RoomAvailability::Conflict {
                reference_code, ..
            })) => {
                assert_eq!(reference_code, first.reference_code);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_allows_touching_interval() {
        let state = test_state();
        let first = submit_booking(&state, &request()).await.unwrap();
        verify_booking(&state, &first.id, &first.verification_code)
            .await
            .unwrap();

        let mut req = request();
        req.start_time = "15:00".to_string();
        req.end_time = "16:00".to_string();
        assert!(submit_booking(&state, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_booking_does_not_block_submission() {
        let state = test_state();
        // Submitted but never verified: stays out of conflict detection.
        submit_booking(&state, &request()).await.unwrap();
        assert!(submit_booking(&state, &request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_wrong_code_leaves_row_unchanged() {
        let state = test_state();
        let booking = submit_booking(&state, &request()).await.unwrap();

        let wrong = if booking.verification_code == "000000" {
            "000001"
        } else {
            "000000"
        };
        assert_eq!(
            verify_booking(&state, &booking.id, wrong).await.unwrap_err(),
            VerifyError::InvalidCode
        );

        let conn = state.db.lock().unwrap();
        let stored = queries::get_booking_by_id(&conn, &booking.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(stored.verification_status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_verify_success_then_already_verified() {
        let state = test_state();
        let booking = submit_booking(&state, &request()).await.unwrap();

        let confirmed = verify_booking(&state, &booking.id, &booking.verification_code)
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.verification_status, VerificationStatus::Verified);

        assert_eq!(
            verify_booking(&state, &booking.id, &booking.verification_code)
                .await
                .unwrap_err(),
            VerifyError::AlreadyVerified
        );
    }

    #[tokio::test]
    async fn test_verify_expiry_boundary() {
        let state = test_state();

        let booking = submit_booking(&state, &request()).await.unwrap();
        backdate(&state, &booking.id, 15 * 60 + 1);
        assert_eq!(
            verify_booking(&state, &booking.id, &booking.verification_code)
                .await
                .unwrap_err(),
            VerifyError::Expired
        );

        let mut req = request();
        req.start_time = "16:00".to_string();
        req.end_time = "17:00".to_string();
        let booking = submit_booking(&state, &req).await.unwrap();
        backdate(&state, &booking.id, 15 * 60 - 1);
        assert!(verify_booking(&state, &booking.id, &booking.verification_code)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_verify_unknown_booking() {
        let state = test_state();
        assert_eq!(
            verify_booking(&state, "no-such-id", "123456")
                .await
                .unwrap_err(),
            VerifyError::NotFound
        );
    }

    #[tokio::test]
    async fn test_wrong_code_reported_before_expiry() {
        let state = test_state();
        let booking = submit_booking(&state, &request()).await.unwrap();
        backdate(&state, &booking.id, 60 * 60);

        // Precondition order: code mismatch wins over expiry.
        assert_eq!(
            verify_booking(&state, &booking.id, "this-is-wrong")
                .await
                .unwrap_err(),
            VerifyError::InvalidCode
        );
    }

    #[tokio::test]
    async fn test_resend_only_while_pending_and_unexpired() {
        let state = test_state();
        let booking = submit_booking(&state, &request()).await.unwrap();

        assert!(resend_verification(&state, &booking.id).await.is_ok());

        verify_booking(&state, &booking.id, &booking.verification_code)
            .await
            .unwrap();
        assert_eq!(
            resend_verification(&state, &booking.id).await.unwrap_err(),
            VerifyError::AlreadyVerified
        );
    }
}
