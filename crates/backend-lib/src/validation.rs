// ============================
// crates/backend-lib/src/validation.rs
// ============================
//! Request validation module.

use campusmeet_common::{RecurrencePattern, Termination};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// Common validation constants
const MAX_TITLE_LENGTH: usize = 200;
const MIN_ROOM_ID_LENGTH: usize = 3;
const MAX_ROOM_ID_LENGTH: usize = 64;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit

// Regex patterns for validation
static MEETING_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{8}$").unwrap());
static ROOM_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").unwrap());
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Possible validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid title: {0}")]
    InvalidTitle(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),

    #[error("Invalid meeting code: {0}")]
    InvalidMeetingCode(String),

    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a meeting title
pub fn validate_title(title: &str) -> ValidationResult<&str> {
    if title.trim().is_empty() {
        return Err(ValidationError::InvalidTitle(
            "Title must not be empty".to_string(),
        ));
    }

    if title.len() > MAX_TITLE_LENGTH {
        return Err(ValidationError::InvalidTitle(format!(
            "Title cannot exceed {MAX_TITLE_LENGTH} characters"
        )));
    }

    Ok(title)
}

/// Validate that a meeting ends after it starts
pub fn validate_time_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ValidationResult<()> {
    if end <= start {
        return Err(ValidationError::InvalidTimeRange(
            "End time must be after start time".to_string(),
        ));
    }

    Ok(())
}

/// Validate a recurrence pattern against the first occurrence's start.
pub fn validate_recurrence(
    pattern: &RecurrencePattern,
    start: DateTime<Utc>,
) -> ValidationResult<()> {
    if pattern.interval < 1 {
        return Err(ValidationError::InvalidRecurrence(
            "Interval must be at least 1".to_string(),
        ));
    }

    match pattern.termination {
        Termination::After { occurrences } => {
            if occurrences < 1 {
                return Err(ValidationError::InvalidRecurrence(
                    "Occurrence count must be at least 1".to_string(),
                ));
            }
        },
        Termination::Until { date } => {
            if date < start.date_naive() {
                return Err(ValidationError::InvalidRecurrence(
                    "Recurrence end date must not be before the start date".to_string(),
                ));
            }
        },
    }

    Ok(())
}

/// Validate a meeting code (8 uppercase alphanumeric characters)
pub fn validate_meeting_code(code: &str) -> ValidationResult<&str> {
    if !MEETING_CODE_REGEX.is_match(code) {
        return Err(ValidationError::InvalidMeetingCode(
            "Meeting code must be 8 uppercase alphanumeric characters".to_string(),
        ));
    }

    Ok(code)
}

/// Validate a signaling room ID
pub fn validate_room_id(room_id: &str) -> ValidationResult<&str> {
    if room_id.is_empty() {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must not be empty".to_string(),
        ));
    }

    if room_id.len() < MIN_ROOM_ID_LENGTH || room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err(ValidationError::InvalidRoomId(format!(
            "Room ID must be between {MIN_ROOM_ID_LENGTH} and {MAX_ROOM_ID_LENGTH} characters"
        )));
    }

    if !ROOM_ID_REGEX.is_match(room_id) {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must contain only alphanumeric characters and hyphens".to_string(),
        ));
    }

    Ok(room_id)
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "Email address cannot be empty".to_string(),
        ));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Email address cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Invalid email address format".to_string(),
        ));
    }

    Ok(email)
}

/// Sanitize general string input before interpolating into HTML mail bodies
pub fn sanitize_string(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusmeet_common::Frequency;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Algebra review").is_ok());

        assert!(matches!(
            validate_title(""),
            Err(ValidationError::InvalidTitle(_))
        ));
        assert!(matches!(
            validate_title("   "),
            Err(ValidationError::InvalidTitle(_))
        ));

        let long_title = "a".repeat(201);
        assert!(matches!(
            validate_title(&long_title),
            Err(ValidationError::InvalidTitle(_))
        ));
    }

    #[test]
    fn test_validate_time_range() {
        assert!(validate_time_range(at(2024, 1, 15), at(2024, 1, 16)).is_ok());

        // end before start
        assert!(matches!(
            validate_time_range(at(2024, 1, 16), at(2024, 1, 15)),
            Err(ValidationError::InvalidTimeRange(_))
        ));

        // zero-length meeting
        assert!(matches!(
            validate_time_range(at(2024, 1, 15), at(2024, 1, 15)),
            Err(ValidationError::InvalidTimeRange(_))
        ));
    }

    #[test]
    fn test_validate_recurrence() {
        let valid = RecurrencePattern {
            frequency: Frequency::Daily,
            interval: 1,
            termination: Termination::After { occurrences: 5 },
        };
        assert!(validate_recurrence(&valid, at(2024, 1, 15)).is_ok());

        let zero_interval = RecurrencePattern {
            interval: 0,
            ..valid
        };
        assert!(matches!(
            validate_recurrence(&zero_interval, at(2024, 1, 15)),
            Err(ValidationError::InvalidRecurrence(_))
        ));

        let zero_occurrences = RecurrencePattern {
            termination: Termination::After { occurrences: 0 },
            ..valid
        };
        assert!(matches!(
            validate_recurrence(&zero_occurrences, at(2024, 1, 15)),
            Err(ValidationError::InvalidRecurrence(_))
        ));

        let until_before_start = RecurrencePattern {
            termination: Termination::Until {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
            ..valid
        };
        assert!(matches!(
            validate_recurrence(&until_before_start, at(2024, 1, 15)),
            Err(ValidationError::InvalidRecurrence(_))
        ));

        // until on the start date itself is allowed
        let until_on_start = RecurrencePattern {
            termination: Termination::Until {
                date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            },
            ..valid
        };
        assert!(validate_recurrence(&until_on_start, at(2024, 1, 15)).is_ok());
    }

    #[test]
    fn test_validate_meeting_code() {
        assert!(validate_meeting_code("A1B2C3D4").is_ok());
        assert!(validate_meeting_code("ZZZZ9999").is_ok());

        assert!(matches!(
            validate_meeting_code(""),
            Err(ValidationError::InvalidMeetingCode(_))
        ));
        assert!(matches!(
            validate_meeting_code("a1b2c3d4"),
            Err(ValidationError::InvalidMeetingCode(_))
        ));
        assert!(matches!(
            validate_meeting_code("A1B2C3"),
            Err(ValidationError::InvalidMeetingCode(_))
        ));
        assert!(matches!(
            validate_meeting_code("A1B2C3D4E"),
            Err(ValidationError::InvalidMeetingCode(_))
        ));
    }

    #[test]
    fn test_validate_room_id() {
        assert!(validate_room_id("room-123").is_ok());
        assert!(validate_room_id(&uuid::Uuid::new_v4().to_string()).is_ok());

        assert!(matches!(
            validate_room_id(""),
            Err(ValidationError::InvalidRoomId(_))
        ));
        assert!(matches!(
            validate_room_id("ab"),
            Err(ValidationError::InvalidRoomId(_))
        ));
        assert!(matches!(
            validate_room_id("room_123"),
            Err(ValidationError::InvalidRoomId(_))
        ));

        let long_id = "a".repeat(65);
        assert!(matches!(
            validate_room_id(&long_id),
            Err(ValidationError::InvalidRoomId(_))
        ));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name+tag@example.co.uk").is_ok());

        assert!(matches!(
            validate_email("test.example.com"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("test@"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("test@example"),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_sanitize_string() {
        let input = "<script>alert('XSS')</script>";
        let sanitized = sanitize_string(input);
        assert_eq!(
            sanitized,
            "&lt;script&gt;alert(&#x27;XSS&#x27;)&lt;/script&gt;"
        );
    }
}
