// ============================
// crates/backend-lib/src/scheduler.rs
// ============================
//! Meeting scheduler.
//!
//! Expands a possibly-recurring meeting request into concrete meeting
//! records and persists each occurrence independently through the
//! directory. Occurrence creates are not a batch: a failure on one
//! occurrence never blocks the following ones, but a failure on the
//! first fails the whole request.

use campusmeet_common::{
    Frequency, Meeting, MeetingStatus, ParticipantRole, RecurrencePattern, RecurrenceRequest,
    Termination,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Settings;
use crate::directory::{Caller, MeetingDirectory};
use crate::error::AppError;
use crate::mail::{self, MailSender};
use crate::permissions::{self, MeetingAction, PermissionContext};
use crate::store::MeetingStore;
use crate::validation;

const CODE_LENGTH: usize = 8;
const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a shareable meeting code. Uniqueness is enforced by the
/// store's unique constraint, not here; on a collision the scheduler
/// retries the occurrence with a fresh code.
pub fn generate_meeting_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.gen_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// One occurrence that could not be persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleFailure {
    /// 1-based occurrence number within the request
    pub occurrence: usize,
    pub reason: String,
}

/// Result of a scheduling request: what was created versus requested.
#[derive(Debug, Serialize)]
pub struct ScheduleOutcome {
    pub created: Vec<Meeting>,
    pub failures: Vec<ScheduleFailure>,
    pub requested: usize,
}

/// Expand a request into concrete (start, end) instants.
///
/// The first occurrence is the request's own start/end. Daily and weekly
/// steps add whole days/weeks so the wall-clock time is preserved;
/// monthly steps use calendar-month arithmetic with the day-of-month
/// clamped to the target month's last day. `Until` compares the date
/// portion only: an occurrence starting on the termination date is
/// emitted regardless of its time of day.
pub fn expand_occurrences(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pattern: Option<&RecurrencePattern>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let Some(pattern) = pattern else {
        return vec![(start, end)];
    };

    let duration = end - start;
    // interval is validated upstream; clamp anyway so a zero step can
    // never spin the expansion forever
    let interval = pattern.interval.max(1);
    let mut occurrences = Vec::new();
    let mut occurrence_start = start;

    loop {
        match pattern.termination {
            Termination::After { occurrences: n } => {
                if occurrences.len() >= n as usize {
                    break;
                }
            },
            Termination::Until { date } => {
                if occurrence_start.date_naive() > date {
                    break;
                }
            },
        }

        occurrences.push((occurrence_start, occurrence_start + duration));

        occurrence_start = match pattern.frequency {
            Frequency::Daily => occurrence_start + Duration::days(i64::from(interval)),
            Frequency::Weekly => occurrence_start + Duration::weeks(i64::from(interval)),
            Frequency::Monthly => add_months(occurrence_start, interval),
        };
    }

    occurrences
}

// Calendar-month step preserving the time of day, clamping the
// day-of-month to the target month's last day.
fn add_months(instant: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let date = instant.date_naive();
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + i64::from(months);
    let year = total.div_euclid(12) as i32;
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(last_day_of_month(year, month));

    // year/month/day are valid by construction
    let shifted = NaiveDate::from_ymd_opt(year, month, day).unwrap();
    shifted.and_time(instant.time()).and_utc()
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    (28..=31)
        .rev()
        .find(|&day| NaiveDate::from_ymd_opt(year, month, day).is_some())
        .unwrap_or(28)
}

/// Schedule a meeting request: authorize, validate, expand, persist each
/// occurrence, dispatch invitations.
pub async fn schedule<S: MeetingStore>(
    directory: &MeetingDirectory<S>,
    mailer: Arc<dyn MailSender>,
    settings: &Settings,
    caller: &Caller,
    request: RecurrenceRequest,
) -> Result<ScheduleOutcome, AppError> {
    // permission and validation run before any persistence is attempted
    let ctx = PermissionContext {
        is_own_meeting: request.host_id == caller.user_id,
        course_role: None,
    };
    if !permissions::authorize(caller.role, MeetingAction::Create, Some(&ctx)) {
        return Err(AppError::PermissionDenied {
            role: caller.role.as_str().to_string(),
            action: MeetingAction::Create.as_str().to_string(),
        });
    }

    validation::validate_title(&request.title)?;
    validation::validate_time_range(request.start_time, request.end_time)?;
    if let Some(pattern) = &request.recurrence {
        validation::validate_recurrence(pattern, request.start_time)?;
    }
    for invitee in &request.participants {
        validation::validate_email(&invitee.email)?;
    }

    let occurrences =
        expand_occurrences(request.start_time, request.end_time, request.recurrence.as_ref());
    let requested = occurrences.len();

    let mut created = Vec::new();
    let mut failures = Vec::new();

    for (index, (occurrence_start, occurrence_end)) in occurrences.into_iter().enumerate() {
        let mut meeting = Meeting {
            id: Uuid::new_v4(),
            title: request.title.clone(),
            description: request.description.clone(),
            start_time: occurrence_start,
            end_time: occurrence_end,
            host_id: request.host_id.clone(),
            course_id: request.course_id.clone(),
            kind: request.kind,
            status: MeetingStatus::Scheduled,
            meeting_code: generate_meeting_code(),
            is_recurring: request.recurrence.is_some(),
            recurring_pattern: request.recurrence,
        };

        match create_with_fresh_code(directory, &mut meeting).await {
            Ok(()) => {
                populate_roster(directory, &meeting, &request).await;
                dispatch_invitations(&mailer, settings, &meeting, &request);
                created.push(meeting);
            },
            Err(err) => {
                tracing::warn!(
                    occurrence = index + 1,
                    error = %err,
                    "failed to persist occurrence"
                );
                failures.push(ScheduleFailure {
                    occurrence: index + 1,
                    reason: err.to_string(),
                });
            },
        }
    }

    // the first occurrence must succeed or the whole request failed
    if let Some(first) = failures.iter().find(|f| f.occurrence == 1) {
        return Err(AppError::Persistence(format!(
            "first occurrence could not be created: {}",
            first.reason
        )));
    }
    if created.is_empty() {
        let reason = failures
            .first()
            .map(|f| f.reason.clone())
            .unwrap_or_else(|| "no occurrences to create".to_string());
        return Err(AppError::Persistence(reason));
    }

    Ok(ScheduleOutcome {
        created,
        failures,
        requested,
    })
}

// The code generator does not guarantee uniqueness; the store's unique
// constraint does. On a collision the occurrence is retried with a
// fresh code.
async fn create_with_fresh_code<S: MeetingStore>(
    directory: &MeetingDirectory<S>,
    meeting: &mut Meeting,
) -> Result<(), AppError> {
    const MAX_CODE_ATTEMPTS: usize = 3;

    let mut last_err = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        match directory.create(meeting).await {
            Err(AppError::DuplicateMeetingCode(code)) => {
                tracing::debug!(%code, "meeting code collision, regenerating");
                meeting.meeting_code = generate_meeting_code();
                last_err = Some(AppError::DuplicateMeetingCode(code));
            },
            other => return other,
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::Internal("code retry exhausted".to_string())))
}

// Roster rows are best-effort decoration of a created occurrence; a
// failure here must not undo the meeting itself.
async fn populate_roster<S: MeetingStore>(
    directory: &MeetingDirectory<S>,
    meeting: &Meeting,
    request: &RecurrenceRequest,
) {
    if let Err(err) = directory
        .add_participant(meeting.id, request.host_id.clone(), ParticipantRole::Host)
        .await
    {
        tracing::warn!(meeting_id = %meeting.id, error = %err, "failed to add host to roster");
    }

    for invitee in &request.participants {
        if let Err(err) = directory
            .add_participant(
                meeting.id,
                invitee.user_id.clone(),
                ParticipantRole::Participant,
            )
            .await
        {
            tracing::warn!(
                meeting_id = %meeting.id,
                user_id = %invitee.user_id,
                error = %err,
                "failed to add invitee to roster"
            );
        }
    }
}

// Fire-and-forget: mail failure is logged and never rolls back the
// created meeting.
fn dispatch_invitations(
    mailer: &Arc<dyn MailSender>,
    settings: &Settings,
    meeting: &Meeting,
    request: &RecurrenceRequest,
) {
    if request.participants.is_empty() {
        return;
    }

    let recipients = request
        .participants
        .iter()
        .map(|invitee| invitee.email.clone())
        .collect();
    let message = mail::invitation(meeting, &settings.public_origin, recipients);
    let mailer = Arc::clone(mailer);
    let meeting_id = meeting.id;

    tokio::spawn(async move {
        if let Err(err) = mailer.send(&message).await {
            tracing::warn!(%meeting_id, error = %err, "invitation dispatch failed");
        }
    });
}
