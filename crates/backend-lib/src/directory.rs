// ============================
// crates/backend-lib/src/directory.rs
// ============================
//! Role-scoped meeting directory.
//!
//! Wraps the row store behind a typed parse boundary: every row is
//! validated into a domain type here, so nothing downstream ever sees
//! an unvalidated external shape. All reads are scoped through the
//! permission policy.

use campusmeet_common::{Meeting, MeetingStatus, Participant, ParticipantRole, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::permissions::{self, MeetingAction, PermissionContext, Role};
use crate::store::MeetingStore;

/// Authenticated identity of the caller, supplied by the external auth
/// service.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    fn context_for(&self, meeting: &Meeting) -> PermissionContext {
        PermissionContext {
            is_own_meeting: meeting.host_id == self.user_id,
            course_role: None,
        }
    }

    fn sees_everything(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Instructor)
    }
}

/// Directory over meeting and participant records.
pub struct MeetingDirectory<S> {
    store: S,
}

impl<S: MeetingStore> MeetingDirectory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn parse_meeting(row: Value) -> Result<Meeting, AppError> {
        serde_json::from_value(row)
            .map_err(|err| AppError::Persistence(format!("malformed meeting row: {err}")))
    }

    fn parse_participant(row: Value) -> Result<Participant, AppError> {
        serde_json::from_value(row)
            .map_err(|err| AppError::Persistence(format!("malformed participant row: {err}")))
    }

    /// Persist a new meeting record. Permission checks happen in the
    /// scheduler before any persistence is attempted.
    pub async fn create(&self, meeting: &Meeting) -> Result<(), AppError> {
        let row = serde_json::to_value(meeting)?;
        self.store
            .insert_meeting(&meeting.id.to_string(), &meeting.meeting_code, &row)
            .await
    }

    /// Fetch one meeting, scoped to the caller: host, roster member, or
    /// admin/instructor. Invisible meetings read as not found.
    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<Meeting, AppError> {
        let row = self
            .store
            .fetch_meeting(&id.to_string())
            .await?
            .ok_or(AppError::MeetingNotFound)?;
        let meeting = Self::parse_meeting(row)?;

        let visible = caller.sees_everything()
            || meeting.host_id == caller.user_id
            || self.is_on_roster(id, &caller.user_id).await?;
        if !visible {
            return Err(AppError::MeetingNotFound);
        }

        let ctx = caller.context_for(&meeting);
        if !permissions::authorize(caller.role, MeetingAction::View, Some(&ctx)) {
            return Err(AppError::PermissionDenied {
                role: caller.role.as_str().to_string(),
                action: MeetingAction::View.as_str().to_string(),
            });
        }

        Ok(meeting)
    }

    /// Look up a meeting by its shareable code, same scoping as `get`.
    pub async fn get_by_code(&self, caller: &Caller, code: &str) -> Result<Meeting, AppError> {
        let row = self
            .store
            .fetch_meeting_by_code(code)
            .await?
            .ok_or(AppError::MeetingNotFound)?;
        let meeting = Self::parse_meeting(row)?;
        self.get(caller, meeting.id).await
    }

    /// List the meetings visible to the caller.
    pub async fn list_for(&self, caller: &Caller) -> Result<Vec<Meeting>, AppError> {
        let rows = self.store.list_meetings().await?;
        let mut meetings = Vec::with_capacity(rows.len());
        for row in rows {
            meetings.push(Self::parse_meeting(row)?);
        }

        if !caller.sees_everything() {
            let mut scoped = Vec::new();
            for meeting in meetings {
                if meeting.host_id == caller.user_id
                    || self.is_on_roster(meeting.id, &caller.user_id).await?
                {
                    scoped.push(meeting);
                }
            }
            meetings = permissions::filter_visible(scoped, caller.role, &caller.user_id);
        }

        meetings.sort_by_key(|m| m.start_time);
        Ok(meetings)
    }

    /// Update a meeting's mutable fields.
    pub async fn update(&self, caller: &Caller, meeting: &Meeting) -> Result<(), AppError> {
        let existing = self.get(caller, meeting.id).await?;
        self.check(caller, &existing, MeetingAction::Edit)?;

        let row = serde_json::to_value(meeting)?;
        self.store.update_meeting(&meeting.id.to_string(), &row).await
    }

    /// Delete a meeting record outright.
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        let existing = self.get(caller, id).await?;
        self.check(caller, &existing, MeetingAction::Delete)?;

        self.store.delete_meeting(&id.to_string()).await
    }

    /// Session start event: scheduled -> in_progress.
    pub async fn start(&self, caller: &Caller, id: Uuid) -> Result<Meeting, AppError> {
        self.transition(caller, id, MeetingStatus::InProgress).await
    }

    /// Session end event: in_progress -> completed.
    pub async fn complete(&self, caller: &Caller, id: Uuid) -> Result<Meeting, AppError> {
        self.transition(caller, id, MeetingStatus::Completed).await
    }

    /// Cancel a meeting; terminal, only from scheduled or in_progress.
    pub async fn cancel(&self, caller: &Caller, id: Uuid) -> Result<Meeting, AppError> {
        self.transition(caller, id, MeetingStatus::Cancelled).await
    }

    async fn transition(
        &self,
        caller: &Caller,
        id: Uuid,
        to: MeetingStatus,
    ) -> Result<Meeting, AppError> {
        let mut meeting = self.get(caller, id).await?;
        self.check(caller, &meeting, MeetingAction::Edit)?;
        ensure_transition(meeting.status, to)?;

        meeting.status = to;
        let row = serde_json::to_value(&meeting)?;
        self.store.update_meeting(&id.to_string(), &row).await?;
        Ok(meeting)
    }

    fn check(
        &self,
        caller: &Caller,
        meeting: &Meeting,
        action: MeetingAction,
    ) -> Result<(), AppError> {
        let ctx = caller.context_for(meeting);
        if permissions::authorize(caller.role, action, Some(&ctx)) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied {
                role: caller.role.as_str().to_string(),
                action: action.as_str().to_string(),
            })
        }
    }

    /// Add a user to a meeting's roster. At most one host per meeting.
    pub async fn add_participant(
        &self,
        meeting_id: Uuid,
        user_id: impl Into<UserId>,
        role: ParticipantRole,
    ) -> Result<Participant, AppError> {
        let user_id = user_id.into();
        let roster = self.roster(meeting_id).await?;

        if role == ParticipantRole::Host && roster.iter().any(|p| p.role == ParticipantRole::Host)
        {
            return Err(AppError::Validation(
                "meeting already has a host".to_string(),
            ));
        }
        if roster.iter().any(|p| p.user_id == user_id) {
            return Err(AppError::Validation(format!(
                "{user_id} is already on the roster"
            )));
        }

        let participant = Participant {
            meeting_id,
            user_id,
            role,
            joined_at: None,
            left_at: None,
        };
        let row = serde_json::to_value(&participant)?;
        self.store
            .insert_participant(&meeting_id.to_string(), &row)
            .await?;
        Ok(participant)
    }

    /// Record the instant a participant entered the live session.
    pub async fn mark_joined(
        &self,
        meeting_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.edit_roster(meeting_id, user_id, |participant| {
            participant.joined_at = Some(at);
            participant.left_at = None;
            Ok(())
        })
        .await
    }

    /// Record the instant a participant left. Must not precede their
    /// join instant.
    pub async fn mark_left(
        &self,
        meeting_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.edit_roster(meeting_id, user_id, |participant| {
            match participant.joined_at {
                Some(joined) if joined <= at => {
                    participant.left_at = Some(at);
                    Ok(())
                },
                Some(_) => Err(AppError::Validation(
                    "left_at must not precede joined_at".to_string(),
                )),
                None => Err(AppError::Validation(
                    "participant never joined".to_string(),
                )),
            }
        })
        .await
    }

    /// Read a meeting's roster.
    pub async fn roster(&self, meeting_id: Uuid) -> Result<Vec<Participant>, AppError> {
        let rows = self
            .store
            .list_participants(&meeting_id.to_string())
            .await?;
        rows.into_iter().map(Self::parse_participant).collect()
    }

    async fn is_on_roster(&self, meeting_id: Uuid, user_id: &str) -> Result<bool, AppError> {
        Ok(self
            .roster(meeting_id)
            .await?
            .iter()
            .any(|p| p.user_id == user_id))
    }

    async fn edit_roster<F>(
        &self,
        meeting_id: Uuid,
        user_id: &str,
        edit: F,
    ) -> Result<(), AppError>
    where
        F: FnOnce(&mut Participant) -> Result<(), AppError>,
    {
        let mut roster = self.roster(meeting_id).await?;
        let participant = roster
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(AppError::MeetingNotFound)?;
        edit(participant)?;

        let rows = roster
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.store
            .replace_participants(&meeting_id.to_string(), &rows)
            .await
    }
}

// Legal lifecycle moves; everything else is rejected. Cancelled and
// completed are terminal.
fn ensure_transition(from: MeetingStatus, to: MeetingStatus) -> Result<(), AppError> {
    let legal = matches!(
        (from, to),
        (MeetingStatus::Scheduled, MeetingStatus::InProgress)
            | (MeetingStatus::InProgress, MeetingStatus::Completed)
            | (MeetingStatus::Scheduled, MeetingStatus::Cancelled)
            | (MeetingStatus::InProgress, MeetingStatus::Cancelled)
    );

    if legal {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}
