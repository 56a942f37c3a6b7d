// ============================
// crates/backend-lib/src/permissions.rs
// ============================
//! Meeting permission policy.
//!
//! A pure (role, action, context) -> allow/deny mapping. Deterministic,
//! side-effect free, and cheap enough to call on every request without
//! caching. Unknown roles or actions fail closed.

use campusmeet_common::Meeting;
use serde::{Deserialize, Serialize};

/// Platform role of the caller, issued by the external auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Instructor,
    Student,
    Guest,
}

impl Role {
    /// Parse a role string from an external source. Unknown roles yield
    /// `None`; callers must deny in that case.
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "admin" => Some(Role::Admin),
            "instructor" => Some(Role::Instructor),
            "student" => Some(Role::Student),
            "guest" => Some(Role::Guest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Student => "student",
            Role::Guest => "guest",
        }
    }
}

/// Actions a caller may attempt on meetings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingAction {
    Create,
    Edit,
    Delete,
    View,
    Invite,
    Record,
}

impl MeetingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingAction::Create => "create",
            MeetingAction::Edit => "edit",
            MeetingAction::Delete => "delete",
            MeetingAction::View => "view",
            MeetingAction::Invite => "invite",
            MeetingAction::Record => "record",
        }
    }
}

/// Role of the caller within the course a meeting belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseRole {
    Owner,
    Member,
}

/// Optional context that can widen the base permission table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionContext {
    pub is_own_meeting: bool,
    pub course_role: Option<CourseRole>,
}

/// Check whether `role` may perform `action`.
///
/// Ownership trumps role: a caller acting on their own meeting, or who
/// owns the containing course, is permitted regardless of the base table.
pub fn authorize(role: Role, action: MeetingAction, context: Option<&PermissionContext>) -> bool {
    if let Some(ctx) = context {
        if ctx.is_own_meeting || ctx.course_role == Some(CourseRole::Owner) {
            return true;
        }
    }

    base_permission(role, action)
}

// Base table: admin and instructor permit everything, students view only,
// guests nothing.
fn base_permission(role: Role, action: MeetingAction) -> bool {
    match role {
        Role::Admin | Role::Instructor => true,
        Role::Student => matches!(action, MeetingAction::View),
        Role::Guest => false,
    }
}

/// Meeting fields a role must not see in directory reads.
pub fn restricted_fields(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin | Role::Instructor => &[],
        Role::Student => &["participants", "recording_url"],
        Role::Guest => &["participants", "recording_url", "description"],
    }
}

/// Serialize a meeting for a caller, dropping the fields their role is
/// not allowed to see.
pub fn redact_meeting(meeting: &Meeting, role: Role) -> serde_json::Value {
    let mut row = serde_json::to_value(meeting).unwrap_or_default();
    if let Some(obj) = row.as_object_mut() {
        for field in restricted_fields(role) {
            obj.remove(*field);
        }
    }
    row
}

/// Retain the meetings `role` is allowed to view, with ownership derived
/// from the caller's user id.
pub fn filter_visible(meetings: Vec<Meeting>, role: Role, user_id: &str) -> Vec<Meeting> {
    meetings
        .into_iter()
        .filter(|meeting| {
            let ctx = PermissionContext {
                is_own_meeting: meeting.host_id == user_id,
                course_role: None,
            };
            authorize(role, MeetingAction::View, Some(&ctx))
        })
        .collect()
}
