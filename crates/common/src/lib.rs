// ================
// common/src/lib.rs
// ================
//! Shared types for the `CampusMeet` coordination backend.
//! This module defines the meeting domain records, the recurrence
//! descriptors consumed by the scheduler, and the signaling relay
//! protocol spoken over the WebSocket endpoint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of an authenticated user, issued by the external
/// auth service. Never minted locally.
pub type UserId = String;

/// Signaling namespace of one meeting's live session.
pub type RoomId = String;

/// Category of a scheduled meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Class,
    OfficeHours,
    GroupStudy,
    Consultation,
}

/// Lifecycle status of a meeting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// One scheduled or live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Owning user reference
    pub host_id: UserId,
    /// Optional course reference; `None` for ad-hoc meetings
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MeetingType,
    pub status: MeetingStatus,
    /// Short human-shareable token, unique across all meetings
    pub meeting_code: String,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_pattern: Option<RecurrencePattern>,
}

impl Meeting {
    /// Join link handed out in invitations: `<origin>/meet/<code>`.
    pub fn join_link(&self, origin: &str) -> String {
        format!("{}/meet/{}", origin.trim_end_matches('/'), self.meeting_code)
    }

    /// The signaling room for this meeting's live session.
    pub fn room_id(&self) -> RoomId {
        self.id.to_string()
    }
}

/// Membership of one user in one meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub meeting_id: Uuid,
    pub user_id: UserId,
    pub role: ParticipantRole,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub left_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    Participant,
}

/// How often a recurring meeting repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// When a recurrence stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Emit exactly this many occurrences, the first included.
    After { occurrences: u32 },
    /// Emit occurrences whose start *date* is on or before this date.
    Until { date: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    /// Step between occurrences in units of `frequency`; at least 1
    pub interval: u32,
    pub termination: Termination,
}

/// A participant to invite when a meeting is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitee {
    pub user_id: UserId,
    pub email: String,
}

/// Input to the scheduler. Not stored as-is; expanded into one
/// `Meeting` row per occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub host_id: UserId,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MeetingType,
    #[serde(default)]
    pub participants: Vec<Invitee>,
    /// `None` schedules a single occurrence
    #[serde(default)]
    pub recurrence: Option<RecurrencePattern>,
}

/// Signaling event names carried between the participants of one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Reaction,
}

impl SignalKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::Reaction => "reaction",
        }
    }

    /// Parse a wire event name. Unknown names yield `None` and are
    /// ignored by receivers rather than treated as errors.
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice-candidate" => Some(SignalKind::IceCandidate),
            "reaction" => Some(SignalKind::Reaction),
            _ => None,
        }
    }
}

/// One in-flight broadcast on a room's signaling bus. Never persisted
/// and never replayed; a subscriber that joins after the send does not
/// receive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub room_id: RoomId,
    pub sender_id: UserId,
    /// Wire event name; kept as a string so unknown kinds pass through
    pub event: String,
    pub payload: serde_json::Value,
}

/// Messages sent from a session client to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msgType")]
pub enum ClientMessage {
    /// Subscribe this connection to one room's signaling bus
    JoinRoom { room_id: RoomId, user_id: UserId },
    /// Broadcast a signaling event to the other participants
    Signal {
        event: String,
        payload: serde_json::Value,
    },
    /// Unsubscribe; the connection may then join another room
    LeaveRoom,
}

/// Messages sent from the relay server to a session client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msgType")]
pub enum ServerMessage {
    RoomJoined {
        room_id: RoomId,
    },
    Signal {
        sender_id: UserId,
        event: String,
        payload: serde_json::Value,
    },
    Error {
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_serialization() {
        let join = ClientMessage::JoinRoom {
            room_id: "room-1".to_string(),
            user_id: "user-1".to_string(),
        };

        let json = serde_json::to_string(&join).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["msgType"], "JoinRoom");
        assert_eq!(parsed["room_id"], "room-1");
        assert_eq!(parsed["user_id"], "user-1");

        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        match back {
            ClientMessage::JoinRoom { room_id, user_id } => {
                assert_eq!(room_id, "room-1");
                assert_eq!(user_id, "user-1");
            },
            other => panic!("expected JoinRoom, got {other:?}"),
        }
    }

    #[test]
    fn signal_kind_wire_names() {
        assert_eq!(SignalKind::IceCandidate.as_str(), "ice-candidate");
        assert_eq!(SignalKind::parse("offer"), Some(SignalKind::Offer));
        assert_eq!(SignalKind::parse("answer"), Some(SignalKind::Answer));
        assert_eq!(
            SignalKind::parse("ice-candidate"),
            Some(SignalKind::IceCandidate)
        );
        assert_eq!(SignalKind::parse("reaction"), Some(SignalKind::Reaction));
        // unknown kinds are ignored, not an error
        assert_eq!(SignalKind::parse("chat"), None);
    }

    #[test]
    fn meeting_join_link() {
        let meeting = Meeting {
            id: Uuid::new_v4(),
            title: "Algebra review".to_string(),
            description: String::new(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            host_id: "host-1".to_string(),
            course_id: None,
            kind: MeetingType::Class,
            status: MeetingStatus::Scheduled,
            meeting_code: "A1B2C3D4".to_string(),
            is_recurring: false,
            recurring_pattern: None,
        };

        assert_eq!(
            meeting.join_link("https://campus.example"),
            "https://campus.example/meet/A1B2C3D4"
        );
        // trailing slash on the origin must not double up
        assert_eq!(
            meeting.join_link("https://campus.example/"),
            "https://campus.example/meet/A1B2C3D4"
        );
    }

    #[test]
    fn termination_serialization() {
        let after = Termination::After { occurrences: 5 };
        let json = serde_json::to_string(&after).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["kind"], "after");
        assert_eq!(parsed["occurrences"], 5);

        let until: Termination =
            serde_json::from_str(r#"{"kind":"until","date":"2024-02-15"}"#).unwrap();
        assert_eq!(
            until,
            Termination::Until {
                date: NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
            }
        );
    }
}
