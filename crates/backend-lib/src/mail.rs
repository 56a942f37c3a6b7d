// ============================
// crates/backend-lib/src/mail.rs
// ============================
//! Invitation mail dispatch.
//!
//! The transactional mail sender is an external HTTP collaborator:
//! POST `{ to, subject, html }`, answer `{ success }`. Dispatch is
//! always fire-and-forget from the scheduler's point of view.

use async_trait::async_trait;
use campusmeet_common::Meeting;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::validation::sanitize_string;

/// One outbound mail.
#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Deserialize)]
struct MailResponse {
    success: bool,
}

/// Trait for outbound mail backends
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), AppError>;
}

/// Mail sender posting to the external transactional mail endpoint
pub struct HttpMailSender {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMailSender {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(&self, message: &MailMessage) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await
            .map_err(|err| AppError::Mail(err.to_string()))?;

        let body: MailResponse = response
            .json()
            .await
            .map_err(|err| AppError::Mail(err.to_string()))?;

        if body.success {
            Ok(())
        } else {
            Err(AppError::Mail("mail sender reported failure".to_string()))
        }
    }
}

/// Sender used when no mail endpoint is configured.
pub struct NoopMailSender;

#[async_trait]
impl MailSender for NoopMailSender {
    async fn send(&self, message: &MailMessage) -> Result<(), AppError> {
        tracing::debug!(
            recipients = message.to.len(),
            subject = %message.subject,
            "mail dispatch disabled, dropping invitation"
        );
        Ok(())
    }
}

/// Build the invitation mail for one meeting occurrence.
pub fn invitation(meeting: &Meeting, origin: &str, recipients: Vec<String>) -> MailMessage {
    let title = sanitize_string(&meeting.title);
    let description = sanitize_string(&meeting.description);
    let link = meeting.join_link(origin);
    let duration_minutes = (meeting.end_time - meeting.start_time).num_minutes();

    let html = format!(
        "<h2>Meeting Invitation</h2>\
         <p>You have been invited to a meeting:</p>\
         <p><strong>Title:</strong> {title}</p>\
         <p><strong>Description:</strong> {description}</p>\
         <p><strong>Date:</strong> {date}</p>\
         <p><strong>Time:</strong> {time}</p>\
         <p><strong>Duration:</strong> {duration_minutes} minutes</p>\
         <p><strong>Meeting Link:</strong> {link}</p>\
         <p><strong>Meeting Code:</strong> {code}</p>",
        date = meeting.start_time.format("%Y-%m-%d"),
        time = meeting.start_time.format("%H:%M"),
        code = meeting.meeting_code,
    );

    MailMessage {
        to: recipients,
        subject: format!("Meeting Invitation: {}", meeting.title),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusmeet_common::{MeetingStatus, MeetingType};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample_meeting() -> Meeting {
        Meeting {
            id: Uuid::new_v4(),
            title: "Midterm <review>".to_string(),
            description: "Bring questions".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 1, 15, 11, 30, 0).unwrap(),
            host_id: "alice".to_string(),
            course_id: None,
            kind: MeetingType::Class,
            status: MeetingStatus::Scheduled,
            meeting_code: "A1B2C3D4".to_string(),
            is_recurring: false,
            recurring_pattern: None,
        }
    }

    #[test]
    fn test_invitation_contents() {
        let meeting = sample_meeting();
        let message = invitation(
            &meeting,
            "https://campus.example",
            vec!["bob@example.com".to_string()],
        );

        assert_eq!(message.to, vec!["bob@example.com".to_string()]);
        assert_eq!(message.subject, "Meeting Invitation: Midterm <review>");
        // HTML-sensitive characters in user input are escaped
        assert!(message.html.contains("Midterm &lt;review&gt;"));
        assert!(message.html.contains("2024-01-15"));
        assert!(message.html.contains("10:00"));
        assert!(message.html.contains("90 minutes"));
        assert!(message
            .html
            .contains("https://campus.example/meet/A1B2C3D4"));
    }

    #[tokio::test]
    async fn test_noop_sender_accepts_everything() {
        let message = invitation(&sample_meeting(), "http://localhost", vec![]);
        assert!(NoopMailSender.send(&message).await.is_ok());
    }
}
